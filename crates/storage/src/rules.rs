use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use ledgerline_core::{
    CategoryRule, ExclusionPattern, ExclusionRule, MerchantRule, RuleSet, RuleSource,
};
use sqlx::Sqlite;

use crate::db::{DbPool, StorageError};

const WRITE_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Result of an upsert-by-key write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Key already present and `replace_existing` was false.
    SkippedExisting,
}

fn is_lock_contention(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db)
        if db.message().contains("locked") || db.message().contains("busy"))
}

/// Bounded retry with short backoff for small latency-sensitive writes.
/// Bulk batch commits do not come through here; they fail fast.
async fn with_write_retry<T, F, Fut>(mut f: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Err(StorageError::Sqlx(e)) if is_lock_contention(&e) && attempt + 1 < WRITE_RETRIES => {
                attempt += 1;
                tracing::warn!(attempt, "rule write hit lock contention, retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            other => return other,
        }
    }
}

/// Bulk-load all active rules into an in-memory snapshot for a batch run.
pub async fn load_rule_set(pool: &DbPool) -> Result<RuleSet, StorageError> {
    let merchants = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, raw_description, standardized_merchant FROM merchant_rules WHERE is_active = 1 ORDER BY id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, raw_description, standardized_merchant)| MerchantRule {
        id: Some(id),
        raw_description,
        standardized_merchant,
        is_active: true,
    })
    .collect();

    let categories = sqlx::query_as::<_, (i64, String, String, String)>(
        "SELECT id, trigger_text, category_id, source FROM category_rules WHERE is_active = 1 ORDER BY id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, trigger, category_id, source)| CategoryRule {
        id: Some(id),
        trigger,
        category_id,
        source: RuleSource::from_str(&source).unwrap_or_default(),
        is_active: true,
    })
    .collect();

    let exclusions = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, rule_type, value FROM exclusion_rules WHERE is_active = 1 ORDER BY id",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .filter_map(|(id, kind, value)| {
        // An unknown persisted kind is skipped, never fatal.
        ExclusionPattern::from_parts(&kind, &value)
            .ok()
            .map(|pattern| ExclusionRule {
                id: Some(id),
                pattern,
                is_active: true,
            })
    })
    .collect();

    Ok(RuleSet::new(merchants, categories, exclusions))
}

pub async fn merchant_rule_keys(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT raw_description FROM merchant_rules")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn category_rule_keys(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT trigger_text FROM category_rules")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

pub async fn exclusion_values(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT value FROM exclusion_rules")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Valid taxonomy ids, cached once per rule import.
pub async fn category_ids(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT id FROM categories")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

async fn key_exists<'e, E>(ex: E, table_sql: &str, key: &str) -> Result<bool, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (i64,)>(table_sql)
        .bind(key)
        .fetch_optional(ex)
        .await?;
    Ok(row.is_some())
}

pub async fn upsert_merchant_rule(
    pool: &DbPool,
    raw_description: &str,
    standardized_merchant: &str,
    replace_existing: bool,
) -> Result<UpsertOutcome, StorageError> {
    with_write_retry(|| async {
        let exists = key_exists(
            pool,
            "SELECT 1 FROM merchant_rules WHERE raw_description = ?",
            raw_description,
        )
        .await?;
        match (exists, replace_existing) {
            (true, false) => Ok(UpsertOutcome::SkippedExisting),
            (true, true) => {
                sqlx::query(
                    "UPDATE merchant_rules SET standardized_merchant = ?, updated_at = datetime('now') WHERE raw_description = ?",
                )
                .bind(standardized_merchant)
                .bind(raw_description)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
            (false, _) => {
                sqlx::query(
                    "INSERT INTO merchant_rules (raw_description, standardized_merchant) VALUES (?, ?)",
                )
                .bind(raw_description)
                .bind(standardized_merchant)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    })
    .await
}

pub async fn upsert_category_rule(
    pool: &DbPool,
    trigger: &str,
    category_id: &str,
    source: RuleSource,
    replace_existing: bool,
) -> Result<UpsertOutcome, StorageError> {
    with_write_retry(|| async {
        let exists = key_exists(
            pool,
            "SELECT 1 FROM category_rules WHERE trigger_text = ?",
            trigger,
        )
        .await?;
        match (exists, replace_existing) {
            (true, false) => Ok(UpsertOutcome::SkippedExisting),
            (true, true) => {
                sqlx::query(
                    "UPDATE category_rules SET category_id = ?, updated_at = datetime('now') WHERE trigger_text = ?",
                )
                .bind(category_id)
                .bind(trigger)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
            (false, _) => {
                sqlx::query(
                    "INSERT INTO category_rules (trigger_text, category_id, source) VALUES (?, ?, ?)",
                )
                .bind(trigger)
                .bind(category_id)
                .bind(source.as_str())
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    })
    .await
}

pub async fn upsert_exclusion_rule(
    pool: &DbPool,
    pattern: &ExclusionPattern,
    is_active: bool,
    replace_existing: bool,
) -> Result<UpsertOutcome, StorageError> {
    with_write_retry(|| async {
        let exists = key_exists(
            pool,
            "SELECT 1 FROM exclusion_rules WHERE value = ?",
            pattern.value(),
        )
        .await?;
        match (exists, replace_existing) {
            (true, false) => Ok(UpsertOutcome::SkippedExisting),
            (true, true) => {
                sqlx::query(
                    "UPDATE exclusion_rules SET rule_type = ?, is_active = ? WHERE value = ?",
                )
                .bind(pattern.kind())
                .bind(is_active)
                .bind(pattern.value())
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
            (false, _) => {
                sqlx::query(
                    "INSERT INTO exclusion_rules (rule_type, value, is_active) VALUES (?, ?, ?)",
                )
                .bind(pattern.kind())
                .bind(pattern.value())
                .bind(is_active)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    })
    .await
}

pub async fn upsert_category(
    pool: &DbPool,
    id: &str,
    section: &str,
    category: &str,
    subcategory: Option<&str>,
    replace_existing: bool,
) -> Result<UpsertOutcome, StorageError> {
    with_write_retry(|| async {
        let exists = key_exists(pool, "SELECT 1 FROM categories WHERE id = ?", id).await?;
        match (exists, replace_existing) {
            (true, false) => Ok(UpsertOutcome::SkippedExisting),
            (true, true) => {
                sqlx::query(
                    "UPDATE categories SET section = ?, category = ?, subcategory = ? WHERE id = ?",
                )
                .bind(section)
                .bind(category)
                .bind(subcategory)
                .bind(id)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Updated)
            }
            (false, _) => {
                sqlx::query(
                    "INSERT INTO categories (id, section, category, subcategory) VALUES (?, ?, ?, ?)",
                )
                .bind(id)
                .bind(section)
                .bind(category)
                .bind(subcategory)
                .execute(pool)
                .await?;
                Ok(UpsertOutcome::Inserted)
            }
        }
    })
    .await
}
