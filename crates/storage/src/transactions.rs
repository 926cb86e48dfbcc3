use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;
use ledgerline_core::{CanonicalTransaction, Enrichment, ImportMethod};
use rust_decimal::Decimal;
use sqlx::Sqlite;

use crate::db::{DbPool, StorageError};

/// The store's durable record of one economic event.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedTransaction {
    pub id: i64,
    /// Externally-issued unique id; set only for remote-sourced rows.
    pub remote_id: Option<String>,
    /// Content hash; indexed but non-unique.
    pub fingerprint: String,
    pub occurred_on: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub raw_description: String,
    pub transaction_type: Option<String>,
    pub account_label: String,
    pub clean_description: String,
    pub standardized_merchant: String,
    pub category_id: Option<String>,
    pub is_excluded: bool,
    pub import_method: ImportMethod,
    pub source_label: String,
}

/// Everything needed to persist a record for the first time.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub canonical: CanonicalTransaction,
    pub enrichment: Enrichment,
    pub fingerprint: String,
    pub remote_id: Option<String>,
    pub import_method: ImportMethod,
    pub source_label: String,
}

/// Identity information of an existing row that shares a fingerprint with
/// an incoming record.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintMatch {
    pub id: i64,
    pub remote_id: Option<String>,
}

/// Explicit filter context for list queries. Views are functions of
/// (context, query result); there is no process-wide filter state.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub include_excluded: bool,
}

type TransactionRow = (
    i64,
    Option<String>,
    String,
    NaiveDate,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    Option<String>,
    bool,
    String,
    String,
);

const TRANSACTION_COLUMNS: &str = "id, remote_id, fingerprint, occurred_on, amount, description, \
     raw_description, transaction_type, account_label, clean_description, \
     standardized_merchant, category_id, is_excluded, import_method, source_label";

fn from_row(r: TransactionRow) -> Result<PersistedTransaction, StorageError> {
    Ok(PersistedTransaction {
        id: r.0,
        remote_id: r.1,
        fingerprint: r.2,
        occurred_on: r.3,
        amount: Decimal::from_str(&r.4)
            .map_err(|_| StorageError::Invalid(format!("amount '{}'", r.4)))?,
        description: r.5,
        raw_description: r.6,
        transaction_type: r.7,
        account_label: r.8,
        clean_description: r.9,
        standardized_merchant: r.10,
        category_id: r.11,
        is_excluded: r.12,
        import_method: ImportMethod::from_str(&r.13).map_err(StorageError::Invalid)?,
        source_label: r.14,
    })
}

pub async fn insert_transaction<'e, E>(ex: E, tx: &NewTransaction) -> Result<i64, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO transactions (
            remote_id, fingerprint, occurred_on, amount, description,
            raw_description, transaction_type, account_label,
            clean_description, standardized_merchant, category_id,
            is_excluded, import_method, source_label
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&tx.remote_id)
    .bind(&tx.fingerprint)
    .bind(tx.canonical.occurred_on)
    .bind(tx.canonical.amount.to_string())
    .bind(&tx.canonical.description)
    .bind(&tx.canonical.raw_description)
    .bind(&tx.canonical.transaction_type)
    .bind(&tx.canonical.account_label)
    .bind(&tx.enrichment.clean_description)
    .bind(&tx.enrichment.standardized_merchant)
    .bind(&tx.enrichment.category_id)
    .bind(tx.enrichment.is_excluded)
    .bind(tx.import_method.as_str())
    .bind(&tx.source_label)
    .fetch_one(ex)
    .await?;
    Ok(row.0)
}

pub async fn find_id_by_remote_id<'e, E>(ex: E, remote_id: &str) -> Result<Option<i64>, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (i64,)>("SELECT id FROM transactions WHERE remote_id = ?")
        .bind(remote_id)
        .fetch_optional(ex)
        .await?;
    Ok(row.map(|r| r.0))
}

/// First persisted row (by insertion order) carrying the given fingerprint.
pub async fn find_by_fingerprint<'e, E>(
    ex: E,
    fingerprint: &str,
) -> Result<Option<FingerprintMatch>, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (i64, Option<String>)>(
        "SELECT id, remote_id FROM transactions WHERE fingerprint = ? ORDER BY id LIMIT 1",
    )
    .bind(fingerprint)
    .fetch_optional(ex)
    .await?;
    Ok(row.map(|r| FingerprintMatch {
        id: r.0,
        remote_id: r.1,
    }))
}

/// Upgrade a file-imported row in place once the remote feed confirms it.
///
/// Precondition: the row exists and has no `remote_id`. Postcondition: the
/// row carries the remote identity, the authoritative account label, the
/// remote channel's source label, and `import_method = remote_merge`; all
/// other fields (category, merchant, exclusion) are untouched.
pub async fn upgrade_from_remote<'e, E>(
    ex: E,
    id: i64,
    remote_id: &str,
    account_label: &str,
    source_label: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET remote_id = ?, account_label = ?, source_label = ?, import_method = ?
        WHERE id = ? AND remote_id IS NULL
        "#,
    )
    .bind(remote_id)
    .bind(account_label)
    .bind(source_label)
    .bind(ImportMethod::RemoteMerge.as_str())
    .bind(id)
    .execute(ex)
    .await?;

    if result.rows_affected() != 1 {
        return Err(StorageError::Upgrade(format!(
            "transaction {id} missing or already carries a remote id"
        )));
    }
    Ok(())
}

/// Rewrite the enrichment fields after a later rule application.
pub async fn update_enrichment<'e, E>(
    ex: E,
    id: i64,
    enrichment: &Enrichment,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE transactions
        SET clean_description = ?, standardized_merchant = ?, category_id = ?, is_excluded = ?
        WHERE id = ?
        "#,
    )
    .bind(&enrichment.clean_description)
    .bind(&enrichment.standardized_merchant)
    .bind(&enrichment.category_id)
    .bind(enrichment.is_excluded)
    .bind(id)
    .execute(ex)
    .await?;
    Ok(())
}

pub async fn get_transaction(pool: &DbPool, id: i64) -> Result<Option<PersistedTransaction>, StorageError> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(from_row).transpose()
}

/// All persisted remote identities, pre-loaded for set-membership checks
/// during a sync pass.
pub async fn remote_ids(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>(
        "SELECT remote_id FROM transactions WHERE remote_id IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Excluded rows are filtered here, at query time, never deleted.
pub async fn list_transactions(
    pool: &DbPool,
    ctx: &QueryContext,
) -> Result<Vec<PersistedTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        SELECT {TRANSACTION_COLUMNS} FROM transactions
        WHERE (?1 IS NULL OR occurred_on >= ?1)
          AND (?2 IS NULL OR occurred_on <= ?2)
          AND (?3 OR is_excluded = 0)
        ORDER BY occurred_on DESC, id DESC
        "#
    ))
    .bind(ctx.start)
    .bind(ctx.end)
    .bind(ctx.include_excluded)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(from_row).collect()
}
