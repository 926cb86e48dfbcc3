//! Remote pull orchestration. Fetched transactions never reach the
//! ledger directly; they wait in staging until a human approves them.

use chrono::{DateTime, Days, NaiveDate, Utc};
use ledgerline_core::{collapse_whitespace, CanonicalTransaction, ImportMethod};
use ledgerline_storage::{
    delete_staged, get_setting, insert_staged, load_rule_set, remote_ids, staged_by_ids,
    staged_external_ids, DbPool, NewStagedTransaction,
};
use serde::Serialize;

use crate::reconcile::{reconcile_records, IncomingRecord, RecordDisposition};
use crate::remote::{FetchResult, RemoteClient};
use crate::SyncError;

/// Source label stamped on every remote-originated row.
pub const REMOTE_CHANNEL: &str = "bank-feed";

/// Settings key holding an override for the hard cutoff date.
pub const SETTING_SYNC_CUTOFF: &str = "sync.cutoff_date";

/// Nothing before this date is ever staged, whatever the feed returns.
/// Old history comes in via file import, where column handling is richer.
const DEFAULT_HARD_CUTOFF: (i32, u32, u32) = (2026, 1, 1);

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub lookback_days: u64,
    pub hard_cutoff: NaiveDate,
}

impl Default for SyncOptions {
    fn default() -> Self {
        let (y, m, d) = DEFAULT_HARD_CUTOFF;
        Self {
            lookback_days: 30,
            // Constant components, always a valid date.
            hard_cutoff: NaiveDate::from_ymd_opt(y, m, d)
                .unwrap_or(NaiveDate::MIN),
        }
    }
}

impl SyncOptions {
    /// Build options for a lookback, honoring a cutoff override stored in
    /// settings.
    pub async fn load(pool: &DbPool, lookback_days: u64) -> Result<Self, SyncError> {
        let mut opts = SyncOptions {
            lookback_days,
            ..Default::default()
        };
        if let Some(raw) = get_setting(pool, SETTING_SYNC_CUTOFF).await? {
            match raw.parse() {
                Ok(date) => opts.hard_cutoff = date,
                Err(_) => tracing::warn!(value = %raw, "ignoring unparseable cutoff setting"),
            }
        }
        Ok(opts)
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SyncStats {
    pub fetched: usize,
    pub staged: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Pull the remote window and quarantine anything new.
pub async fn sync_to_staging(
    pool: &DbPool,
    client: &RemoteClient,
    opts: &SyncOptions,
) -> Result<SyncStats, SyncError> {
    let today = Utc::now().date_naive();
    let start = today
        .checked_sub_days(Days::new(opts.lookback_days))
        .unwrap_or(opts.hard_cutoff)
        .max(opts.hard_cutoff);
    if start > today {
        tracing::info!(%start, %today, "sync window is entirely before the cutoff");
        return Ok(SyncStats::default());
    }
    let fetched = client.fetch_window(start, today).await;
    stage_fetched(pool, fetched, opts.hard_cutoff).await
}

/// Stage a fetch result, deduplicating against the ledger, the staging
/// table, and the batch itself.
pub async fn stage_fetched(
    pool: &DbPool,
    fetched: FetchResult,
    hard_cutoff: NaiveDate,
) -> Result<SyncStats, SyncError> {
    let mut stats = SyncStats {
        fetched: fetched.transactions.len(),
        errors: fetched.errors,
        ..Default::default()
    };
    let known_remote = remote_ids(pool).await?;
    let mut known_staged = staged_external_ids(pool).await?;

    let mut tx = pool.begin().await?;
    for item in &fetched.transactions {
        let external_id = format!("{}-{}", item.account_id, item.id);
        if known_remote.contains(&external_id) || known_staged.contains(&external_id) {
            stats.skipped += 1;
            continue;
        }
        let Some(occurred_on) = DateTime::from_timestamp(item.posted, 0).map(|dt| dt.date_naive())
        else {
            stats
                .errors
                .push(format!("{external_id}: posting timestamp out of range"));
            continue;
        };
        if occurred_on < hard_cutoff {
            stats.skipped += 1;
            continue;
        }
        let account_label = fetched
            .accounts
            .get(&item.account_id)
            .cloned()
            .unwrap_or_else(|| "Unknown Account".to_string());
        let staged = NewStagedTransaction {
            external_id: external_id.clone(),
            occurred_on,
            amount: item.amount,
            description: item.description.clone(),
            account_label,
        };
        match insert_staged(&mut *tx, &staged).await {
            Ok(_) => {
                stats.staged += 1;
                known_staged.insert(external_id);
            }
            Err(e) => stats.errors.push(format!("{external_id}: {e}")),
        }
    }
    tx.commit().await?;

    tracing::info!(
        fetched = stats.fetched,
        staged = stats.staged,
        skipped = stats.skipped,
        "sync pass complete"
    );
    Ok(stats)
}

#[derive(Debug, Default, Serialize)]
pub struct ApproveOutcome {
    pub requested: usize,
    pub added: usize,
    pub merged: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Promote staged rows into the ledger through the regular reconciliation
/// path, then clear them from staging. Promotion and cleanup share one
/// transaction. A row whose promotion fails stays quarantined; only
/// records that landed in the ledger (or were recognized as duplicates)
/// leave staging.
pub async fn approve_staged(pool: &DbPool, ids: &[i64]) -> Result<ApproveOutcome, SyncError> {
    let staged = staged_by_ids(pool, ids).await?;
    let rules = load_rule_set(pool).await?;

    let records: Vec<IncomingRecord> = staged
        .iter()
        .map(|row| IncomingRecord {
            canonical: CanonicalTransaction {
                occurred_on: row.occurred_on,
                amount: row.amount,
                description: collapse_whitespace(&row.description),
                raw_description: row.description.clone(),
                transaction_type: None,
                account_label: row.account_label.clone(),
            },
            remote_id: Some(row.external_id.clone()),
            import_method: ImportMethod::Remote,
            source_label: REMOTE_CHANNEL.to_string(),
        })
        .collect();

    let mut tx = pool.begin().await?;
    let outcome = reconcile_records(&mut tx, &records, &rules).await?;
    for (row, disposition) in staged.iter().zip(&outcome.dispositions) {
        if *disposition == RecordDisposition::Failed {
            continue;
        }
        delete_staged(&mut *tx, row.id).await?;
    }
    tx.commit().await?;

    Ok(ApproveOutcome {
        requested: ids.len(),
        added: outcome.added,
        merged: outcome.merged,
        skipped: outcome.skipped,
        errors: outcome.errors,
    })
}

/// Drop staged rows without a trace. The same external ids may be staged
/// again by a later sync.
pub async fn reject_staged(pool: &DbPool, ids: &[i64]) -> Result<usize, SyncError> {
    let staged = staged_by_ids(pool, ids).await?;
    let mut tx = pool.begin().await?;
    for row in &staged {
        delete_staged(&mut *tx, row.id).await?;
    }
    tx.commit().await?;
    Ok(staged.len())
}
