//! Decides, per incoming record, whether to insert a new row, merge into
//! an existing one, or skip as a duplicate.
//!
//! Remote identity always wins over content identity: a record whose
//! `remote_id` is already persisted is a duplicate no matter what its
//! fingerprint says.

use std::collections::HashSet;

use ledgerline_core::{enrich, fingerprint, CanonicalTransaction, ImportMethod, RuleSet};
use ledgerline_storage::{
    find_by_fingerprint, find_id_by_remote_id, insert_transaction, upgrade_from_remote, DbPool,
    NewTransaction, StorageError,
};
use serde::Serialize;
use sqlx::SqliteConnection;

/// One record headed for the store, with its channel metadata.
#[derive(Debug, Clone)]
pub struct IncomingRecord {
    pub canonical: CanonicalTransaction,
    pub remote_id: Option<String>,
    pub import_method: ImportMethod,
    pub source_label: String,
}

/// What happened to one record in a batch. `Failed` means the record has
/// no persisted counterpart; callers holding the record elsewhere (like
/// staging) must not discard it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    Added,
    Merged,
    Skipped,
    Failed,
}

/// Per-batch tally. `errors` holds row-level failures; the batch itself
/// still commits. `dispositions` lines up with the input slice by index.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileOutcome {
    pub total: usize,
    pub added: usize,
    pub merged: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub dispositions: Vec<RecordDisposition>,
}

impl ReconcileOutcome {
    fn record(&mut self, disposition: RecordDisposition) {
        match disposition {
            RecordDisposition::Added => self.added += 1,
            RecordDisposition::Merged => self.merged += 1,
            RecordDisposition::Skipped => self.skipped += 1,
            RecordDisposition::Failed => {}
        }
        self.dispositions.push(disposition);
    }
}

/// Reconcile a batch of records against the store on an open connection.
///
/// The caller owns the transaction boundary; every mutation either lands
/// with the caller's commit or is rolled back with it.
pub async fn reconcile_records(
    conn: &mut SqliteConnection,
    records: &[IncomingRecord],
    rules: &RuleSet,
) -> Result<ReconcileOutcome, StorageError> {
    let mut outcome = ReconcileOutcome {
        total: records.len(),
        ..Default::default()
    };
    // Fingerprints already accepted in this batch. Two identical rows in
    // one file produce one insert and one skip.
    let mut seen = HashSet::new();

    for record in records {
        if let Some(remote_id) = &record.remote_id {
            if find_id_by_remote_id(&mut *conn, remote_id).await?.is_some() {
                outcome.record(RecordDisposition::Skipped);
                continue;
            }
        }

        let fp = fingerprint(
            record.canonical.occurred_on,
            record.canonical.amount,
            &record.canonical.description,
        );

        if seen.contains(&fp) {
            outcome.record(RecordDisposition::Skipped);
            continue;
        }

        if let Some(existing) = find_by_fingerprint(&mut *conn, &fp).await? {
            if existing.remote_id.is_none() {
                if let Some(remote_id) = &record.remote_id {
                    match upgrade_from_remote(
                        &mut *conn,
                        existing.id,
                        remote_id,
                        &record.canonical.account_label,
                        &record.source_label,
                    )
                    .await
                    {
                        Ok(()) => {
                            outcome.record(RecordDisposition::Merged);
                            seen.insert(fp);
                        }
                        Err(e) => {
                            tracing::warn!(
                                description = %record.canonical.description,
                                error = %e,
                                "failed to merge record into existing row"
                            );
                            outcome
                                .errors
                                .push(format!("{}: {e}", record.canonical.description));
                            outcome.record(RecordDisposition::Failed);
                        }
                    }
                    continue;
                }
            }
            outcome.record(RecordDisposition::Skipped);
            seen.insert(fp);
            continue;
        }

        let enrichment = enrich(&record.canonical, rules);
        let new_tx = NewTransaction {
            canonical: record.canonical.clone(),
            enrichment,
            fingerprint: fp.clone(),
            remote_id: record.remote_id.clone(),
            import_method: record.import_method,
            source_label: record.source_label.clone(),
        };
        match insert_transaction(&mut *conn, &new_tx).await {
            Ok(_) => {
                outcome.record(RecordDisposition::Added);
                seen.insert(fp);
            }
            Err(e) => {
                tracing::warn!(
                    description = %record.canonical.description,
                    error = %e,
                    "failed to persist record"
                );
                outcome
                    .errors
                    .push(format!("{}: {e}", record.canonical.description));
                outcome.record(RecordDisposition::Failed);
            }
        }
    }

    Ok(outcome)
}

/// Convenience wrapper that runs the batch inside its own transaction.
pub async fn reconcile_batch(
    pool: &DbPool,
    records: &[IncomingRecord],
    rules: &RuleSet,
) -> Result<ReconcileOutcome, StorageError> {
    let mut tx = pool.begin().await?;
    let outcome = reconcile_records(&mut tx, records, rules).await?;
    tx.commit().await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerline_storage::{create_db, get_transaction, list_transactions, QueryContext};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn record(day: u32, amount: &str, desc: &str, remote_id: Option<&str>) -> IncomingRecord {
        IncomingRecord {
            canonical: CanonicalTransaction {
                occurred_on: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
                amount: Decimal::from_str(amount).unwrap(),
                description: desc.to_string(),
                raw_description: desc.to_string(),
                transaction_type: None,
                account_label: if remote_id.is_some() {
                    "Chase Bank - CHECKING".to_string()
                } else {
                    "Imported CSV".to_string()
                },
            },
            remote_id: remote_id.map(str::to_string),
            import_method: if remote_id.is_some() {
                ImportMethod::Remote
            } else {
                ImportMethod::File
            },
            source_label: if remote_id.is_some() {
                "bank-feed".to_string()
            } else {
                "statement.csv".to_string()
            },
        }
    }

    async fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn duplicate_rows_in_one_batch_insert_once() {
        let (_dir, pool) = test_pool().await;
        let rows = vec![
            record(5, "-45.00", "WHOLE FOODS #123", None),
            record(5, "-45.00", "WHOLE FOODS #123", None),
        ];
        let outcome = reconcile_batch(&pool, &rows, &RuleSet::empty()).await.unwrap();
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn remote_record_merges_into_file_row() {
        let (_dir, pool) = test_pool().await;
        // File import lands first, without a remote identity.
        let first = reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", None)],
            &RuleSet::empty(),
        )
        .await
        .unwrap();
        assert_eq!(first.added, 1);

        // The remote feed later confirms the same economic event.
        let second = reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", Some("acct1-tx9"))],
            &RuleSet::empty(),
        )
        .await
        .unwrap();
        assert_eq!(second.merged, 1);
        assert_eq!(second.added, 0);

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].remote_id.as_deref(), Some("acct1-tx9"));
        assert_eq!(rows[0].import_method, ImportMethod::RemoteMerge);
        assert_eq!(rows[0].account_label, "Chase Bank - CHECKING");
    }

    #[tokio::test]
    async fn known_remote_id_skips_regardless_of_content() {
        let (_dir, pool) = test_pool().await;
        reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", Some("acct1-tx9"))],
            &RuleSet::empty(),
        )
        .await
        .unwrap();

        // Same remote id, different content.
        let outcome = reconcile_batch(
            &pool,
            &[record(9, "-99.00", "SOMETHING ELSE", Some("acct1-tx9"))],
            &RuleSet::empty(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.added, 0);
    }

    #[tokio::test]
    async fn file_duplicate_of_remote_row_skips_without_downgrade() {
        let (_dir, pool) = test_pool().await;
        let first = reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", Some("acct1-tx9"))],
            &RuleSet::empty(),
        )
        .await
        .unwrap();
        assert_eq!(first.added, 1);

        let second = reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", None)],
            &RuleSet::empty(),
        )
        .await
        .unwrap();
        assert_eq!(second.skipped, 1);

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].import_method, ImportMethod::Remote);
    }

    #[tokio::test]
    async fn merge_failure_is_isolated_to_its_row() {
        let (_dir, pool) = test_pool().await;
        reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", None)],
            &RuleSet::empty(),
        )
        .await
        .unwrap();

        // Make every in-place upgrade fail at the storage layer.
        sqlx::query(
            "CREATE TRIGGER block_updates BEFORE UPDATE ON transactions \
             BEGIN SELECT RAISE(ABORT, 'database table is locked'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let outcome = reconcile_batch(
            &pool,
            &[
                record(5, "-45.00", "WHOLE FOODS #123", Some("acct1-tx9")),
                record(9, "-30.25", "SHELL OIL", None),
            ],
            &RuleSet::empty(),
        )
        .await
        .unwrap();

        // The failed merge is a row-level error; the rest of the batch lands.
        assert_eq!(outcome.merged, 0);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(
            outcome.dispositions,
            vec![RecordDisposition::Failed, RecordDisposition::Added]
        );

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        // The merge target is untouched.
        assert!(rows.iter().all(|r| r.remote_id.is_none()));
    }

    #[tokio::test]
    async fn inserted_rows_are_enriched() {
        let (_dir, pool) = test_pool().await;
        let rules = RuleSet::new(
            vec![ledgerline_core::MerchantRule {
                id: Some(1),
                raw_description: "WHOLE FOODS #123".to_string(),
                standardized_merchant: "Whole Foods Market".to_string(),
                is_active: true,
            }],
            Vec::new(),
            Vec::new(),
        );

        let outcome = reconcile_batch(
            &pool,
            &[record(5, "-45.00", "WHOLE FOODS #123", None)],
            &rules,
        )
        .await
        .unwrap();
        assert_eq!(outcome.added, 1);

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows[0].standardized_merchant, "Whole Foods Market");
    }

    #[tokio::test]
    async fn batch_rolls_back_when_commit_never_happens() {
        let (_dir, pool) = test_pool().await;
        {
            let mut tx = pool.begin().await.unwrap();
            let outcome = reconcile_records(
                &mut tx,
                &[record(5, "-45.00", "WHOLE FOODS #123", None)],
                &RuleSet::empty(),
            )
            .await
            .unwrap();
            assert_eq!(outcome.added, 1);
            // Dropped without commit.
        }
        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert!(rows.is_empty());

        // Sanity: ids start fresh after the rollback.
        assert!(get_transaction(&pool, 1).await.unwrap().is_none());
    }
}
