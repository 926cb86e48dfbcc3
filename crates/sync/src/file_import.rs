use std::path::Path;

use ledgerline_core::ImportMethod;
use ledgerline_import::read_transactions_file;
use ledgerline_storage::{load_rule_set, DbPool};
use serde::Serialize;

use crate::reconcile::{reconcile_records, IncomingRecord};
use crate::SyncError;

#[derive(Debug, Default, Serialize)]
pub struct FileImportOutcome {
    /// Data rows in the file, parseable or not.
    pub total_rows: usize,
    pub added: usize,
    pub merged: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Import a bank statement file end to end: parse, enrich, reconcile.
/// The whole batch commits or none of it does.
pub async fn import_file(pool: &DbPool, path: &Path) -> Result<FileImportOutcome, SyncError> {
    let parsed = read_transactions_file(path)?;
    let rules = load_rule_set(pool).await?;

    let source_label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    tracing::info!(file = %source_label, rows = parsed.total_rows, "importing statement file");

    let records: Vec<IncomingRecord> = parsed
        .transactions
        .into_iter()
        .map(|canonical| IncomingRecord {
            canonical,
            remote_id: None,
            import_method: ImportMethod::File,
            source_label: source_label.clone(),
        })
        .collect();

    let mut tx = pool.begin().await?;
    let outcome = reconcile_records(&mut tx, &records, &rules).await?;
    tx.commit().await?;

    let mut errors: Vec<String> = parsed
        .skipped_rows
        .into_iter()
        .map(|skip| format!("row {}: {}", skip.row, skip.reason))
        .collect();
    errors.extend(outcome.errors);

    Ok(FileImportOutcome {
        total_rows: parsed.total_rows,
        added: outcome.added,
        merged: outcome.merged,
        skipped: outcome.skipped,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_storage::{
        create_db, list_transactions, upsert_category, upsert_category_rule, upsert_merchant_rule,
        QueryContext,
    };
    use ledgerline_core::RuleSource;
    use rust_decimal::Decimal;
    use std::io::Write as _;
    use std::str::FromStr;

    async fn test_pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn statement_flows_from_csv_to_ledger() {
        let (_dir, pool) = test_pool().await;
        let path = write_file(
            &_dir,
            "statement.csv",
            "Date,Description,Amount\n\
             2024-03-05,WHOLE FOODS #123,-45.00\n\
             2024-03-05,WHOLE FOODS #123,-45.00\n\
             2024-03-06,PAYCHECK,2500.00\n",
        );

        let outcome = import_file(&pool, &path).await.unwrap();
        assert_eq!(outcome.total_rows, 3);
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.errors.is_empty());

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.source_label == "statement.csv"));
        assert!(rows.iter().all(|r| r.import_method == ImportMethod::File));
    }

    #[tokio::test]
    async fn merchant_rule_bridges_to_category_rule() {
        let (_dir, pool) = test_pool().await;
        upsert_category(&pool, "Food::Groceries::Base", "Food", "Groceries", None, false)
            .await
            .unwrap();
        upsert_merchant_rule(&pool, "WHOLE FOODS #123", "Whole Foods", false)
            .await
            .unwrap();
        // Trigger matches the standardized merchant, not the raw text.
        upsert_category_rule(
            &pool,
            "Whole Foods",
            "Food::Groceries::Base",
            RuleSource::Manual,
            false,
        )
        .await
        .unwrap();

        let path = write_file(
            &_dir,
            "statement.csv",
            "Date,Description,Amount\n2024-03-05,WHOLE FOODS #123,-45.00\n",
        );
        import_file(&pool, &path).await.unwrap();

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows[0].standardized_merchant, "Whole Foods");
        assert_eq!(rows[0].category_id.as_deref(), Some("Food::Groceries::Base"));
    }

    #[tokio::test]
    async fn unparseable_rows_surface_as_errors() {
        let (_dir, pool) = test_pool().await;
        let path = write_file(
            &_dir,
            "statement.csv",
            "Date,Description,Amount\n\
             not-a-date,MYSTERY,-1.00\n\
             2024-03-05,SHELL OIL,-30.25\n",
        );

        let outcome = import_file(&pool, &path).await.unwrap();
        assert_eq!(outcome.total_rows, 2);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.errors.len(), 1);

        let rows = list_transactions(&pool, &QueryContext::default()).await.unwrap();
        assert_eq!(rows[0].amount, Decimal::from_str("-30.25").unwrap());
    }
}
