use std::collections::HashSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::Sqlite;

use crate::db::{DbPool, StorageError};

/// A remote-fetched transaction held in quarantine until a human approves
/// or rejects it. Promotion and rejection both remove the row.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedTransaction {
    pub id: i64,
    /// Remote account id + transaction id, unique.
    pub external_id: String,
    pub occurred_on: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub account_label: String,
}

#[derive(Debug, Clone)]
pub struct NewStagedTransaction {
    pub external_id: String,
    pub occurred_on: NaiveDate,
    pub amount: Decimal,
    pub description: String,
    pub account_label: String,
}

type StagedRow = (i64, String, NaiveDate, String, String, String);

fn from_row(r: StagedRow) -> Result<StagedTransaction, StorageError> {
    Ok(StagedTransaction {
        id: r.0,
        external_id: r.1,
        occurred_on: r.2,
        amount: Decimal::from_str(&r.3)
            .map_err(|_| StorageError::Invalid(format!("staged amount '{}'", r.3)))?,
        description: r.4,
        account_label: r.5,
    })
}

pub async fn insert_staged<'e, E>(ex: E, tx: &NewStagedTransaction) -> Result<i64, StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        INSERT INTO staged_transactions (external_id, occurred_on, amount, description, account_label)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&tx.external_id)
    .bind(tx.occurred_on)
    .bind(tx.amount.to_string())
    .bind(&tx.description)
    .bind(&tx.account_label)
    .fetch_one(ex)
    .await?;
    Ok(row.0)
}

pub async fn list_pending_staged(pool: &DbPool) -> Result<Vec<StagedTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, StagedRow>(
        "SELECT id, external_id, occurred_on, amount, description, account_label \
         FROM staged_transactions WHERE status = 'pending' ORDER BY occurred_on DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(from_row).collect()
}

pub async fn staged_by_ids(pool: &DbPool, ids: &[i64]) -> Result<Vec<StagedTransaction>, StorageError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let row = sqlx::query_as::<_, StagedRow>(
            "SELECT id, external_id, occurred_on, amount, description, account_label \
             FROM staged_transactions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        if let Some(row) = row {
            out.push(from_row(row)?);
        }
    }
    Ok(out)
}

/// All quarantined external ids, pre-loaded for set-membership checks
/// during a sync pass.
pub async fn staged_external_ids(pool: &DbPool) -> Result<HashSet<String>, StorageError> {
    let rows = sqlx::query_as::<_, (String,)>("SELECT external_id FROM staged_transactions")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Removes a staged row; used by both promotion and rejection. Rejection
/// keeps no trace.
pub async fn delete_staged<'e, E>(ex: E, id: i64) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM staged_transactions WHERE id = ?")
        .bind(id)
        .execute(ex)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;

    fn staged(ext: &str) -> NewStagedTransaction {
        NewStagedTransaction {
            external_id: ext.to_string(),
            occurred_on: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            amount: Decimal::from_str("-12.50").unwrap(),
            description: "COFFEE BAR".to_string(),
            account_label: "Chase Bank - CHECKING".to_string(),
        }
    }

    #[tokio::test]
    async fn staging_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();

        let id = insert_staged(&pool, &staged("acct1-tx1")).await.unwrap();
        insert_staged(&pool, &staged("acct1-tx2")).await.unwrap();

        let pending = list_pending_staged(&pool).await.unwrap();
        assert_eq!(pending.len(), 2);

        let ids = staged_external_ids(&pool).await.unwrap();
        assert!(ids.contains("acct1-tx1") && ids.contains("acct1-tx2"));

        delete_staged(&pool, id).await.unwrap();
        assert_eq!(list_pending_staged(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn external_id_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();

        insert_staged(&pool, &staged("acct1-tx1")).await.unwrap();
        assert!(insert_staged(&pool, &staged("acct1-tx1")).await.is_err());
    }
}
