use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use ledgerline_core::{enrich, CanonicalTransaction};
use ledgerline_storage::{
    get_setting, list_pending_staged, list_transactions, load_rule_set, set_setting,
    update_enrichment, DbPool, QueryContext,
};
use ledgerline_sync::{
    approve_staged, claim_setup_token, import_file, reject_staged, sync_to_staging, RemoteClient,
    SyncOptions,
};

/// Settings key holding the claimed bank feed access URL.
const SETTING_ACCESS_URL: &str = "sync.access_url";

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn import(pool: &DbPool, file: &Path) -> anyhow::Result<()> {
    let outcome = import_file(pool, file)
        .await
        .with_context(|| format!("importing {}", file.display()))?;
    print_json(&outcome)
}

pub async fn import_merchants(
    pool: &DbPool,
    file: &Path,
    replace: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let data = std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let outcome = ledgerline_sync::import_merchant_rules(pool, data, replace, dry_run).await?;
    print_json(&outcome)
}

pub async fn import_categories(
    pool: &DbPool,
    file: &Path,
    replace: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let data = std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let outcome = ledgerline_sync::import_category_rules(pool, data, replace, dry_run).await?;
    print_json(&outcome)
}

pub async fn import_taxonomy(
    pool: &DbPool,
    file: &Path,
    replace: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let data = std::fs::File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let outcome = ledgerline_sync::import_taxonomy(pool, data, replace, dry_run).await?;
    print_json(&outcome)
}

pub async fn import_exclusions(
    pool: &DbPool,
    file: &Path,
    replace: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("opening {}", file.display()))?;
    let outcome = ledgerline_sync::import_exclusions(pool, &content, replace, dry_run).await?;
    print_json(&outcome)
}

pub async fn claim(pool: &DbPool, token: &str) -> anyhow::Result<()> {
    let access_url = claim_setup_token(token).await?;
    set_setting(pool, SETTING_ACCESS_URL, &access_url).await?;
    println!("Bank feed connected.");
    Ok(())
}

pub async fn sync(pool: &DbPool, lookback: u64) -> anyhow::Result<()> {
    let access_url = get_setting(pool, SETTING_ACCESS_URL)
        .await?
        .context("no bank feed connected; run `ledgerline claim <token>` first")?;
    let client = RemoteClient::new(&access_url)?;
    let opts = SyncOptions::load(pool, lookback).await?;
    let stats = sync_to_staging(pool, &client, &opts).await?;
    print_json(&stats)
}

pub async fn staged_list(pool: &DbPool) -> anyhow::Result<()> {
    let staged = list_pending_staged(pool).await?;
    if staged.is_empty() {
        println!("Nothing staged.");
        return Ok(());
    }
    for row in staged {
        println!(
            "{:>5}  {}  {:>12}  {}  [{}]",
            row.id, row.occurred_on, row.amount, row.description, row.account_label
        );
    }
    Ok(())
}

pub async fn approve(pool: &DbPool, ids: &[i64]) -> anyhow::Result<()> {
    let outcome = approve_staged(pool, ids).await?;
    print_json(&outcome)
}

pub async fn reject(pool: &DbPool, ids: &[i64]) -> anyhow::Result<()> {
    let removed = reject_staged(pool, ids).await?;
    println!("Rejected {removed} staged transaction(s).");
    Ok(())
}

pub async fn list(
    pool: &DbPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    include_excluded: bool,
) -> anyhow::Result<()> {
    let ctx = QueryContext {
        start,
        end,
        include_excluded,
    };
    let rows = list_transactions(pool, &ctx).await?;
    for row in &rows {
        let flag = if row.is_excluded { " excluded" } else { "" };
        println!(
            "{:>6}  {}  {:>12}  {:<30}  {}{}",
            row.id,
            row.occurred_on,
            row.amount,
            row.standardized_merchant,
            row.category_id.as_deref().unwrap_or("-"),
            flag
        );
    }
    println!("{} transaction(s)", rows.len());
    Ok(())
}

/// Re-enrich every stored row with the current rule set. Identity and
/// amounts never change here, only the derived fields.
pub async fn reapply_rules(pool: &DbPool) -> anyhow::Result<()> {
    let rules = load_rule_set(pool).await?;
    let ctx = QueryContext {
        include_excluded: true,
        ..Default::default()
    };
    let rows = list_transactions(pool, &ctx).await?;
    let total = rows.len();
    let mut changed = 0usize;

    for row in rows {
        let canonical = CanonicalTransaction {
            occurred_on: row.occurred_on,
            amount: row.amount,
            description: row.description.clone(),
            raw_description: row.raw_description.clone(),
            transaction_type: row.transaction_type.clone(),
            account_label: row.account_label.clone(),
        };
        let enrichment = enrich(&canonical, &rules);
        let unchanged = enrichment.clean_description == row.clean_description
            && enrichment.standardized_merchant == row.standardized_merchant
            && enrichment.category_id == row.category_id
            && enrichment.is_excluded == row.is_excluded;
        if unchanged {
            continue;
        }
        update_enrichment(pool, row.id, &enrichment).await?;
        changed += 1;
    }

    tracing::info!(total, changed, "rule reapplication complete");
    println!("Re-enriched {changed} of {total} transaction(s).");
    Ok(())
}
