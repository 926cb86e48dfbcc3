//! Bulk rule imports from CSV exports. Every import supports a dry run
//! that reports the planned changes without touching the store.

use std::collections::HashSet;
use std::io::Read;

use ledgerline_import::{
    read_category_rule_file, read_exclusion_file, read_merchant_rule_file, read_taxonomy_file,
};
use ledgerline_core::RuleSource;
use ledgerline_storage::{
    category_ids, category_rule_keys, exclusion_values, merchant_rule_keys, upsert_category,
    upsert_category_rule, upsert_exclusion_rule, upsert_merchant_rule, DbPool, UpsertOutcome,
};
use serde::Serialize;

use crate::SyncError;

#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub key: String,
    pub action: &'static str,
}

#[derive(Debug, Default, Serialize)]
pub struct RuleImportOutcome {
    pub total_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
    /// Populated only on a dry run.
    pub preview: Option<Vec<PlannedChange>>,
}

/// Shared bookkeeping for one import pass. `existing` is the key set
/// loaded before the pass; dry runs mutate only the local copy.
struct ImportPass {
    existing: HashSet<String>,
    replace: bool,
    dry_run: bool,
    outcome: RuleImportOutcome,
}

impl ImportPass {
    fn new(existing: HashSet<String>, replace: bool, dry_run: bool, total_rows: usize) -> Self {
        Self {
            existing,
            replace,
            dry_run,
            outcome: RuleImportOutcome {
                total_rows,
                preview: dry_run.then(Vec::new),
                ..Default::default()
            },
        }
    }

    /// What this row would do, given current state.
    fn plan(&self, key: &str) -> &'static str {
        match (self.existing.contains(key), self.replace) {
            (true, false) => "skip",
            (true, true) => "update",
            (false, _) => "insert",
        }
    }

    fn record_plan(&mut self, key: &str) {
        let action = self.plan(key);
        self.tally(match action {
            "insert" => UpsertOutcome::Inserted,
            "update" => UpsertOutcome::Updated,
            _ => UpsertOutcome::SkippedExisting,
        });
        if let Some(preview) = &mut self.outcome.preview {
            preview.push(PlannedChange {
                key: key.to_string(),
                action,
            });
        }
        self.existing.insert(key.to_string());
    }

    fn tally(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.outcome.inserted += 1,
            UpsertOutcome::Updated => self.outcome.updated += 1,
            UpsertOutcome::SkippedExisting => self.outcome.skipped += 1,
        }
    }

    fn finish(self) -> RuleImportOutcome {
        self.outcome
    }
}

pub async fn import_merchant_rules<R: Read>(
    pool: &DbPool,
    data: R,
    replace: bool,
    dry_run: bool,
) -> Result<RuleImportOutcome, SyncError> {
    let rows = read_merchant_rule_file(data)?;
    let existing = merchant_rule_keys(pool).await?;
    let mut pass = ImportPass::new(existing, replace, dry_run, rows.len());

    for row in rows {
        if dry_run {
            pass.record_plan(&row.raw_description);
            continue;
        }
        match upsert_merchant_rule(pool, &row.raw_description, &row.standardized_merchant, replace)
            .await
        {
            Ok(outcome) => pass.tally(outcome),
            Err(e) => pass
                .outcome
                .errors
                .push(format!("{}: {e}", row.raw_description)),
        }
    }
    Ok(pass.finish())
}

/// Category rules must reference a known taxonomy id; rows that do not
/// are reported and skipped.
pub async fn import_category_rules<R: Read>(
    pool: &DbPool,
    data: R,
    replace: bool,
    dry_run: bool,
) -> Result<RuleImportOutcome, SyncError> {
    let rows = read_category_rule_file(data)?;
    let valid_ids = category_ids(pool).await?;
    let existing = category_rule_keys(pool).await?;
    let mut pass = ImportPass::new(existing, replace, dry_run, rows.len());

    for row in rows {
        if !valid_ids.contains(&row.category_id) {
            pass.outcome.errors.push(format!(
                "{}: unknown category id '{}'",
                row.trigger, row.category_id
            ));
            continue;
        }
        if dry_run {
            pass.record_plan(&row.trigger);
            continue;
        }
        match upsert_category_rule(pool, &row.trigger, &row.category_id, RuleSource::Import, replace)
            .await
        {
            Ok(outcome) => pass.tally(outcome),
            Err(e) => pass.outcome.errors.push(format!("{}: {e}", row.trigger)),
        }
    }
    Ok(pass.finish())
}

pub async fn import_taxonomy<R: Read>(
    pool: &DbPool,
    data: R,
    replace: bool,
    dry_run: bool,
) -> Result<RuleImportOutcome, SyncError> {
    let rows = read_taxonomy_file(data)?;
    let existing = category_ids(pool).await?;
    let mut pass = ImportPass::new(existing, replace, dry_run, rows.len());

    for row in rows {
        if dry_run {
            pass.record_plan(&row.id);
            continue;
        }
        match upsert_category(
            pool,
            &row.id,
            &row.section,
            &row.category,
            row.subcategory.as_deref(),
            replace,
        )
        .await
        {
            Ok(outcome) => pass.tally(outcome),
            Err(e) => pass.outcome.errors.push(format!("{}: {e}", row.id)),
        }
    }
    Ok(pass.finish())
}

pub async fn import_exclusions(
    pool: &DbPool,
    content: &str,
    replace: bool,
    dry_run: bool,
) -> Result<RuleImportOutcome, SyncError> {
    let rows = read_exclusion_file(content);
    let existing = exclusion_values(pool).await?;
    let mut pass = ImportPass::new(existing, replace, dry_run, rows.len());
    let mut seen_in_file = HashSet::new();

    for row in rows {
        let value = row.pattern.value().to_string();
        if !seen_in_file.insert(value.clone()) {
            pass.outcome.skipped += 1;
            pass.outcome
                .errors
                .push(format!("{value}: duplicate within file"));
            continue;
        }
        if dry_run {
            pass.record_plan(&value);
            continue;
        }
        match upsert_exclusion_rule(pool, &row.pattern, row.is_active, replace).await {
            Ok(outcome) => pass.tally(outcome),
            Err(e) => pass.outcome.errors.push(format!("{value}: {e}")),
        }
    }
    Ok(pass.finish())
}
