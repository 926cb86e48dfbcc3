use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalTransaction;
use crate::fingerprint::collapse_whitespace;
use crate::rules::RuleSet;

/// Output of the normalize -> categorize -> exclude pipeline.
///
/// Re-running enrichment with an unchanged rule set yields an identical
/// value; nothing here accumulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub clean_description: String,
    /// Always set: either a merchant rule hit or the cleaned description.
    pub standardized_merchant: String,
    /// None means uncategorized, a valid terminal state.
    pub category_id: Option<String>,
    pub merchant_rule_id: Option<i64>,
    pub category_rule_id: Option<i64>,
    pub is_excluded: bool,
}

fn store_number_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"#\s*\d+").unwrap())
}

/// Strip store numbers ("#123"), collapse whitespace, title-case.
/// "WHOLE FOODS MKT #2341" -> "Whole Foods Mkt".
pub fn clean_display_description(raw: &str) -> String {
    let stripped = store_number_re().replace_all(raw, "");
    collapse_whitespace(&stripped)
        .split(' ')
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Apply the rule set to a canonical record, in strict order:
///
/// 1. normalize: merchant rule by verbatim raw description, falling back to
///    the cleaned description so the standardized merchant is never empty;
/// 2. categorize: category rule by raw description, then by the resolved
///    standardized merchant;
/// 3. exclude: exclusion rules against the display description. Exclusion
///    is independent of categorization; excluded rows keep their category
///    and are filtered out at query time, never deleted.
pub fn enrich(tx: &CanonicalTransaction, rules: &RuleSet) -> Enrichment {
    let clean_description = clean_display_description(&tx.raw_description);

    let (standardized_merchant, merchant_rule_id) = match rules.merchant_for(&tx.raw_description) {
        Some(rule) => (rule.standardized_merchant.clone(), rule.id),
        None => (clean_description.clone(), None),
    };

    let category_hit = rules
        .category_for(&tx.raw_description)
        .or_else(|| rules.category_for(&standardized_merchant));
    let (category_id, category_rule_id) = match category_hit {
        Some(rule) => (Some(rule.category_id.clone()), rule.id),
        None => (None, None),
    };

    Enrichment {
        clean_description,
        standardized_merchant,
        category_id,
        merchant_rule_id,
        category_rule_id,
        is_excluded: rules.is_excluded(&tx.description),
    }
}
