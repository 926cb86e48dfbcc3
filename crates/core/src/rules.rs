use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Maps a raw bank description to a standardized merchant name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantRule {
    pub id: Option<i64>,
    pub raw_description: String,
    pub standardized_merchant: String,
    pub is_active: bool,
}

/// Where a category rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    #[default]
    Manual,
    Ai,
    Import,
}

impl RuleSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleSource::Manual => "manual",
            RuleSource::Ai => "ai",
            RuleSource::Import => "import",
        }
    }
}

impl std::str::FromStr for RuleSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RuleSource::Manual),
            "ai" => Ok(RuleSource::Ai),
            "import" => Ok(RuleSource::Import),
            other => Err(format!("Unknown rule source: '{other}'")),
        }
    }
}

/// Maps a trigger description to a category id. Matching is exact and
/// case-insensitive, tried against the raw description first and the
/// standardized merchant second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: Option<i64>,
    pub trigger: String,
    pub category_id: String,
    pub source: RuleSource,
    pub is_active: bool,
}

/// A pattern that hides matching transactions from analytics views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", content = "value", rename_all = "snake_case")]
pub enum ExclusionPattern {
    ExactMatch(String),
    Contains(String),
    Regex(String),
}

impl ExclusionPattern {
    pub fn kind(&self) -> &'static str {
        match self {
            ExclusionPattern::ExactMatch(_) => "exact_match",
            ExclusionPattern::Contains(_) => "contains",
            ExclusionPattern::Regex(_) => "regex",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ExclusionPattern::ExactMatch(v)
            | ExclusionPattern::Contains(v)
            | ExclusionPattern::Regex(v) => v,
        }
    }

    /// Rebuild the variant from its persisted (kind, value) pair.
    pub fn from_parts(kind: &str, value: &str) -> Result<Self, String> {
        match kind {
            "exact_match" => Ok(ExclusionPattern::ExactMatch(value.to_string())),
            "contains" => Ok(ExclusionPattern::Contains(value.to_string())),
            "regex" => Ok(ExclusionPattern::Regex(value.to_string())),
            other => Err(format!("Unknown exclusion rule type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub id: Option<i64>,
    pub pattern: ExclusionPattern,
    pub is_active: bool,
}

/// Exclusion rule with its regex precompiled. A pattern that fails to
/// compile is kept but never matches; a bad rule must not abort evaluation.
struct CompiledExclusion {
    rule: ExclusionRule,
    compiled_regex: Option<regex::Regex>,
}

/// Evaluates exclusion rules in insertion order, first match wins.
pub struct ExclusionMatcher {
    rules: Vec<CompiledExclusion>,
}

impl ExclusionMatcher {
    pub fn new(rules: Vec<ExclusionRule>) -> Self {
        let compiled = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = match &rule.pattern {
                    ExclusionPattern::Regex(pat) => regex::RegexBuilder::new(pat)
                        .case_insensitive(true)
                        .build()
                        .ok(),
                    _ => None,
                };
                CompiledExclusion {
                    rule,
                    compiled_regex,
                }
            })
            .collect();
        Self { rules: compiled }
    }

    pub fn is_excluded(&self, description: &str) -> bool {
        self.rules
            .iter()
            .filter(|c| c.rule.is_active)
            .any(|c| match &c.rule.pattern {
                ExclusionPattern::ExactMatch(v) => v.eq_ignore_ascii_case(description),
                ExclusionPattern::Contains(v) => description
                    .to_lowercase()
                    .contains(&v.to_lowercase()),
                ExclusionPattern::Regex(_) => c
                    .compiled_regex
                    .as_ref()
                    .is_some_and(|re| re.is_match(description)),
            })
    }
}

/// An in-memory snapshot of the three rule tables, bulk-loaded once per
/// batch. Lookups never touch the store.
pub struct RuleSet {
    merchants: HashMap<String, MerchantRule>,
    categories: HashMap<String, CategoryRule>,
    exclusions: ExclusionMatcher,
}

impl RuleSet {
    pub fn new(
        merchants: Vec<MerchantRule>,
        categories: Vec<CategoryRule>,
        exclusions: Vec<ExclusionRule>,
    ) -> Self {
        let merchants = merchants
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| (r.raw_description.clone(), r))
            .collect();
        let categories = categories
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| (r.trigger.to_lowercase(), r))
            .collect();
        Self {
            merchants,
            categories,
            exclusions: ExclusionMatcher::new(exclusions),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new())
    }

    /// Exact match on the verbatim raw description.
    pub fn merchant_for(&self, raw_description: &str) -> Option<&MerchantRule> {
        self.merchants.get(raw_description)
    }

    /// Exact case-insensitive match on the trigger text.
    pub fn category_for(&self, text: &str) -> Option<&CategoryRule> {
        self.categories.get(&text.to_lowercase())
    }

    pub fn is_excluded(&self, description: &str) -> bool {
        self.exclusions.is_excluded(description)
    }
}
