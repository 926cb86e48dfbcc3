pub mod canonical;
pub mod enrich;
pub mod fingerprint;
pub mod rules;

pub use canonical::{CanonicalTransaction, ImportMethod};
pub use enrich::{clean_display_description, enrich, Enrichment};
pub use fingerprint::{collapse_whitespace, fingerprint};
pub use rules::{
    CategoryRule, ExclusionMatcher, ExclusionPattern, ExclusionRule, MerchantRule, RuleSet,
    RuleSource,
};
