pub mod columns;
pub mod csv;
pub mod normalize;
pub mod rule_files;

pub use columns::ColumnMap;
pub use csv::{read_transactions, read_transactions_file, CsvError, ParsedFile, RowSkip};
pub use normalize::normalize_row;
pub use rule_files::{
    infer_exclusion_pattern, read_category_rule_file, read_exclusion_file,
    read_merchant_rule_file, read_taxonomy_file, CategoryRuleRow, ExclusionRuleRow,
    MerchantRuleRow, RuleFileError, TaxonomyRow,
};
