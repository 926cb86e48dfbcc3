use std::io::Read;

use ledgerline_core::ExclusionPattern;
use thiserror::Error;

use crate::columns::ColumnMap;

#[derive(Error, Debug)]
pub enum RuleFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("File must contain columns: {0}")]
    MissingColumns(&'static str),
}

/// One merchant-rule row parsed from a mapping CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantRuleRow {
    pub raw_description: String,
    pub standardized_merchant: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRuleRow {
    pub trigger: String,
    pub category_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyRow {
    pub id: String,
    pub section: String,
    pub category: String,
    pub subcategory: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExclusionRuleRow {
    pub pattern: ExclusionPattern,
    pub is_active: bool,
}

const MERCHANT_RAW_ALIASES: &[&str] = &["raw_description", "description"];
const MERCHANT_STD_ALIASES: &[&str] = &["standardized_merchant", "merchant", "standardized_name"];
const CATEGORY_TRIGGER_ALIASES: &[&str] = &["unmapped_description", "description", "merchant"];
const CATEGORY_ID_ALIASES: &[&str] = &["scsc_id", "id", "category_id"];
const TAXONOMY_ID_ALIASES: &[&str] = &["id", "scsc_id"];

fn resolve_alias(map: &ColumnMap, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|name| map.index_of(name))
}

/// Merchant mapping CSV: `raw_description`/`description` plus
/// `standardized_merchant`/`merchant`/`standardized_name`. Blank cells skip
/// the row.
pub fn read_merchant_rule_file<R: Read>(data: R) -> Result<Vec<MerchantRuleRow>, RuleFileError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let map = ColumnMap::from_headers(reader.headers()?);

    let raw_col = resolve_alias(&map, MERCHANT_RAW_ALIASES)
        .ok_or(RuleFileError::MissingColumns("raw_description, standardized_merchant"))?;
    let std_col = resolve_alias(&map, MERCHANT_STD_ALIASES)
        .ok_or(RuleFileError::MissingColumns("raw_description, standardized_merchant"))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw = record.get(raw_col).map(str::trim).unwrap_or_default();
        let std = record.get(std_col).map(str::trim).unwrap_or_default();
        if raw.is_empty() || std.is_empty() {
            continue;
        }
        rows.push(MerchantRuleRow {
            raw_description: raw.to_string(),
            standardized_merchant: std.to_string(),
        });
    }
    Ok(rows)
}

/// Category mapping CSV: `unmapped_description`/`description`/`merchant`
/// plus `scsc_id`/`id`/`category_id`. Referenced category ids are validated
/// against the taxonomy by the caller, which has store access.
pub fn read_category_rule_file<R: Read>(data: R) -> Result<Vec<CategoryRuleRow>, RuleFileError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let map = ColumnMap::from_headers(reader.headers()?);

    let trigger_col = resolve_alias(&map, CATEGORY_TRIGGER_ALIASES)
        .ok_or(RuleFileError::MissingColumns("unmapped_description, scsc_id"))?;
    let id_col = resolve_alias(&map, CATEGORY_ID_ALIASES)
        .ok_or(RuleFileError::MissingColumns("unmapped_description, scsc_id"))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let trigger = record.get(trigger_col).map(str::trim).unwrap_or_default();
        let id = record.get(id_col).map(str::trim).unwrap_or_default();
        if trigger.is_empty() || id.is_empty() {
            continue;
        }
        rows.push(CategoryRuleRow {
            trigger: trigger.to_string(),
            category_id: id.to_string(),
        });
    }
    Ok(rows)
}

/// Taxonomy CSV: `id`/`scsc_id`, `section`, `category`, optional
/// `subcategory`.
pub fn read_taxonomy_file<R: Read>(data: R) -> Result<Vec<TaxonomyRow>, RuleFileError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let map = ColumnMap::from_headers(reader.headers()?);

    let id_col = resolve_alias(&map, TAXONOMY_ID_ALIASES)
        .ok_or(RuleFileError::MissingColumns("id, section, category"))?;
    let sec_col = map
        .index_of("section")
        .ok_or(RuleFileError::MissingColumns("id, section, category"))?;
    let cat_col = map
        .index_of("category")
        .ok_or(RuleFileError::MissingColumns("id, section, category"))?;
    let sub_col = map.index_of("subcategory");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(id_col).map(str::trim).unwrap_or_default();
        let section = record.get(sec_col).map(str::trim).unwrap_or_default();
        let category = record.get(cat_col).map(str::trim).unwrap_or_default();
        if id.is_empty() || section.is_empty() || category.is_empty() {
            continue;
        }
        let subcategory = sub_col
            .and_then(|c| record.get(c))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        rows.push(TaxonomyRow {
            id: id.to_string(),
            section: section.to_string(),
            category: category.to_string(),
            subcategory,
        });
    }
    Ok(rows)
}

/// Guess the pattern kind for a bare exclusion value: regex metacharacters
/// mean regex, anything else is a substring rule.
pub fn infer_exclusion_pattern(value: &str) -> ExclusionPattern {
    let looks_like_regex = ["^", "$", ".*", "[", "(", "|"]
        .iter()
        .any(|m| value.contains(m));
    if looks_like_regex {
        ExclusionPattern::Regex(value.to_string())
    } else {
        ExclusionPattern::Contains(value.to_string())
    }
}

/// Exclusion import accepts two shapes: a CSV with a `value` header (plus
/// optional `rule_type` and `is_active` columns), or plain line-delimited
/// values whose type is inferred heuristically. An unknown `rule_type`
/// degrades to `contains` rather than failing the row.
pub fn read_exclusion_file(content: &str) -> Vec<ExclusionRuleRow> {
    let header_has_value = content
        .lines()
        .next()
        .map(|line| {
            line.split(',')
                .any(|cell| cell.trim().eq_ignore_ascii_case("value"))
        })
        .unwrap_or(false);

    if header_has_value {
        read_exclusion_csv(content)
    } else {
        content
            .lines()
            .filter_map(|line| {
                let value = line.split(',').next().unwrap_or("").trim();
                if value.is_empty() {
                    return None;
                }
                Some(ExclusionRuleRow {
                    pattern: infer_exclusion_pattern(value),
                    is_active: true,
                })
            })
            .collect()
    }
}

fn read_exclusion_csv(content: &str) -> Vec<ExclusionRuleRow> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let map = match reader.headers() {
        Ok(h) => ColumnMap::from_headers(h),
        Err(_) => return Vec::new(),
    };

    let mut rows = Vec::new();
    for record in reader.records().flatten() {
        let value = map.field(&record, "value").unwrap_or_default();
        if value.is_empty() {
            continue;
        }
        let kind = map.field(&record, "rule_type").unwrap_or("contains");
        let pattern = ExclusionPattern::from_parts(kind, value)
            .unwrap_or_else(|_| ExclusionPattern::Contains(value.to_string()));
        let is_active = map
            .field(&record, "is_active")
            .map(|v| matches!(v, "1" | "true" | "True" | "yes"))
            .unwrap_or(true);
        rows.push(ExclusionRuleRow { pattern, is_active });
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merchant_file_accepts_header_aliases() {
        let data = b"Description,Merchant\nWHOLE FOODS #123,Whole Foods\n,\n";
        let rows = read_merchant_rule_file(data.as_ref()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].raw_description, "WHOLE FOODS #123");
        assert_eq!(rows[0].standardized_merchant, "Whole Foods");
    }

    #[test]
    fn merchant_file_requires_both_columns() {
        let data = b"raw_description\nWHOLE FOODS\n";
        assert!(matches!(
            read_merchant_rule_file(data.as_ref()),
            Err(RuleFileError::MissingColumns(_))
        ));
    }

    #[test]
    fn category_file_accepts_id_aliases() {
        let data = b"merchant,category_id\nWhole Foods,Food::Groceries::Base\n";
        let rows = read_category_rule_file(data.as_ref()).unwrap();
        assert_eq!(rows[0].trigger, "Whole Foods");
        assert_eq!(rows[0].category_id, "Food::Groceries::Base");
    }

    #[test]
    fn taxonomy_file_with_optional_subcategory() {
        let data = b"ID,Section,Category,Subcategory\n\
                     Food::Groceries::Base,Food,Groceries,\n\
                     Housing::Rent::Base,Housing,Rent,Base\n";
        let rows = read_taxonomy_file(data.as_ref()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subcategory, None);
        assert_eq!(rows[1].subcategory.as_deref(), Some("Base"));
    }

    #[test]
    fn exclusion_csv_with_full_header() {
        let rows = read_exclusion_file(
            "rule_type,value,is_active\n\
             exact_match,VENMO PAYMENT,1\n\
             regex,^ZELLE,true\n\
             bogus_kind,transfer,0\n",
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].pattern.kind(), "exact_match");
        assert_eq!(rows[1].pattern.kind(), "regex");
        // Unknown kind degrades to contains, inactive flag preserved.
        assert_eq!(rows[2].pattern.kind(), "contains");
        assert!(!rows[2].is_active);
    }

    #[test]
    fn exclusion_lines_use_heuristic_kinds() {
        let rows = read_exclusion_file("^ZELLE.*\ntransfer\n\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pattern.kind(), "regex");
        assert_eq!(rows[1].pattern.kind(), "contains");
        assert!(rows.iter().all(|r| r.is_active));
    }

    #[test]
    fn infer_pattern_heuristic() {
        assert_eq!(infer_exclusion_pattern("CHECK (1023)").kind(), "regex");
        assert_eq!(infer_exclusion_pattern("monthly fee").kind(), "contains");
    }
}
