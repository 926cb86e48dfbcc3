use std::collections::HashMap;

use csv::StringRecord;

/// Ordered date-column candidates, most specific first.
pub const DATE_COLUMNS: &[&str] = &["transaction date", "posting date", "post date", "date"];

/// Direct signed-amount column candidates.
pub const AMOUNT_COLUMNS: &[&str] = &["amount", "transaction amount"];

pub const DESCRIPTION_COLUMNS: &[&str] = &[
    "transaction description",
    "description",
    "merchant",
    "narrative",
    "memo",
];

pub const TYPE_COLUMNS: &[&str] = &["transaction type", "type", "details", "dr/cr", "sign"];

/// Card/account-number columns used to synthesize an account label when no
/// explicit `source` column exists.
pub const ACCOUNT_NUMBER_COLUMNS: &[&str] =
    &["account name", "card no.", "card no", "account number"];

/// Case-insensitive map from header name to column index. Bank exports have
/// no fixed column order, so every field is resolved by name at import time.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    headers: HashMap<String, usize>,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord) -> Self {
        let headers = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_lowercase(), idx))
            .collect();
        Self { headers }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.headers.get(name).copied()
    }

    /// Non-empty trimmed field value for a named column, if present.
    pub fn field<'a>(&self, record: &'a StringRecord, name: &str) -> Option<&'a str> {
        let idx = self.index_of(name)?;
        record
            .get(idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// First non-empty field among an ordered candidate list.
    pub fn first_field<'a>(
        &self,
        record: &'a StringRecord,
        candidates: &[&str],
    ) -> Option<&'a str> {
        candidates.iter().find_map(|name| self.field(record, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> StringRecord {
        StringRecord::from(fields.to_vec())
    }

    #[test]
    fn headers_are_matched_case_insensitively() {
        let map = ColumnMap::from_headers(&record(&["Posting Date", " AMOUNT ", "Description"]));
        assert_eq!(map.index_of("posting date"), Some(0));
        assert_eq!(map.index_of("amount"), Some(1));
        assert_eq!(map.index_of("memo"), None);
    }

    #[test]
    fn field_skips_blank_values() {
        let map = ColumnMap::from_headers(&record(&["date", "amount"]));
        let row = record(&["2024-01-05", "   "]);
        assert_eq!(map.field(&row, "date"), Some("2024-01-05"));
        assert_eq!(map.field(&row, "amount"), None);
    }

    #[test]
    fn first_field_honors_priority_order() {
        let map = ColumnMap::from_headers(&record(&["date", "posting date"]));
        let row = record(&["2024-01-05", "2024-01-06"]);
        // "posting date" outranks plain "date" in the candidate list.
        assert_eq!(map.first_field(&row, DATE_COLUMNS), Some("2024-01-06"));
    }
}
