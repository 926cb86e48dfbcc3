use chrono::NaiveDate;
use csv::StringRecord;
use ledgerline_core::{collapse_whitespace, CanonicalTransaction};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::columns::{
    ColumnMap, ACCOUNT_NUMBER_COLUMNS, AMOUNT_COLUMNS, DATE_COLUMNS, DESCRIPTION_COLUMNS,
    TYPE_COLUMNS,
};

/// Type-hint tokens that force an outflow sign.
const NEGATIVE_HINTS: &[&str] = &["withdrawal", "debit", "sale", "payment", "fee"];
/// Type-hint tokens that force an inflow sign.
const POSITIVE_HINTS: &[&str] = &["deposit", "credit", "refund"];

/// One way of reading an amount out of a row. Strategies are tried in
/// order until one produces a value; bank export schemas vary too much for
/// a single code path.
type AmountStrategy = fn(&StringRecord, &ColumnMap) -> Option<Decimal>;

const AMOUNT_STRATEGIES: &[AmountStrategy] = &[
    signed_amount_column,
    debit_credit_pair,
    type_hinted_magnitude,
];

/// Convert one raw CSV row into the canonical shape. Returns `None` when no
/// date or no amount can be resolved; malformed rows are expected in bank
/// exports and are skipped, not errors.
pub fn normalize_row(record: &StringRecord, map: &ColumnMap) -> Option<CanonicalTransaction> {
    let occurred_on = DATE_COLUMNS
        .iter()
        .filter_map(|name| map.field(record, name))
        .find_map(parse_date)?;

    let amount = AMOUNT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(record, map))?;

    let raw_description = map
        .first_field(record, DESCRIPTION_COLUMNS)
        .unwrap_or_default()
        .to_string();
    let description = collapse_whitespace(&raw_description);

    let transaction_type = map
        .first_field(record, TYPE_COLUMNS)
        .map(|s| s.to_string());

    Some(CanonicalTransaction {
        occurred_on,
        amount,
        description,
        raw_description,
        transaction_type,
        account_label: resolve_account_label(record, map),
    })
}

/// Strategy (a): a single signed amount column. Zero falls through so the
/// debit/credit pair or the type hint can still decide.
fn signed_amount_column(record: &StringRecord, map: &ColumnMap) -> Option<Decimal> {
    let raw = map.first_field(record, AMOUNT_COLUMNS)?;
    parse_amount(raw).filter(|v| !v.is_zero())
}

/// Strategy (b): split debit/credit magnitude columns, net = credit - debit.
fn debit_credit_pair(record: &StringRecord, map: &ColumnMap) -> Option<Decimal> {
    if map.index_of("debit").is_none() && map.index_of("credit").is_none() {
        return None;
    }
    let debit = map
        .field(record, "debit")
        .and_then(parse_amount)
        .map(|v| v.abs())
        .unwrap_or_default();
    let credit = map
        .field(record, "credit")
        .and_then(parse_amount)
        .map(|v| v.abs())
        .unwrap_or_default();
    let net = credit - debit;
    (!net.is_zero()).then_some(net)
}

/// Strategy (c): take the amount column as a magnitude and let the bank's
/// transaction-type vocabulary decide the sign.
fn type_hinted_magnitude(record: &StringRecord, map: &ColumnMap) -> Option<Decimal> {
    let value = map.first_field(record, AMOUNT_COLUMNS).and_then(parse_amount)?;
    let hint = map
        .first_field(record, TYPE_COLUMNS)
        .map(str::to_lowercase)
        .unwrap_or_default();

    if NEGATIVE_HINTS.iter().any(|t| hint.contains(t)) {
        Some(-value.abs())
    } else if POSITIVE_HINTS.iter().any(|t| hint.contains(t)) {
        Some(value.abs())
    } else {
        Some(value)
    }
}

fn resolve_account_label(record: &StringRecord, map: &ColumnMap) -> String {
    // The remote-feed CSV flavor carries the account name in "source".
    if let Some(source) = map.field(record, "source") {
        return source.to_string();
    }
    if let Some(number) = map.first_field(record, ACCOUNT_NUMBER_COLUMNS) {
        return format!("Account {number}");
    }
    "Imported CSV".to_string()
}

/// Accepts the common locale date formats seen in bank exports.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%m/%d/%y",
    ];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a currency amount: strips `$`, commas and spaces; accounting-style
/// parentheses mean negative.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned = s.replace([',', '$', ' '], "");
    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(headers: &[&str], fields: &[&str]) -> (StringRecord, ColumnMap) {
        let map = ColumnMap::from_headers(&StringRecord::from(headers.to_vec()));
        (StringRecord::from(fields.to_vec()), map)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn signed_amount_column_wins() {
        let (r, m) = row(
            &["Date", "Description", "Amount"],
            &["2024-01-05", "WHOLE FOODS #123", "-45.00"],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("-45.00"));
        assert_eq!(tx.raw_description, "WHOLE FOODS #123");
        assert_eq!(tx.occurred_on, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn debit_only_becomes_outflow() {
        let (r, m) = row(
            &["Date", "Description", "Debit", "Credit"],
            &["01/05/2024", "ATM", "12.50", ""],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("-12.50"));
    }

    #[test]
    fn credit_only_becomes_inflow() {
        let (r, m) = row(
            &["Date", "Description", "Debit", "Credit"],
            &["01/05/2024", "PAYROLL", "", "1,200.00"],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("1200.00"));
    }

    #[test]
    fn negative_debit_magnitude_is_absolute() {
        let (r, m) = row(
            &["Date", "Description", "Debit", "Credit"],
            &["01/05/2024", "FEE", "-3.00", ""],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("-3.00"));
    }

    #[test]
    fn type_hint_forces_sign_on_unsigned_amount() {
        let (r, m) = row(
            &["Date", "Description", "Amount", "Type"],
            &["2024-01-05", "GROCERIES", "0.00", "Sale"],
        );
        // Zero falls through strategy (a); the hint strategy keeps it parseable.
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("0.00"));

        let (r, m) = row(
            &["Date", "Description", "Debit", "Credit", "Amount", "Type"],
            &["2024-01-05", "GROCERIES", "", "", "25.00", "withdrawal"],
        );
        // Debit/credit both blank: hint vocabulary flips the magnitude.
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("-25.00"));
    }

    #[test]
    fn deposit_hint_forces_inflow() {
        let (r, m) = row(
            &["Date", "Description", "Debit", "Credit", "Amount", "Type"],
            &["2024-01-05", "CHECK", "", "", "-90.00", "DEPOSIT"],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.amount, dec("90.00"));
    }

    #[test]
    fn unparseable_date_rejects_row() {
        let (r, m) = row(
            &["Date", "Description", "Amount"],
            &["soon", "WHOLE FOODS", "-45.00"],
        );
        assert!(normalize_row(&r, &m).is_none());
    }

    #[test]
    fn missing_amount_rejects_row() {
        let (r, m) = row(&["Date", "Description"], &["2024-01-05", "WHOLE FOODS"]);
        assert!(normalize_row(&r, &m).is_none());
    }

    #[test]
    fn description_whitespace_is_collapsed_once() {
        let (r, m) = row(
            &["Date", "Description", "Amount"],
            &["2024-01-05", "ACME   CORP  LLC", "-5.00"],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.description, "ACME CORP LLC");
        assert_eq!(tx.raw_description, "ACME   CORP  LLC");
    }

    #[test]
    fn source_column_becomes_account_label() {
        let (r, m) = row(
            &["Date", "Description", "Amount", "Source"],
            &["2024-01-05", "X", "-1.00", "Chase Bank - TOTAL CHECKING"],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.account_label, "Chase Bank - TOTAL CHECKING");
    }

    #[test]
    fn card_number_synthesizes_label() {
        let (r, m) = row(
            &["Date", "Description", "Amount", "Card No."],
            &["2024-01-05", "X", "-1.00", "1234"],
        );
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.account_label, "Account 1234");
    }

    #[test]
    fn generic_fallback_label() {
        let (r, m) = row(&["Date", "Description", "Amount"], &["2024-01-05", "X", "-1.00"]);
        let tx = normalize_row(&r, &m).unwrap();
        assert_eq!(tx.account_label, "Imported CSV");
    }

    #[test]
    fn parse_amount_variants() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("(75.25)").unwrap(), dec("-75.25"));
        assert_eq!(parse_amount("-50").unwrap(), dec("-50"));
        assert!(parse_amount("n/a").is_none());
        assert!(parse_amount("").is_none());
    }

    #[test]
    fn parse_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        for s in ["2024-01-15", "01/15/2024", "2024/01/15", "01-15-2024", "01/15/24"] {
            assert_eq!(parse_date(s), Some(expected), "failed for {s}");
        }
        assert!(parse_date("yesterday").is_none());
    }
}
