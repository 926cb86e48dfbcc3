use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Collapse all whitespace runs to single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Content-based identity for a transaction: SHA-256 of
/// `YYYY-MM-DD|amount|description` with the amount rendered to exactly two
/// decimal places and the description whitespace-collapsed.
///
/// Two transactions with the same (date, amount-to-cent, description) triple
/// are considered the same economic event across sources. False positives
/// (two genuinely distinct identical purchases on one day) are an accepted
/// limitation of this scheme.
pub fn fingerprint(date: NaiveDate, amount: Decimal, description: &str) -> String {
    let raw = format!(
        "{}|{:.2}|{}",
        date.format("%Y-%m-%d"),
        amount.round_dp(2),
        collapse_whitespace(description)
    );
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest: [u8; 32] = hasher.finalize().into();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
