use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The unified transaction shape produced from any source format, before
/// persistence. Positive amount = inflow, negative = outflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    pub occurred_on: NaiveDate,
    pub amount: Decimal,
    /// Display text, whitespace already collapsed.
    pub description: String,
    /// Original bank text, preserved verbatim.
    pub raw_description: String,
    /// Free-text bank hint, e.g. "debit" or "ACH_CREDIT".
    pub transaction_type: Option<String>,
    pub account_label: String,
}

/// How a persisted transaction entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMethod {
    File,
    Remote,
    /// A file-imported row later confirmed (and upgraded) by the remote feed.
    RemoteMerge,
    Manual,
}

impl ImportMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportMethod::File => "file",
            ImportMethod::Remote => "remote",
            ImportMethod::RemoteMerge => "remote_merge",
            ImportMethod::Manual => "manual",
        }
    }
}

impl std::str::FromStr for ImportMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ImportMethod::File),
            "remote" => Ok(ImportMethod::Remote),
            "remote_merge" => Ok(ImportMethod::RemoteMerge),
            "manual" => Ok(ImportMethod::Manual),
            other => Err(format!("Unknown import method: '{other}'")),
        }
    }
}

impl std::fmt::Display for ImportMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
