use std::io::Read;
use std::path::Path;

use ledgerline_core::CanonicalTransaction;
use thiserror::Error;

use crate::columns::ColumnMap;
use crate::normalize::normalize_row;

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A row that failed canonicalization, with its 1-based data row number.
#[derive(Debug, Clone)]
pub struct RowSkip {
    pub row: usize,
    pub reason: String,
}

/// Result of reading one bank export file. A file whose header matches no
/// known date column still parses; every row just lands in `skipped_rows`.
#[derive(Debug)]
pub struct ParsedFile {
    pub transactions: Vec<CanonicalTransaction>,
    pub total_rows: usize,
    pub skipped_rows: Vec<RowSkip>,
}

/// Read a headered bank CSV into canonical transactions. Row-level failures
/// never abort the file; a malformed row is recorded and processing moves on.
pub fn read_transactions<R: Read>(data: R) -> Result<ParsedFile, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let map = ColumnMap::from_headers(reader.headers()?);

    let mut transactions = Vec::new();
    let mut skipped_rows = Vec::new();
    let mut total_rows = 0usize;

    for result in reader.records() {
        total_rows += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                skipped_rows.push(RowSkip {
                    row: total_rows,
                    reason: format!("malformed CSV record: {e}"),
                });
                continue;
            }
        };
        match normalize_row(&record, &map) {
            Some(tx) => transactions.push(tx),
            None => {
                tracing::debug!(row = total_rows, "row has no parseable date or amount");
                skipped_rows.push(RowSkip {
                    row: total_rows,
                    reason: "no parseable date or amount".to_string(),
                });
            }
        }
    }

    Ok(ParsedFile {
        transactions,
        total_rows,
        skipped_rows,
    })
}

pub fn read_transactions_file(path: &Path) -> Result<ParsedFile, CsvError> {
    let file = std::fs::File::open(path)?;
    read_transactions(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_basic_file() {
        let data = b"Date,Description,Amount\n\
                     2024-01-05,WHOLE FOODS #123,-45.00\n\
                     2024-01-06,PAYROLL,1200.00\n";
        let parsed = read_transactions(data.as_ref()).unwrap();
        assert_eq!(parsed.total_rows, 2);
        assert_eq!(parsed.transactions.len(), 2);
        assert!(parsed.skipped_rows.is_empty());
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let data = b"Date,Description,Amount\n\
                     not-a-date,WHOLE FOODS,-45.00\n\
                     2024-01-06,PAYROLL,1200.00\n";
        let parsed = read_transactions(data.as_ref()).unwrap();
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.skipped_rows.len(), 1);
        assert_eq!(parsed.skipped_rows[0].row, 1);
    }

    #[test]
    fn file_without_date_columns_degenerates_to_all_skips() {
        let data = b"Foo,Bar\n1,2\n3,4\n";
        let parsed = read_transactions(data.as_ref()).unwrap();
        assert!(parsed.transactions.is_empty());
        assert_eq!(parsed.skipped_rows.len(), 2);
    }
}
