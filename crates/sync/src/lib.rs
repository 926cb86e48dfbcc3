pub mod file_import;
pub mod reconcile;
pub mod remote;
pub mod rule_import;
pub mod stage;

pub use file_import::{import_file, FileImportOutcome};
pub use reconcile::{
    reconcile_batch, reconcile_records, IncomingRecord, ReconcileOutcome, RecordDisposition,
};
pub use remote::{
    claim_setup_token, AccessUrl, FetchResult, FetchedTransaction, RemoteClient, RemoteError,
};
pub use rule_import::{
    import_category_rules, import_exclusions, import_merchant_rules, import_taxonomy,
    PlannedChange, RuleImportOutcome,
};
pub use stage::{
    approve_staged, reject_staged, stage_fetched, sync_to_staging, ApproveOutcome, SyncOptions,
    SyncStats, REMOTE_CHANNEL,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] ledgerline_storage::StorageError),
    #[error(transparent)]
    Csv(#[from] ledgerline_import::CsvError),
    #[error(transparent)]
    RuleFile(#[from] ledgerline_import::RuleFileError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for SyncError {
    fn from(e: sqlx::Error) -> Self {
        SyncError::Storage(e.into())
    }
}
