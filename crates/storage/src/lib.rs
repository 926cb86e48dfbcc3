pub mod db;
pub mod rules;
pub mod staging;
pub mod transactions;

pub use db::{create_db, get_setting, set_setting, DbPool, StorageError};
pub use rules::{
    category_ids, category_rule_keys, exclusion_values, load_rule_set, merchant_rule_keys,
    upsert_category, upsert_category_rule, upsert_exclusion_rule, upsert_merchant_rule,
    UpsertOutcome,
};
pub use staging::{
    delete_staged, insert_staged, list_pending_staged, staged_by_ids, staged_external_ids,
    NewStagedTransaction, StagedTransaction,
};
pub use transactions::{
    find_by_fingerprint, find_id_by_remote_id, get_transaction, insert_transaction,
    list_transactions, remote_ids, update_enrichment, upgrade_from_remote, FingerprintMatch,
    NewTransaction, PersistedTransaction, QueryContext,
};
