//! Catalog test utilities

use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use app_version_gate::version::catalog::{CatalogStore, SqliteCatalog};
use app_version_gate::version::ingest::RecordDraft;
use app_version_gate::version::types::VersionRecord;

/// Deserialize a JSON draft, panicking on failure
pub fn draft(value: Value) -> RecordDraft {
    serde_json::from_value(value).unwrap()
}

/// Create a test catalog populated from JSON drafts, in insertion order
pub fn create_test_catalog(
    drafts: Vec<Value>,
) -> (TempDir, Arc<SqliteCatalog>, Vec<VersionRecord>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("catalog.db");
    let catalog = SqliteCatalog::new(&db_path).unwrap();

    let records = drafts
        .into_iter()
        .map(|value| {
            let record = draft(value).validate().unwrap();
            catalog.insert_record(&record).unwrap()
        })
        .collect();

    (temp_dir, Arc::new(catalog), records)
}
