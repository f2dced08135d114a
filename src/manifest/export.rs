//! Per-record manifest of a document export

use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use crate::export::{ItemFailure, RecordKey};

use super::{format_timestamp, Manifest};

/// Exported root keys and the records that were left out
pub type ExportManifest = Manifest<RecordKey, ItemFailure>;

#[derive(Serialize)]
struct ExportManifestFile<'a> {
    run_id: Uuid,
    export_date: String,
    export_type: &'a str,
    total_attempted: usize,
    total_records: usize,
    failed: usize,
    failed_records: &'a [ItemFailure],
}

/// Persist the manifest as pretty-printed JSON
pub fn write_export_manifest(
    manifest: &ExportManifest,
    export_type: &str,
    path: &Path,
) -> std::io::Result<()> {
    let file = ExportManifestFile {
        run_id: manifest.run_id(),
        export_date: format_timestamp(&manifest.started_at()),
        export_type,
        total_attempted: manifest.attempted(),
        total_records: manifest.succeeded().len(),
        failed: manifest.failed().len(),
        failed_records: manifest.failed(),
    };
    let json = serde_json::to_vec_pretty(&file)?;
    std::fs::write(path, json)
}
