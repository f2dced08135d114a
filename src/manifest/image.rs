//! Image mirror manifest (`image_manifest.json`)

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::mirror::{Downloaded, FailedTransfer};

use super::{format_timestamp, Manifest};

pub const IMAGE_MANIFEST_FILE: &str = "image_manifest.json";

/// Stored images and failed downloads of one mirror run
pub type ImageManifest = Manifest<Downloaded, FailedTransfer>;

#[derive(Serialize)]
struct ImageManifestFile<'a> {
    run_id: Uuid,
    download_date: String,
    /// Images stored successfully
    total_images: usize,
    errors: usize,
    total_attempted: usize,
    images: &'a [Downloaded],
    failed_downloads: &'a [FailedTransfer],
}

/// Write the manifest into `output_dir` and return its path
pub fn write_image_manifest(manifest: &ImageManifest, output_dir: &Path) -> std::io::Result<PathBuf> {
    let file = ImageManifestFile {
        run_id: manifest.run_id(),
        download_date: format_timestamp(&manifest.started_at()),
        total_images: manifest.succeeded().len(),
        errors: manifest.failed().len(),
        total_attempted: manifest.attempted(),
        images: manifest.succeeded(),
        failed_downloads: manifest.failed(),
    };

    let path = output_dir.join(IMAGE_MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(&file)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
