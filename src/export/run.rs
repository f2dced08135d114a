//! Product and customer export runs

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::ExportSettings;
use crate::db::{RecordSource, SourceError};
use crate::manifest::{ExportManifest, ItemOutcome, ManifestBuilder, ManifestError};

use super::catalog;
use super::envelope::{CatalogData, ExportEnvelope};
use super::{Denormalizer, Document, DocumentBatch, ItemFailure, RecordKey};

/// Run-level failures; per-record problems never surface here
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// A finished export: the file contents plus the per-record manifest
#[derive(Debug)]
pub struct ExportRun<T> {
    pub envelope: ExportEnvelope<T>,
    pub manifest: ExportManifest,
}

/// Export active products with variants, images, categories, attributes
/// and related products, plus the full category tree
#[instrument(skip_all)]
pub async fn export_products(
    source: Arc<dyn RecordSource>,
    settings: &ExportSettings,
    cancel: CancellationToken,
) -> Result<ExportRun<CatalogData>, ExportError> {
    let mut builder = ManifestBuilder::start();

    let batch = denormalizer(source.clone(), settings, cancel)
        .build_documents(&catalog::product_root(), &catalog::product_relations())
        .await?;
    let products = record_batch(&mut builder, batch)?;

    let categories = source.fetch_rows(&catalog::CATEGORIES, &[]).await?;
    info!("Fetched {} categories", categories.len());

    let manifest = builder.finalize()?;
    let envelope = ExportEnvelope::catalog(&Utc::now(), &settings.platform, products, categories);

    Ok(ExportRun { envelope, manifest })
}

/// Export active customers with addresses, order summary and saved
/// payment methods
#[instrument(skip_all)]
pub async fn export_customers(
    source: Arc<dyn RecordSource>,
    settings: &ExportSettings,
    cancel: CancellationToken,
) -> Result<ExportRun<Vec<Document>>, ExportError> {
    let mut builder = ManifestBuilder::start();

    let batch = denormalizer(source, settings, cancel)
        .build_documents(&catalog::customer_root(), &catalog::customer_relations())
        .await?;
    let customers = record_batch(&mut builder, batch)?;

    let manifest = builder.finalize()?;
    let envelope = ExportEnvelope::customers(&Utc::now(), &settings.platform, customers);

    Ok(ExportRun { envelope, manifest })
}

/// Assemble product documents only, without the category tree
///
/// Image mirroring needs nothing beyond the products themselves.
#[instrument(skip_all)]
pub async fn product_documents(
    source: Arc<dyn RecordSource>,
    settings: &ExportSettings,
    cancel: CancellationToken,
) -> Result<DocumentBatch, SourceError> {
    denormalizer(source, settings, cancel)
        .build_documents(&catalog::product_root(), &catalog::product_relations())
        .await
}

fn denormalizer(
    source: Arc<dyn RecordSource>,
    settings: &ExportSettings,
    cancel: CancellationToken,
) -> Denormalizer {
    Denormalizer::new(source)
        .with_concurrency(settings.concurrency)
        .with_cancellation(cancel)
}

/// Feed a batch into the manifest and hand back the documents
fn record_batch(
    builder: &mut ManifestBuilder<RecordKey, ItemFailure>,
    batch: DocumentBatch,
) -> Result<Vec<Document>, ManifestError> {
    builder.enumerate(batch.attempted());
    for document in &batch.documents {
        builder.record(ItemOutcome::Succeeded(document.id().clone()))?;
    }
    for failure in batch.failures {
        builder.record(ItemOutcome::Failed(failure))?;
    }
    Ok(batch.documents)
}
