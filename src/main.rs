//! Catalog Migrate
//!
//! Command-line entry point: product and customer JSON exports, and the
//! local image mirror.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use catalog_migrate::config::Settings;
use catalog_migrate::db::{DbPool, PgRecordSource, RecordSource};
use catalog_migrate::export::{export_customers, export_products, product_documents, ExportRun};
use catalog_migrate::manifest::{write_export_manifest, write_image_manifest, ImageManifest, ManifestBuilder};
use catalog_migrate::mirror::{AssetMirror, AssetTask, Downloaded, FailedTransfer};

#[derive(Parser)]
#[command(name = "catalog-migrate", version, about = "Legacy catalog export and image mirror")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export active products with variants, images, categories and attributes
    Products {
        /// Write the export here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write a per-record manifest
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Export active customers with addresses, order summary and payment methods
    Customers {
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Download every product image into a local directory tree
    Images {
        output_dir: PathBuf,
        /// Concurrent downloads
        #[arg(long)]
        concurrency: Option<usize>,
        /// Skip TLS certificate validation
        #[arg(long)]
        insecure: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // stdout carries the export itself, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("catalog_migrate=info".parse()?),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load().context("Failed to load configuration")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Products { output, manifest } => {
            let source = connect(&settings).await?;
            let run = export_products(source, &settings.export, cancel)
                .await
                .context("Product export failed")?;
            finish_export(run, output.as_deref(), manifest.as_deref())
        }
        Command::Customers { output, manifest } => {
            let source = connect(&settings).await?;
            let run = export_customers(source, &settings.export, cancel)
                .await
                .context("Customer export failed")?;
            finish_export(run, output.as_deref(), manifest.as_deref())
        }
        Command::Images { output_dir, concurrency, insecure } => {
            if let Some(concurrency) = concurrency {
                settings.mirror.concurrency = concurrency;
            }
            settings.mirror.insecure |= insecure;
            mirror_images(&settings, &output_dir, cancel).await
        }
    }
}

async fn connect(settings: &Settings) -> Result<Arc<dyn RecordSource>> {
    let pool = DbPool::new(&settings.database).context("Failed to create database pool")?;
    pool.test_connection()
        .await
        .with_context(|| {
            format!(
                "Database connection failed ({}@{}:{}/{})",
                settings.database.user,
                settings.database.host,
                settings.database.port,
                settings.database.database
            )
        })?;
    info!("Database pool initialized successfully");
    Ok(Arc::new(PgRecordSource::new(pool)))
}

fn finish_export<T: Serialize>(
    run: ExportRun<T>,
    output: Option<&Path>,
    manifest_path: Option<&Path>,
) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            run.envelope
                .write_to(BufWriter::new(file))
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = std::io::stdout();
            run.envelope
                .write_to(BufWriter::new(stdout.lock()))
                .context("Failed to write export to stdout")?;
        }
    }

    if let Some(path) = manifest_path {
        write_export_manifest(&run.manifest, run.envelope.export_type, path)
            .with_context(|| format!("Failed to write manifest {}", path.display()))?;
    }

    for failure in run.manifest.failed() {
        let id = failure.id.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string());
        warn!(position = failure.position, "Record {} excluded: {}", id, failure.reason);
    }
    info!(
        export_type = run.envelope.export_type,
        attempted = run.manifest.attempted(),
        exported = run.manifest.succeeded().len(),
        failed = run.manifest.failed().len(),
        "Export complete"
    );
    if let Some(path) = manifest_path {
        info!("Manifest written to {}", path.display());
    }
    Ok(())
}

async fn mirror_images(settings: &Settings, output_dir: &Path, cancel: CancellationToken) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mirror = AssetMirror::new(&settings.mirror)
        .context("Failed to create HTTP client")?
        .with_cancellation(cancel.clone());

    let source = connect(settings).await?;
    let batch = product_documents(source, &settings.export, cancel)
        .await
        .context("Failed to read product images")?;

    for failure in &batch.failures {
        let id = failure.id.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string());
        warn!(position = failure.position, "Product {} not mirrored: {}", id, failure.reason);
    }

    let tasks = AssetTask::discover(output_dir, &batch.documents);
    info!("Found {} images to download", tasks.len());

    let mut builder: ManifestBuilder<Downloaded, FailedTransfer> = ManifestBuilder::start();
    builder.enumerate(tasks.len());
    for outcome in mirror.mirror(tasks).await {
        builder.record(outcome.into())?;
    }
    let manifest: ImageManifest = builder.finalize()?;

    let manifest_path = write_image_manifest(&manifest, output_dir)
        .with_context(|| format!("Failed to write image manifest in {}", output_dir.display()))?;

    info!(
        attempted = manifest.attempted(),
        downloaded = manifest.succeeded().len(),
        failed = manifest.failed().len(),
        manifest = %manifest_path.display(),
        "Image download complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_images_arguments() {
        let cli = Cli::try_parse_from(["catalog-migrate", "images", "out", "--concurrency", "4", "--insecure"]).unwrap();
        match cli.command {
            Command::Images { output_dir, concurrency, insecure } => {
                assert_eq!(output_dir, PathBuf::from("out"));
                assert_eq!(concurrency, Some(4));
                assert!(insecure);
            }
            _ => panic!("expected images subcommand"),
        }
    }

    #[test]
    fn test_products_defaults_to_stdout() {
        let cli = Cli::try_parse_from(["catalog-migrate", "products"]).unwrap();
        match cli.command {
            Command::Products { output, manifest } => {
                assert!(output.is_none());
                assert!(manifest.is_none());
            }
            _ => panic!("expected products subcommand"),
        }
    }
}
