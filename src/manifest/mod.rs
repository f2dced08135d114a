//! Run manifests
//!
//! A manifest aggregates the per-item outcomes of one run (documents
//! exported, images mirrored) into a single summary that can be audited and
//! used as the work queue for a retry run.
//!
//! ```text
//! start() ──► enumerate(n) ──► record(outcome) × n ──► finalize()
//!  Started        Pending         Succeeded | Failed      Finalized
//! ```
//!
//! The builder is the only mutable form; [`Manifest`] is produced once by
//! [`ManifestBuilder::finalize`] and exposes no way to change it.

mod export;
mod image;

pub use export::{write_export_manifest, ExportManifest};
pub use image::{write_image_manifest, ImageManifest, IMAGE_MANIFEST_FILE};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Timestamp layout used by every artifact this tool writes
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a run timestamp for an output artifact
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Bookkeeping violations while accumulating outcomes
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Outcome recorded with no pending item")]
    NothingPending,

    #[error("{pending} item(s) still pending at finalize")]
    Unresolved { pending: usize },
}

/// Terminal state of one item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome<S, F> {
    Succeeded(S),
    Failed(F),
}

/// Open manifest for a run in progress
#[derive(Debug)]
pub struct ManifestBuilder<S, F> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    attempted: usize,
    pending: usize,
    succeeded: Vec<S>,
    failed: Vec<F>,
}

impl<S, F> ManifestBuilder<S, F> {
    /// Open an empty manifest and stamp the run start
    pub fn start() -> Self {
        ManifestBuilder {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            attempted: 0,
            pending: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Register `count` newly enumerated items as pending
    pub fn enumerate(&mut self, count: usize) {
        self.attempted += count;
        self.pending += count;
    }

    /// Move one pending item to its terminal state
    pub fn record(&mut self, outcome: ItemOutcome<S, F>) -> Result<(), ManifestError> {
        if self.pending == 0 {
            return Err(ManifestError::NothingPending);
        }
        self.pending -= 1;
        match outcome {
            ItemOutcome::Succeeded(s) => self.succeeded.push(s),
            ItemOutcome::Failed(f) => self.failed.push(f),
        }
        Ok(())
    }

    /// Items enumerated but not yet recorded
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Close the run; fails if any enumerated item was never recorded
    pub fn finalize(self) -> Result<Manifest<S, F>, ManifestError> {
        if self.pending > 0 {
            return Err(ManifestError::Unresolved { pending: self.pending });
        }
        Ok(Manifest {
            run_id: self.run_id,
            started_at: self.started_at,
            finalized_at: Utc::now(),
            attempted: self.attempted,
            succeeded: self.succeeded,
            failed: self.failed,
        })
    }
}

/// Finalized, immutable run summary
#[derive(Debug, Clone)]
pub struct Manifest<S, F> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finalized_at: DateTime<Utc>,
    attempted: usize,
    succeeded: Vec<S>,
    failed: Vec<F>,
}

impl<S, F> Manifest<S, F> {
    /// Aggregate a complete set of outcomes in one step
    pub fn build<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = ItemOutcome<S, F>>,
    {
        let mut builder = ManifestBuilder::start();
        for outcome in outcomes {
            builder.attempted += 1;
            match outcome {
                ItemOutcome::Succeeded(s) => builder.succeeded.push(s),
                ItemOutcome::Failed(f) => builder.failed.push(f),
            }
        }
        Manifest {
            run_id: builder.run_id,
            started_at: builder.started_at,
            finalized_at: Utc::now(),
            attempted: builder.attempted,
            succeeded: builder.succeeded,
            failed: builder.failed,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finalized_at(&self) -> DateTime<Utc> {
        self.finalized_at
    }

    /// Items enumerated over the run; always `succeeded + failed`
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> &[S] {
        &self.succeeded
    }

    pub fn failed(&self) -> &[F] {
        &self.failed
    }
}
