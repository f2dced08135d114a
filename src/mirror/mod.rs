//! Resumable local mirror of product images
//!
//! Image references are pulled out of exported product documents, each one
//! becomes an [`AssetTask`] with a deterministic local path, and
//! [`AssetMirror`] downloads them concurrently. Re-running against the same
//! output directory overwrites files in place, so an interrupted run can
//! simply be started again.

mod fetcher;
mod outcome;
mod task;

pub use fetcher::AssetMirror;
pub use outcome::{
    AssetOutcome, Downloaded, FailedTransfer, FailureKind, PersistenceError, TransferError,
};
pub use task::{derive_local_path, AssetTask};
