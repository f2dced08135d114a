//! Per-image mirror results

use std::error::Error as _;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::manifest::ItemOutcome;

use super::AssetTask;

/// Where a transfer went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The remote answered with something other than a usable 200
    Remote,
    /// DNS, TLS, connect, timeout, redirect limit, body read
    Transport,
    /// The bytes arrived but could not be written locally
    Persistence,
    /// The run was cancelled before the transfer started
    Cancelled,
    /// An earlier task in the run already owns the same local path
    Duplicate,
}

/// Errors while fetching an image
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("HTTP 200 (empty body)")]
    EmptyBody,

    #[error("{0}")]
    Transport(String),
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TransferError::Status { .. } | TransferError::EmptyBody => FailureKind::Remote,
            TransferError::Transport(_) => FailureKind::Transport,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            TransferError::Status { status } => Some(*status),
            TransferError::EmptyBody => Some(200),
            TransferError::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        let what = if err.is_timeout() {
            "timed out"
        } else if err.is_redirect() {
            "too many redirects"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_body() || err.is_decode() {
            "body read failed"
        } else {
            "request failed"
        };

        // reqwest's own message hides the interesting part in the source chain
        let mut detail = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }

        TransferError::Transport(format!("{}: {}", what, detail))
    }
}

/// The fetched bytes could not be stored
#[derive(Error, Debug)]
#[error("write failed: {}: {source}", .path.display())]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A stored image, as listed in the image manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Downloaded {
    pub image_id: Value,
    pub original_url: String,
    pub local_path: PathBuf,
    pub product_sku: String,
    pub variant_sku: Option<String>,
    pub alt_text: Option<String>,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    /// Hex SHA-256 of the stored bytes
    pub sha256: String,
}

/// A failed image, with enough detail to queue a retry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedTransfer {
    pub image_id: Value,
    pub url: String,
    #[serde(rename = "error")]
    pub reason: String,
    pub http_status: Option<u16>,
    pub kind: FailureKind,
    pub product_sku: String,
    pub variant_sku: Option<String>,
}

impl FailedTransfer {
    fn new(task: &AssetTask, reason: String, http_status: Option<u16>, kind: FailureKind) -> Self {
        FailedTransfer {
            image_id: task.image_id.clone(),
            url: task.url.clone(),
            reason,
            http_status,
            kind,
            product_sku: task.product_sku.clone(),
            variant_sku: task.variant_sku.clone(),
        }
    }
}

/// Terminal state of one [`AssetTask`]
#[derive(Debug, Clone, PartialEq)]
pub enum AssetOutcome {
    Downloaded(Downloaded),
    Failed(FailedTransfer),
}

impl AssetOutcome {
    pub fn transfer_failed(task: &AssetTask, err: &TransferError) -> Self {
        AssetOutcome::Failed(FailedTransfer::new(task, err.to_string(), err.http_status(), err.kind()))
    }

    pub fn persist_failed(task: &AssetTask, err: &PersistenceError) -> Self {
        AssetOutcome::Failed(FailedTransfer::new(task, err.to_string(), None, FailureKind::Persistence))
    }

    pub fn cancelled(task: &AssetTask) -> Self {
        AssetOutcome::Failed(FailedTransfer::new(task, "cancelled".to_string(), None, FailureKind::Cancelled))
    }

    /// `task` derives the same local path as the earlier task `owner`
    pub fn duplicate(task: &AssetTask, owner: &AssetTask) -> Self {
        AssetOutcome::Failed(FailedTransfer::new(
            task,
            format!(
                "duplicate local path {} (already used by image {})",
                task.local_path.display(),
                owner.image_id
            ),
            None,
            FailureKind::Duplicate,
        ))
    }

    /// A worker died without reporting
    pub fn aborted(task: &AssetTask, detail: &str) -> Self {
        AssetOutcome::Failed(FailedTransfer::new(
            task,
            format!("worker aborted: {}", detail),
            None,
            FailureKind::Transport,
        ))
    }

    pub fn url(&self) -> &str {
        match self {
            AssetOutcome::Downloaded(d) => &d.original_url,
            AssetOutcome::Failed(f) => &f.url,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, AssetOutcome::Downloaded(_))
    }
}

impl From<AssetOutcome> for ItemOutcome<Downloaded, FailedTransfer> {
    fn from(outcome: AssetOutcome) -> Self {
        match outcome {
            AssetOutcome::Downloaded(d) => ItemOutcome::Succeeded(d),
            AssetOutcome::Failed(f) => ItemOutcome::Failed(f),
        }
    }
}
