//! Relational-to-document export
//!
//! Root records (products, customers) are read through a [`RecordSource`],
//! their declared child relations are fetched per root key, and each root
//! becomes one self-contained [`Document`].
//!
//! [`RecordSource`]: crate::db::RecordSource

pub mod catalog;
mod denormalizer;
mod envelope;
mod relation;
mod run;

pub use denormalizer::Denormalizer;
pub use envelope::{CatalogData, ExportEnvelope};
pub use relation::{pivot, Cardinality, RelationShape, RelationSpec, RootSpec};
pub use run::{export_customers, export_products, product_documents, ExportRun};

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::db::{Row, SourceError, SqlParam};

/// Primary key of a root record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Int(i64),
    Text(String),
}

impl RecordKey {
    /// Read a key out of a fetched column value
    ///
    /// Only integers and non-empty strings identify a record.
    pub fn from_value(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Number(n) => n.as_i64().map(RecordKey::Int),
            Value::String(s) if !s.trim().is_empty() => Some(RecordKey::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_param(&self) -> SqlParam {
        match self {
            RecordKey::Int(v) => SqlParam::Int(*v),
            RecordKey::Text(v) => SqlParam::Text(v.clone()),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Int(v) => write!(f, "{}", v),
            RecordKey::Text(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for RecordKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordKey::Int(v) => serializer.serialize_i64(*v),
            RecordKey::Text(v) => serializer.serialize_str(v),
        }
    }
}

/// One fully assembled root record
///
/// Serializes as the root columns followed by one key per declared relation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Document {
    #[serde(skip)]
    id: RecordKey,
    body: Row,
}

impl Document {
    pub(crate) fn new(id: RecordKey, body: Row) -> Self {
        Document { id, body }
    }

    pub fn id(&self) -> &RecordKey {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }
}

/// Why a root record could not be turned into a document
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("root row has no usable `{column}` key")]
    MissingKey { column: &'static str },

    #[error("duplicate root key {0}")]
    DuplicateKey(RecordKey),

    #[error("relation `{relation}` failed: {source}")]
    Relation {
        relation: &'static str,
        #[source]
        source: SourceError,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("assembly task aborted: {0}")]
    Aborted(String),
}

/// A root record excluded from the export, with enough detail to retry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Root key, when one could be read
    pub id: Option<RecordKey>,
    /// Zero-based position in the root query's result
    pub position: usize,
    pub reason: String,
}

/// Result of one denormalization pass, in root-query order
#[derive(Debug, Default)]
pub struct DocumentBatch {
    pub documents: Vec<Document>,
    pub failures: Vec<ItemFailure>,
}

impl DocumentBatch {
    /// Root records seen: documents plus failures
    pub fn attempted(&self) -> usize {
        self.documents.len() + self.failures.len()
    }
}
