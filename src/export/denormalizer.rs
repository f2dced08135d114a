//! Document assembly over a record source
//!
//! One root query, then for every root row one dependent fetch per declared
//! relation. Roots are assembled concurrently (bounded by a semaphore); the
//! relation fetches of a single root run one after another.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::db::{Row, RecordSource, SourceError};

use super::relation::{RelationSpec, RootSpec};
use super::{AssemblyError, Document, DocumentBatch, ItemFailure, RecordKey};

const DEFAULT_CONCURRENCY: usize = 8;
const MAX_CONCURRENCY: usize = 64;

/// Builds nested documents from a root entity and its relations
#[derive(Clone)]
pub struct Denormalizer {
    source: Arc<dyn RecordSource>,
    concurrency: usize,
    cancel: CancellationToken,
}

/// A root row in flight, kept in root-query order
enum Slot {
    Rejected(ItemFailure),
    Spawned {
        key: RecordKey,
        position: usize,
        handle: JoinHandle<Result<Document, AssemblyError>>,
    },
}

impl Denormalizer {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }

    /// Set how many root records are assembled at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Stop starting new documents once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the root query and assemble one document per returned row
    ///
    /// Only a failing root query is returned as an error. Everything that
    /// goes wrong for a single root lands in [`DocumentBatch::failures`].
    #[instrument(skip_all, fields(root = root.query.label, relations = relations.len()))]
    pub async fn build_documents(
        &self,
        root: &RootSpec,
        relations: &[RelationSpec],
    ) -> Result<DocumentBatch, SourceError> {
        let rows = self.source.fetch_rows(&root.query, &[]).await?;
        info!("Root query returned {} records", rows.len());

        let relations: Arc<[RelationSpec]> = relations.into();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut seen = HashSet::with_capacity(rows.len());
        let mut slots = Vec::with_capacity(rows.len());

        for (position, row) in rows.into_iter().enumerate() {
            let key = match RecordKey::from_value(row.get(root.key_column)) {
                Some(key) => key,
                None => {
                    let err = AssemblyError::MissingKey { column: root.key_column };
                    warn!(position, "Skipping root record: {}", err);
                    slots.push(Slot::Rejected(ItemFailure {
                        id: None,
                        position,
                        reason: err.to_string(),
                    }));
                    continue;
                }
            };

            if !seen.insert(key.clone()) {
                let err = AssemblyError::DuplicateKey(key.clone());
                warn!(position, "Skipping root record: {}", err);
                slots.push(Slot::Rejected(ItemFailure {
                    id: Some(key),
                    position,
                    reason: err.to_string(),
                }));
                continue;
            }

            let source = self.source.clone();
            let relations = relations.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();
            let task_key = key.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AssemblyError::Cancelled),
                    permit = semaphore.acquire_owned() => {
                        permit.map_err(|_| AssemblyError::Cancelled)?
                    }
                };
                if cancel.is_cancelled() {
                    return Err(AssemblyError::Cancelled);
                }

                let result = assemble(source.as_ref(), task_key.clone(), row, &relations).await;
                match &result {
                    Ok(_) => info!(id = %task_key, "Assembled document"),
                    Err(e) => warn!(id = %task_key, "Document failed: {}", e),
                }
                result
            });

            slots.push(Slot::Spawned { key, position, handle });
        }

        let mut batch = DocumentBatch::default();
        for slot in slots {
            match slot {
                Slot::Rejected(failure) => batch.failures.push(failure),
                Slot::Spawned { key, position, handle } => {
                    let result = handle
                        .await
                        .unwrap_or_else(|e| Err(AssemblyError::Aborted(e.to_string())));
                    match result {
                        Ok(document) => batch.documents.push(document),
                        Err(err) => batch.failures.push(ItemFailure {
                            id: Some(key),
                            position,
                            reason: err.to_string(),
                        }),
                    }
                }
            }
        }

        info!(
            "Assembled {} documents ({} failed)",
            batch.documents.len(),
            batch.failures.len()
        );

        Ok(batch)
    }
}

/// Attach every relation to one root row
///
/// Either all required relations resolve or no document is produced.
async fn assemble(
    source: &dyn RecordSource,
    key: RecordKey,
    mut body: Row,
    relations: &[RelationSpec],
) -> Result<Document, AssemblyError> {
    let params = [key.to_param()];

    for relation in relations {
        let value = match source.fetch_rows(&relation.query, &params).await {
            Ok(rows) => {
                debug!(id = %key, relation = relation.name, rows = rows.len(), "Fetched relation");
                relation.assemble(rows)
            }
            Err(err) if relation.required => {
                return Err(AssemblyError::Relation {
                    relation: relation.name,
                    source: err,
                });
            }
            Err(e) => {
                warn!(id = %key, relation = relation.name, "Optional relation failed, using empty value: {}", e);
                relation.empty_value()
            }
        };
        body.insert(relation.name.to_string(), value);
    }

    Ok(Document::new(key, body))
}
