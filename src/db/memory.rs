//! In-memory record source for tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::pool::SourceError;
use super::row::Row;
use super::source::{Query, RecordSource, SqlParam};

type Key = (&'static str, Option<SqlParam>);

/// Canned rows keyed by query label and (optional) first parameter
///
/// Unknown queries return no rows.
#[derive(Default)]
pub struct MemorySource {
    results: HashMap<Key, Result<Vec<Row>, String>>,
    latency: HashMap<&'static str, Duration>,
    slow_fetch_started: Arc<Notify>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, query: Query, key: Option<i64>, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                other => panic!("test row must be an object, got {}", other),
            })
            .collect();
        self.results.insert((query.label, key.map(SqlParam::Int)), Ok(rows));
        self
    }

    /// Delay every fetch of `query`
    pub fn with_latency(mut self, query: Query, delay: Duration) -> Self {
        self.latency.insert(query.label, delay);
        self
    }

    /// Signalled each time a delayed fetch begins
    pub fn slow_fetch_started(&self) -> Arc<Notify> {
        self.slow_fetch_started.clone()
    }

    pub fn with_failure(mut self, query: Query, key: Option<i64>, message: &str) -> Self {
        self.results
            .insert((query.label, key.map(SqlParam::Int)), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch_rows(&self, query: &Query, params: &[SqlParam]) -> Result<Vec<Row>, SourceError> {
        // yield so concurrent assembly actually interleaves
        tokio::task::yield_now().await;
        if let Some(delay) = self.latency.get(query.label) {
            self.slow_fetch_started.notify_one();
            tokio::time::sleep(*delay).await;
        }
        match self.results.get(&(query.label, params.first().cloned())) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(message)) => Err(SourceError::Config(format!("injected failure: {}", message))),
            None => Ok(Vec::new()),
        }
    }
}
