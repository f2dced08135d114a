//! Read-only query capability over the legacy store

use async_trait::async_trait;
use tokio_postgres::types::{ToSql, Type};
use tracing::debug;

use super::pool::{DbPool, SourceError};
use super::row::{decode_row, Row};

/// A static, parameterised query
///
/// The SQL is fixed at compile time; values only ever travel as bound
/// parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    /// Short name used in logs and failure reasons
    pub label: &'static str,
    pub sql: &'static str,
}

impl Query {
    pub const fn new(label: &'static str, sql: &'static str) -> Self {
        Query { label, sql }
    }
}

/// A bound query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for SqlParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlParam::Int(v) => write!(f, "{}", v),
            SqlParam::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Ordered row access to the legacy store
///
/// Rows come back in the order dictated by the query's `ORDER BY`.
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_rows(&self, query: &Query, params: &[SqlParam]) -> Result<Vec<Row>, SourceError>;
}

/// PostgreSQL-backed record source
///
/// Concurrent fetches are bounded by the pool size.
#[derive(Clone)]
pub struct PgRecordSource {
    pool: DbPool,
}

impl PgRecordSource {
    pub fn new(pool: DbPool) -> Self {
        PgRecordSource { pool }
    }
}

#[async_trait]
impl RecordSource for PgRecordSource {
    async fn fetch_rows(&self, query: &Query, params: &[SqlParam]) -> Result<Vec<Row>, SourceError> {
        let client = self.pool.get().await?;
        let statement = client.prepare_cached(query.sql).await?;

        let bound = params
            .iter()
            .zip(statement.params())
            .enumerate()
            .map(|(index, (param, ty))| bind(index, param, ty))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = client.query(&statement, &refs).await?;
        debug!(query = query.label, params = ?params, rows = rows.len(), "Fetched rows");

        rows.iter().map(decode_row).collect()
    }
}

/// Narrow a parameter to the type the prepared statement declares
fn bind(index: usize, param: &SqlParam, ty: &Type) -> Result<Box<dyn ToSql + Sync + Send>, SourceError> {
    let bind_err = |message: String| SourceError::Bind {
        index: index + 1,
        pg_type: ty.name().to_string(),
        message,
    };

    let bound: Box<dyn ToSql + Sync + Send> = match param {
        SqlParam::Int(v) if *ty == Type::INT2 => {
            Box::new(i16::try_from(*v).map_err(|e| bind_err(e.to_string()))?)
        }
        SqlParam::Int(v) if *ty == Type::INT4 => {
            Box::new(i32::try_from(*v).map_err(|e| bind_err(e.to_string()))?)
        }
        SqlParam::Int(v) if *ty == Type::INT8 => Box::new(*v),
        SqlParam::Int(v) => Box::new(v.to_string()),
        SqlParam::Text(v) if [Type::INT2, Type::INT4, Type::INT8].contains(ty) => {
            return Err(bind_err(format!("non-numeric key `{}`", v)));
        }
        SqlParam::Text(v) => Box::new(v.clone()),
    };
    Ok(bound)
}
