//! Conversion of driver rows into flat, column-ordered JSON mappings

use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use tokio_postgres::types::Type;
use uuid::Uuid;

use super::pool::SourceError;

/// One fetched row: column name to scalar (or null), in select-list order
pub type Row = Map<String, Value>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Convert a driver row into a [`Row`] without coercing beyond native types
pub fn decode_row(row: &tokio_postgres::Row) -> Result<Row, SourceError> {
    let mut out = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx, column.type_()).map_err(|e| SourceError::Decode {
            column: column.name().to_string(),
            pg_type: column.type_().name().to_string(),
            message: e.to_string(),
        })?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    ty: &Type,
) -> Result<Value, Box<dyn Error + Send + Sync>> {
    let value = if *ty == Type::BOOL {
        opt(row.try_get::<_, Option<bool>>(idx)?, Value::Bool)
    } else if *ty == Type::INT2 {
        opt(row.try_get::<_, Option<i16>>(idx)?, Value::from)
    } else if *ty == Type::INT4 {
        opt(row.try_get::<_, Option<i32>>(idx)?, Value::from)
    } else if *ty == Type::INT8 {
        opt(row.try_get::<_, Option<i64>>(idx)?, Value::from)
    } else if *ty == Type::OID {
        opt(row.try_get::<_, Option<u32>>(idx)?, Value::from)
    } else if *ty == Type::FLOAT4 {
        opt(row.try_get::<_, Option<f32>>(idx)?, |v| float(v as f64))
    } else if *ty == Type::FLOAT8 {
        opt(row.try_get::<_, Option<f64>>(idx)?, float)
    } else if *ty == Type::NUMERIC {
        opt(row.try_get::<_, Option<Decimal>>(idx)?, numeric)
    } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME, Type::UNKNOWN].contains(ty) {
        opt(row.try_get::<_, Option<String>>(idx)?, Value::String)
    } else if *ty == Type::TIMESTAMP {
        opt(row.try_get::<_, Option<NaiveDateTime>>(idx)?, |v| {
            Value::String(v.format(TIMESTAMP_FORMAT).to_string())
        })
    } else if *ty == Type::TIMESTAMPTZ {
        opt(row.try_get::<_, Option<DateTime<Utc>>>(idx)?, |v| {
            Value::String(v.format(TIMESTAMP_FORMAT).to_string())
        })
    } else if *ty == Type::DATE {
        opt(row.try_get::<_, Option<NaiveDate>>(idx)?, |v| {
            Value::String(v.format(DATE_FORMAT).to_string())
        })
    } else if *ty == Type::UUID {
        opt(row.try_get::<_, Option<Uuid>>(idx)?, |v| Value::String(v.to_string()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx)?.unwrap_or(Value::Null)
    } else {
        return Err("unsupported column type".into());
    };
    Ok(value)
}

fn opt<T>(v: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    v.map(f).unwrap_or(Value::Null)
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

/// Decimals are kept as strings so prices never pass through a float.
/// The column's scale is preserved (`0.00` stays `0.00`).
fn numeric(v: Decimal) -> Value {
    Value::String(v.to_string())
}
