use crate::metrics;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row, TypeInfo};
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("sql_query must be provided")]
    EmptyQuery,
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("result serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Runs an ad-hoc analytical query against the logistics store and renders
/// the result set as a JSON array of row objects.
///
/// The statement is passed through verbatim; the connecting role is
/// read-only, which is the only write protection this path has.
pub async fn run_query(pool: &PgPool, sql_query: &str) -> Result<String, AnalyticsError> {
    let sql_query = sql_query.trim();
    if sql_query.is_empty() {
        return Err(AnalyticsError::EmptyQuery);
    }

    let started = Instant::now();
    let rows = sqlx::query(sql_query).fetch_all(pool).await?;
    metrics::lookup_elapsed("analytics_query", started.elapsed().as_millis());
    info!(
        target = "retrace.analytics",
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "query_executed"
    );

    let payload: Vec<Value> = rows.iter().map(row_to_json).collect();
    Ok(serde_json::to_string(&payload)?)
}

fn row_to_json(row: &PgRow) -> Value {
    let mut object = serde_json::Map::new();
    for column in row.columns() {
        object.insert(
            column.name().to_string(),
            decode_column(row, column.ordinal(), column.type_info().name()),
        );
    }
    Value::Object(object)
}

/// Maps one column to JSON by its Postgres type name. Anything the mapping
/// does not know falls back to a string decode, then to null.
fn decode_column(row: &PgRow, ordinal: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => opt_json(row.try_get::<Option<bool>, _>(ordinal)),
        "INT2" => opt_json(row.try_get::<Option<i16>, _>(ordinal)),
        "INT4" => opt_json(row.try_get::<Option<i32>, _>(ordinal)),
        "INT8" => opt_json(row.try_get::<Option<i64>, _>(ordinal)),
        "FLOAT4" => opt_json(row.try_get::<Option<f32>, _>(ordinal)),
        "FLOAT8" => opt_json(row.try_get::<Option<f64>, _>(ordinal)),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(ordinal)
            .ok()
            .flatten()
            .map(|decimal| Value::String(decimal.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(ordinal)
            .ok()
            .flatten()
            .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(ordinal)
            .ok()
            .flatten()
            .map(|ts| Value::String(ts.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(ordinal)
            .ok()
            .flatten()
            .map(|date| Value::String(date.to_string()))
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(ordinal)
            .ok()
            .flatten()
            .map(|id| Value::String(id.to_string()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(ordinal)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        // Raw bytes read as text so identifiers stored as bytea stay usable
        // in the response.
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(ordinal)
            .ok()
            .flatten()
            .map(|bytes| Value::String(bytea_to_string(&bytes)))
            .unwrap_or(Value::Null),
        _ => opt_json(row.try_get::<Option<String>, _>(ordinal)),
    }
}

fn opt_json<T: Into<Value>>(value: Result<Option<T>, sqlx::Error>) -> Value {
    value
        .ok()
        .flatten()
        .map(Into::into)
        .unwrap_or(Value::Null)
}

fn bytea_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
