//! The query executor: parameterized statements, per-call transaction
//! discipline, result shaping, and the error-taxonomy mapping.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Row, Transaction};

use memento_core::{MementoError, Result};

use crate::client::GraphStore;
use crate::sql::is_read_only;

/// One row shaped as column name → JSON value, in cursor order.
pub type Record = serde_json::Map<String, Value>;

/// Bound statement parameters.
pub type SqlParams<'a> = &'a [&'a (dyn ToSql + Sync)];

/// What a statement produced.
///
/// `Rows` comes from statements with row metadata (SELECT, or any write
/// with RETURNING); `Done` carries the affected-row count of a pure write.
/// The two are distinct so callers can tell "write succeeded, nothing to
/// return" from "query matched zero rows".
#[derive(Debug)]
pub enum QueryOutcome {
    Rows(Vec<Record>),
    Done(u64),
}

impl QueryOutcome {
    /// Rows if any were produced; a pure write yields an empty list.
    pub fn into_rows(self) -> Vec<Record> {
        match self {
            Self::Rows(rows) => rows,
            Self::Done(_) => Vec::new(),
        }
    }

    /// First row, if the statement produced one.
    pub fn into_first(self) -> Option<Record> {
        match self {
            Self::Rows(rows) => rows.into_iter().next(),
            Self::Done(_) => None,
        }
    }
}

impl GraphStore {
    /// Execute one parameterized statement in its own transaction.
    ///
    /// Commits on success. On any failure the transaction is rolled back
    /// before the error surfaces, so a failed statement never leaves
    /// partially-applied state visible and previously committed data is
    /// untouched. After an error the store is ready for the next call: the
    /// session is clean, and a dead connection is rebuilt lazily by the
    /// liveness check.
    pub async fn execute(&mut self, sql: &str, params: SqlParams<'_>) -> Result<QueryOutcome> {
        if sql.trim().is_empty() {
            return Err(MementoError::Validation("Query cannot be empty".into()));
        }
        if self.config.read_only && !is_read_only(sql) {
            return Err(MementoError::ReadOnly(
                "Statement rejected: not classified as read-only".into(),
            ));
        }
        self.ensure_connected().await?;

        let timeout_ms = self.config.statement_timeout_ms;
        let txn = self.client.transaction().await.map_err(map_pg_error)?;
        match run_in_txn(&txn, sql, params, timeout_ms).await {
            Ok(outcome) => {
                txn.commit().await.map_err(map_pg_error)?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rb) = txn.rollback().await {
                    tracing::debug!(error = %rb, "rollback failed");
                }
                let mapped = map_pg_error(e);
                tracing::debug!(
                    statement = sql.split_whitespace().next().unwrap_or(""),
                    error = %mapped,
                    "statement rolled back"
                );
                Err(mapped)
            }
        }
    }

    /// Execute a write and return the affected-row count.
    pub async fn run(&mut self, sql: &str, params: SqlParams<'_>) -> Result<u64> {
        match self.execute(sql, params).await? {
            QueryOutcome::Done(n) => Ok(n),
            QueryOutcome::Rows(rows) => Ok(rows.len() as u64),
        }
    }

    /// Execute a query and collect all rows.
    pub async fn query_rows(&mut self, sql: &str, params: SqlParams<'_>) -> Result<Vec<Record>> {
        Ok(self.execute(sql, params).await?.into_rows())
    }

    /// Execute a query and return the first row, if any.
    pub async fn query_one(&mut self, sql: &str, params: SqlParams<'_>) -> Result<Option<Record>> {
        Ok(self.execute(sql, params).await?.into_first())
    }
}

async fn run_in_txn(
    txn: &Transaction<'_>,
    sql: &str,
    params: SqlParams<'_>,
    timeout_ms: Option<u64>,
) -> std::result::Result<QueryOutcome, tokio_postgres::Error> {
    if let Some(ms) = timeout_ms {
        // SET LOCAL scopes the deadline to this transaction only.
        txn.batch_execute(&format!("SET LOCAL statement_timeout = {ms}"))
            .await?;
    }

    let stmt = txn.prepare(sql).await?;
    if stmt.columns().is_empty() {
        let n = txn.execute(&stmt, params).await?;
        Ok(QueryOutcome::Done(n))
    } else {
        let rows = txn.query(&stmt, params).await?;
        Ok(QueryOutcome::Rows(rows.iter().map(row_to_record).collect()))
    }
}

/// Map a backend error onto the taxonomy.
///
/// Statement-level rejections (syntax, constraint, bad parameters) become
/// `Query` and are safe to retry with corrected input; connectivity
/// failures become `Connection` so the next call reconnects; a cancelled
/// statement becomes `Timeout`; everything else is surfaced opaquely.
pub(crate) fn map_pg_error(e: tokio_postgres::Error) -> MementoError {
    if let Some(code) = e.code() {
        if *code == SqlState::QUERY_CANCELED {
            return MementoError::Timeout(format!("query execution timed out: {e}"));
        }
        let class = &code.code()[..2.min(code.code().len())];
        return match class {
            "08" | "57" => MementoError::Connection(format!("Database connection error: {e}")),
            "22" | "23" | "42" => MementoError::Query(format!("Invalid query or parameters: {e}")),
            _ => MementoError::Unexpected(
                anyhow::Error::new(e).context("unexpected database error"),
            ),
        };
    }
    if e.is_closed() {
        MementoError::Connection(format!("Database connection error: {e}"))
    } else {
        MementoError::Unexpected(anyhow::Error::new(e).context("unexpected database error"))
    }
}

fn row_to_record(row: &Row) -> Record {
    let mut rec = Record::new();
    for (idx, col) in row.columns().iter().enumerate() {
        rec.insert(col.name().to_string(), cell_to_json(row, idx));
    }
    rec
}

/// Decode one cell into JSON by its declared column type. Timestamps are
/// rendered as RFC-3339 strings; an undecodable cell becomes null rather
/// than failing the whole row.
fn cell_to_json(row: &Row, idx: usize) -> Value {
    let ty = row.columns()[idx].type_();

    if *ty == Type::BOOL {
        json_or_null(row.try_get::<_, Option<bool>>(idx))
    } else if *ty == Type::INT2 {
        json_or_null(row.try_get::<_, Option<i16>>(idx))
    } else if *ty == Type::INT4 {
        json_or_null(row.try_get::<_, Option<i32>>(idx))
    } else if *ty == Type::INT8 {
        json_or_null(row.try_get::<_, Option<i64>>(idx))
    } else if *ty == Type::FLOAT4 {
        json_or_null(row.try_get::<_, Option<f32>>(idx))
    } else if *ty == Type::FLOAT8 {
        json_or_null(row.try_get::<_, Option<f64>>(idx))
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        json_or_null(row.try_get::<_, Option<String>>(idx))
    } else if *ty == Type::TIMESTAMPTZ {
        match row.try_get::<_, Option<DateTime<Utc>>>(idx) {
            Ok(Some(t)) => Value::String(t.to_rfc3339()),
            Ok(None) => Value::Null,
            Err(e) => decode_failed(e),
        }
    } else if *ty == Type::TIMESTAMP {
        match row.try_get::<_, Option<NaiveDateTime>>(idx) {
            Ok(Some(t)) => Value::String(t.and_utc().to_rfc3339()),
            Ok(None) => Value::Null,
            Err(e) => decode_failed(e),
        }
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        match row.try_get::<_, Option<Value>>(idx) {
            Ok(Some(v)) => v,
            Ok(None) => Value::Null,
            Err(e) => decode_failed(e),
        }
    } else {
        tracing::debug!(column_type = %ty, "unsupported column type, returning null");
        Value::Null
    }
}

fn json_or_null<T: Into<Value>>(
    cell: std::result::Result<Option<T>, tokio_postgres::Error>,
) -> Value {
    match cell {
        Ok(Some(v)) => v.into(),
        Ok(None) => Value::Null,
        Err(e) => decode_failed(e),
    }
}

fn decode_failed(e: tokio_postgres::Error) -> Value {
    tracing::debug!(error = %e, "failed to decode column, returning null");
    Value::Null
}
