//! Single-connection store that writes batches into PostgreSQL tables.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Connection, Postgres};
use tracing::debug;

use super::schema::{
    DATE_FORMATS, Schema, SqlType, TIMESTAMP_FORMATS, create_table_ddl, drop_table_sql,
    quote_ident,
};
use crate::config::{CONNECT_TIMEOUT, ConnectionArgs, MAX_BIND_PARAMS, QUERY_TIMEOUT};
use crate::error::LoadError;
use crate::formats::{Batch, Record};
use crate::load::{TableWriter, WriteMode};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Type category for SQL type conversion strategy
#[derive(Debug, Clone, Copy, PartialEq)]
enum TypeCategory {
    /// Parsed to native Rust types (bool, i16, i32, i64, f32, f64)
    NativeNumeric,
    /// Parsed with chrono (TIMESTAMP, DATE)
    NativeParsed,
    /// Bound as text with a CAST in PostgreSQL (NUMERIC, TIMESTAMP WITH TIME ZONE, BYTEA)
    StringCast,
    /// Bound as text directly
    DirectString,
}

impl TypeCategory {
    fn from_sql_type(sql_type: &SqlType) -> Self {
        match sql_type {
            SqlType::Boolean
            | SqlType::SmallInt
            | SqlType::Integer
            | SqlType::BigInt
            | SqlType::Real
            | SqlType::DoublePrecision => TypeCategory::NativeNumeric,
            SqlType::Timestamp | SqlType::Date => TypeCategory::NativeParsed,
            // NUMERIC goes through text so precision is not lost to f64
            SqlType::Numeric | SqlType::TimestampTz | SqlType::Bytea => TypeCategory::StringCast,
            SqlType::Text => TypeCategory::DirectString,
        }
    }
}

enum Conn {
    Postgres(PgConnection),
    #[cfg(test)]
    Sqlite(sqlx::SqliteConnection),
}

/// Handle on the target database, owned by one load run
pub struct Store {
    conn: Conn,
    insert_batch_rows: usize,
}

impl Store {
    /// Open a single connection to PostgreSQL
    pub async fn connect(args: &ConnectionArgs, insert_batch_rows: usize) -> Result<Self, LoadError> {
        let target = args.redacted().to_string();
        debug!(%target, "connecting");

        let conn = connect_within(CONNECT_TIMEOUT, args.connect_options().connect())
            .await
            .map_err(|source| LoadError::Connection { target, source })?;

        Ok(Self {
            conn: Conn::Postgres(conn),
            insert_batch_rows: insert_batch_rows.max(1),
        })
    }

    /// Create an in-memory SQLite store for testing
    #[cfg(test)]
    pub async fn sqlite_in_memory(insert_batch_rows: usize) -> Result<Self, sqlx::Error> {
        let conn = sqlx::SqliteConnection::connect("sqlite::memory:").await?;
        Ok(Self {
            conn: Conn::Sqlite(conn),
            insert_batch_rows: insert_batch_rows.max(1),
        })
    }

    /// Close the connection, flushing the termination message to the server
    pub async fn close(self) -> Result<(), sqlx::Error> {
        match self.conn {
            Conn::Postgres(conn) => conn.close().await,
            #[cfg(test)]
            Conn::Sqlite(conn) => conn.close().await,
        }
    }

    /// Rows per INSERT statement for a table with `num_columns` columns
    fn rows_per_insert(&self, num_columns: usize) -> usize {
        let by_params = MAX_BIND_PARAMS / num_columns.max(1);
        self.insert_batch_rows.min(by_params).max(1)
    }

    async fn write_postgres(
        conn: &mut PgConnection,
        table: &str,
        batch: &Batch,
        mode: WriteMode,
        rows_per_insert: usize,
    ) -> Result<u64> {
        let mut tx = conn.begin().await.context("Failed to begin transaction")?;

        if mode == WriteMode::Replace {
            for sql in [drop_table_sql(table), create_table_ddl(table, &batch.schema)] {
                with_timeout(sqlx::query(&sql).execute(&mut *tx))
                    .await
                    .with_context(|| format!("Failed to execute: {sql}"))?;
            }
        }

        let mut written = 0u64;
        for rows in batch.records.chunks(rows_per_insert) {
            let sql = insert_sql(table, &batch.schema, rows.len(), true);
            let mut query = sqlx::query(&sql);
            for record in rows {
                query = bind_record_fields(query, record, &batch.schema)?;
            }
            let result = with_timeout(query.execute(&mut *tx))
                .await
                .context("Failed to execute batch insert")?;
            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(written)
    }

    /// SQLite path: every value bound as a string
    #[cfg(test)]
    async fn write_sqlite(
        conn: &mut sqlx::SqliteConnection,
        table: &str,
        batch: &Batch,
        mode: WriteMode,
        rows_per_insert: usize,
    ) -> Result<u64> {
        let mut tx = conn.begin().await.context("Failed to begin transaction")?;

        if mode == WriteMode::Replace {
            for sql in [drop_table_sql(table), create_table_ddl(table, &batch.schema)] {
                with_timeout(sqlx::query(&sql).execute(&mut *tx))
                    .await
                    .with_context(|| format!("Failed to execute: {sql}"))?;
            }
        }

        let mut written = 0u64;
        for rows in batch.records.chunks(rows_per_insert) {
            let sql = convert_to_sqlite_placeholders(&insert_sql(
                table,
                &batch.schema,
                rows.len(),
                false,
            ));
            let mut query = sqlx::query(&sql);
            for record in rows {
                for field in &record.fields {
                    query = query.bind(if field.is_empty() {
                        None
                    } else {
                        Some(field.as_str())
                    });
                }
            }
            let result = with_timeout(query.execute(&mut *tx))
                .await
                .context("Failed to execute batch insert")?;
            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(written)
    }

    /// Run a query and return every row as optional strings.
    ///
    /// Non-text columns must be CAST to TEXT in the query.
    #[cfg(test)]
    pub async fn fetch_strings(&mut self, sql: &str) -> Result<Vec<Vec<Option<String>>>> {
        use sqlx::Row;

        let Conn::Sqlite(conn) = &mut self.conn else {
            anyhow::bail!("fetch_strings is only available on SQLite stores");
        };
        let rows = sqlx::query(sql).fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| row.try_get::<Option<String>, _>(i).map_err(Into::into))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    #[cfg(test)]
    pub async fn count_rows(&mut self, table: &str) -> Result<i64> {
        let Conn::Sqlite(conn) = &mut self.conn else {
            anyhow::bail!("count_rows is only available on SQLite stores");
        };
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&mut *conn).await?;
        Ok(count)
    }
}

#[async_trait]
impl TableWriter for Store {
    async fn write_batch(
        &mut self,
        table: &str,
        batch: &Batch,
        mode: WriteMode,
    ) -> Result<u64, LoadError> {
        let rows_per_insert = self.rows_per_insert(batch.schema.columns.len());
        debug!(
            table,
            rows = batch.num_rows(),
            ?mode,
            rows_per_insert,
            "writing batch"
        );

        let result = match &mut self.conn {
            Conn::Postgres(conn) => {
                Self::write_postgres(conn, table, batch, mode, rows_per_insert).await
            }
            #[cfg(test)]
            Conn::Sqlite(conn) => {
                Self::write_sqlite(conn, table, batch, mode, rows_per_insert).await
            }
        };

        result.map_err(|e| LoadError::write(table, e))
    }
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(anyhow!(
            "Query execution timed out after {} seconds",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Await a connection attempt, turning an elapsed `limit` into a `TimedOut` I/O error
async fn connect_within<T>(
    limit: Duration,
    connect: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, sqlx::Error> {
    match tokio::time::timeout(limit, connect).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no connection within {} seconds", limit.as_secs()),
        ))),
    }
}

/// Build `INSERT INTO "t" ("a", "b") VALUES ($1, $2), ($3, $4), ...`
fn insert_sql(table: &str, schema: &Schema, num_rows: usize, use_pg_cast: bool) -> String {
    let column_list: Vec<String> = schema.columns.iter().map(|c| quote_ident(&c.name)).collect();

    let mut value_groups = Vec::with_capacity(num_rows);
    let mut param_idx = 1;
    for _ in 0..num_rows {
        let placeholders: Vec<String> = schema
            .columns
            .iter()
            .map(|col| {
                let placeholder = format!("${}", param_idx);
                param_idx += 1;
                if use_pg_cast
                    && TypeCategory::from_sql_type(&col.sql_type) == TypeCategory::StringCast
                {
                    format!("CAST({} AS {})", placeholder, col.sql_type.to_postgres())
                } else {
                    placeholder
                }
            })
            .collect();
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        column_list.join(", "),
        value_groups.join(", ")
    )
}

/// Convert Postgres-style placeholders ($1, $2, ...) to SQLite-style (?, ?, ...)
#[cfg(test)]
fn convert_to_sqlite_placeholders(sql: &str) -> String {
    let mut result = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                chars.next();
            }
            result.push('?');
        } else {
            result.push(ch);
        }
    }

    result
}

/// Bind record fields to query with proper types based on schema
fn bind_record_fields<'q>(
    mut query: PgQuery<'q>,
    record: &'q Record,
    schema: &Schema,
) -> Result<PgQuery<'q>> {
    if record.fields.len() != schema.columns.len() {
        anyhow::bail!(
            "Record has {} fields, table has {} columns",
            record.fields.len(),
            schema.columns.len()
        );
    }

    for (field, col) in record.fields.iter().zip(&schema.columns) {
        query = bind_typed_value(query, field, &col.sql_type)
            .with_context(|| format!("Column '{}'", col.name))?;
    }

    Ok(query)
}

/// Bind a single value with proper type conversion
fn bind_typed_value<'q>(query: PgQuery<'q>, value: &'q str, sql_type: &SqlType) -> Result<PgQuery<'q>> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Ok(bind_null(query, sql_type));
    }

    let type_name = sql_type.to_postgres();
    Ok(match sql_type {
        SqlType::Boolean => query.bind(parse_bool(trimmed, type_name)?),
        SqlType::SmallInt => query.bind(parse::<i16>(trimmed, type_name)?),
        SqlType::Integer => query.bind(parse::<i32>(trimmed, type_name)?),
        SqlType::BigInt => query.bind(parse::<i64>(trimmed, type_name)?),
        SqlType::Real => query.bind(parse::<f32>(trimmed, type_name)?),
        SqlType::DoublePrecision => query.bind(parse::<f64>(trimmed, type_name)?),
        SqlType::Timestamp => query.bind(parse_timestamp(trimmed)?),
        SqlType::Date => query.bind(parse_date(trimmed)?),
        SqlType::Numeric | SqlType::TimestampTz | SqlType::Bytea | SqlType::Text => {
            query.bind(value)
        }
    })
}

/// Bind NULL value for the appropriate type
fn bind_null<'q>(query: PgQuery<'q>, sql_type: &SqlType) -> PgQuery<'q> {
    match sql_type {
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::SmallInt => query.bind(None::<i16>),
        SqlType::Integer => query.bind(None::<i32>),
        SqlType::BigInt => query.bind(None::<i64>),
        SqlType::Real => query.bind(None::<f32>),
        SqlType::DoublePrecision => query.bind(None::<f64>),
        SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
        SqlType::Date => query.bind(None::<chrono::NaiveDate>),
        // the SQL CAST types the NULL
        _ => query.bind(None::<String>),
    }
}

fn parse<T: std::str::FromStr>(value: &str, type_name: &str) -> Result<T>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        anyhow!(
            "Type mismatch: Cannot convert value to {}.\n\
             - Expected: Valid {} value\n\
             - Got: '{}'\n\
             - Error: {}",
            type_name,
            type_name,
            value,
            e
        )
    })
}

fn parse_bool(value: &str, type_name: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(anyhow!(
            "Type mismatch: Cannot convert value to {}.\n- Got: '{}'",
            type_name,
            value
        )),
    }
}

fn parse_timestamp(value: &str) -> Result<chrono::NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| chrono::NaiveDateTime::parse_from_str(value, f).ok())
        .with_context(|| {
            format!(
                "Type mismatch: Cannot convert value to TIMESTAMP.\n\
                 - Expected: TIMESTAMP format (e.g., '2024-01-15 14:30:00' or '2024-01-15T14:30:00')\n\
                 - Got: '{}'",
                value
            )
        })
}

/// Parse a date in the first layout that fits, so day-first dates never reach
/// the server's DateStyle
fn parse_date(value: &str) -> Result<chrono::NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| chrono::NaiveDate::parse_from_str(value, f).ok())
        .with_context(|| {
            format!(
                "Type mismatch: Cannot convert value to DATE.\n\
                 - Expected: DATE format (e.g., '2024-01-15' or '15-01-2024')\n\
                 - Got: '{}'",
                value
            )
        })
}
