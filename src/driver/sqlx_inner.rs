//! Concrete [`InnerConnection`] over `sqlx`'s MySQL driver: a pooled
//! connection that dispatches through whichever open transaction (if any)
//! currently owns it.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::{Arguments, Column, MySql, MySqlPool, Row, Transaction, TypeInfo};
use tokio::sync::Mutex;

use crate::driver::inner::InnerConnection;
use crate::error::DriverError;
use crate::rows::RowBuffer;
use crate::value::Value;

/// One physical MySQL connection, checked out of a pool, with room for at
/// most one open transaction at a time.
pub struct SqlxMySqlConnection {
    pool: MySqlPool,
    tx: Mutex<Option<Transaction<'static, MySql>>>,
}

impl SqlxMySqlConnection {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    fn bind_args(args: &[Value]) -> MySqlArguments {
        let mut bound = MySqlArguments::default();
        for arg in args {
            let _ = match arg {
                Value::Int64(v) => bound.add(v),
                Value::UInt64(v) => bound.add(v),
                Value::Float64(v) => bound.add(v),
                Value::Text(v) => bound.add(v),
                Value::Bytes(v) => bound.add(v.as_slice()),
                Value::Bool(v) => bound.add(v),
                Value::Time(v) => bound.add(v),
                Value::Null => bound.add(Option::<i64>::None),
            };
        }
        bound
    }
}

#[async_trait]
impl InnerConnection for SqlxMySqlConnection {
    async fn query(&self, query: &str, args: &[Value]) -> Result<RowBuffer, DriverError> {
        let bound = Self::bind_args(args);
        let statement = sqlx::query_with(query, bound);

        let mut guard = self.tx.lock().await;
        let rows: Vec<MySqlRow> = match guard.as_mut() {
            Some(tx) => statement.fetch_all(&mut **tx).await?,
            None => statement.fetch_all(&self.pool).await?,
        };
        drop(guard);

        Ok(decode_rows(rows))
    }

    async fn exec(&self, query: &str, args: &[Value]) -> Result<u64, DriverError> {
        let bound = Self::bind_args(args);
        let statement = sqlx::query_with(query, bound);

        let mut guard = self.tx.lock().await;
        let result = match guard.as_mut() {
            Some(tx) => statement.execute(&mut **tx).await?,
            None => statement.execute(&self.pool).await?,
        };
        drop(guard);

        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<(), DriverError> {
        let tx = self.pool.begin().await?;
        *self.tx.lock().await = Some(tx);
        Ok(())
    }

    async fn commit(&self) -> Result<(), DriverError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        if let Some(tx) = self.tx.lock().await.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Decode a raw result set into the closed [`Value`] scalar set, falling
/// back to marking the whole buffer uncacheable rather than ever panicking
/// on an unrecognized column type.
fn decode_rows(rows: Vec<MySqlRow>) -> RowBuffer {
    let columns: Vec<String> = rows
        .first()
        .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let mut decoded = Vec::with_capacity(rows.len());
    let mut uncacheable = false;

    for row in &rows {
        let mut values = Vec::with_capacity(columns.len());
        for (i, column) in row.columns().iter().enumerate() {
            values.push(decode_cell(row, i, column.type_info().name(), &mut uncacheable));
        }
        decoded.push(values);
    }

    let mut buffer = RowBuffer::new(columns, decoded);
    if uncacheable {
        buffer.mark_uncacheable();
    }
    buffer
}

fn decode_cell(row: &MySqlRow, index: usize, type_name: &str, uncacheable: &mut bool) -> Value {
    use sqlx::ValueRef;

    let raw = match row.try_get_raw(index) {
        Ok(raw) => raw,
        Err(_) => {
            *uncacheable = true;
            return Value::Null;
        }
    };
    if raw.is_null() {
        return Value::Null;
    }

    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => row
            .try_get::<i64, _>(index)
            .map(Value::Int64)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<u64, _>(index)
            .map(Value::UInt64)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "FLOAT" | "DOUBLE" | "DECIMAL" => row
            .try_get::<f64, _>(index)
            .map(Value::Float64)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "BOOLEAN" | "BOOL" => row
            .try_get::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => row
            .try_get::<String, _>(index)
            .map(Value::Text)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "VARBINARY" | "BINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(Value::Time)
            .unwrap_or_else(|_| fallback(uncacheable)),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Value::Time)
            .unwrap_or_else(|| fallback(uncacheable)),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .ok()
            .map(|t| Value::Time(chrono::NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                t,
            )))
            .unwrap_or_else(|| fallback(uncacheable)),
        _ => fallback(uncacheable),
    }
}

fn fallback(uncacheable: &mut bool) -> Value {
    *uncacheable = true;
    Value::Null
}
