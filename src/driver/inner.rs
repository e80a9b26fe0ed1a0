//! The inner-driver extension point: an async trait facade standing in for
//! whatever real database driver is wrapped underneath, covering the
//! query/exec/begin/commit/rollback/ping surface the routing layer needs.

use async_trait::async_trait;

use crate::error::DriverError;
use crate::rows::RowBuffer;
use crate::value::Value;

/// One physical connection to the wrapped database, exclusively owned by
/// the [`CacheConnection`](crate::driver::connection::CacheConnection) that
/// wraps it.
#[async_trait]
pub trait InnerConnection: Send + Sync {
    /// Run a `SELECT` and drain it fully. `args` are positional parameters
    /// in statement order.
    async fn query(&self, query: &str, args: &[Value]) -> Result<RowBuffer, DriverError>;

    /// Run an `INSERT`/`UPDATE`/`DELETE`/DDL statement; returns rows
    /// affected.
    async fn exec(&self, query: &str, args: &[Value]) -> Result<u64, DriverError>;

    async fn begin(&self) -> Result<(), DriverError>;
    async fn commit(&self) -> Result<(), DriverError>;
    async fn rollback(&self) -> Result<(), DriverError>;
    async fn ping(&self) -> Result<(), DriverError>;
}
