//! The seam between the queryset and the database driver.
//!
//! Everything above this trait works with escaped SQL text and [`ResultSet`]
//! values; everything below it is driver-specific (see the `mysql` module
//! for the real backend and `test_utils` for the in-memory one).

use async_trait::async_trait;

use crate::error::QuerysetError;
use crate::results::ResultSet;

/// Driver-reported outcome of a DML statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecResult {
    /// Affected-row count as the driver reports it, including MySQL's
    /// doubled count for an upsert that updated.
    pub affected_rows: u64,
    /// Generated key, when the statement produced one.
    pub last_insert_id: Option<u64>,
}

/// A live database session.
///
/// A connection is exclusively owned by whoever checked it out; nothing here
/// is `Sync` and none of it needs to be.
#[async_trait]
pub trait DriverConnection: Send {
    /// Liveness probe, issued before a pooled connection is reused.
    async fn ping(&mut self) -> Result<(), QuerysetError>;

    /// Run a DML statement (INSERT, UPDATE, DELETE, session setup).
    async fn execute(&mut self, sql: &str) -> Result<ExecResult, QuerysetError>;

    /// Run a SELECT and collect the full result set.
    async fn query(&mut self, sql: &str) -> Result<ResultSet, QuerysetError>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<(), QuerysetError>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<(), QuerysetError>;

    /// Tear the session down. Used when a broken connection is discarded.
    async fn close(self: Box<Self>) -> Result<(), QuerysetError>;
}

/// Opens connections from one immutable configuration.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Connection` when authentication, the network,
    /// or TLS setup fails.
    async fn connect(&self) -> Result<Box<dyn DriverConnection>, QuerysetError>;
}
