//! Connection ownership: a fixed-size blocking pool, or a single exclusive
//! connection, behind one `ConnectionSource` enum.
//!
//! Checkout semantics in both modes: ping the candidate connection first; on
//! probe failure close it and build a replacement inline from the same
//! factory, blocking the acquiring caller. Returning a connection is the
//! drop of its lease, so it happens on every path out of an operation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, MutexGuard, Semaphore};
use tracing::{debug, warn};

use crate::driver::{ConnectionFactory, DriverConnection};
use crate::error::QuerysetError;

/// Bounded blocking pool of pre-opened connections.
///
/// Fixed capacity; the idle queue only changes size transiently between a
/// checkout and the lease drop. There is no checkout timeout: a caller that
/// never returns a connection starves the pool, and that is the intended
/// backpressure bound.
pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    capacity: usize,
    permits: Semaphore,
    idle: StdMutex<VecDeque<Box<dyn DriverConnection>>>,
}

impl ConnectionPool {
    /// Open `capacity` connections up front and build the pool around them.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Configuration` for a zero capacity and
    /// propagates the first failed connect.
    pub async fn new(
        factory: Arc<dyn ConnectionFactory>,
        capacity: usize,
    ) -> Result<Arc<Self>, QuerysetError> {
        if capacity == 0 {
            return Err(QuerysetError::Configuration(
                "connection pool capacity must be at least 1".to_string(),
            ));
        }
        let mut idle = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            idle.push_back(factory.connect().await?);
        }
        debug!(capacity, "connection pool ready");
        Ok(Arc::new(ConnectionPool {
            factory,
            capacity,
            permits: Semaphore::new(capacity),
            idle: StdMutex::new(idle),
        }))
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of connections currently sitting in the pool.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check a connection out, waiting until one is free.
    ///
    /// # Errors
    ///
    /// Propagates a failed replacement connect; the probed-and-broken
    /// connection itself never surfaces as an error.
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolLease, QuerysetError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| QuerysetError::Connection("connection pool closed".to_string()))?;
        permit.forget();
        let conn = self
            .idle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .expect("pool permit held without an idle connection");
        let conn = revive(&*self.factory, conn).await?;
        Ok(PoolLease {
            conn: Some(conn),
            pool: Arc::clone(self),
        })
    }

    fn restore(&self, conn: Box<dyn DriverConnection>) {
        self.idle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(conn);
        self.permits.add_permits(1);
    }
}

/// Probe a candidate connection; replace it from the factory when the probe
/// fails. The replacement is built inline, before the caller proceeds.
async fn revive(
    factory: &dyn ConnectionFactory,
    mut conn: Box<dyn DriverConnection>,
) -> Result<Box<dyn DriverConnection>, QuerysetError> {
    match conn.ping().await {
        Ok(()) => Ok(conn),
        Err(err) => {
            warn!(error = %err, "liveness probe failed, replacing connection");
            if let Err(close_err) = conn.close().await {
                debug!(error = %close_err, "discarding broken connection");
            }
            factory.connect().await
        }
    }
}

/// A checked-out pool connection. Dropping the lease returns the connection,
/// so it cannot leak out of an operation on any path.
pub struct PoolLease {
    conn: Option<Box<dyn DriverConnection>>,
    pool: Arc<ConnectionPool>,
}

impl PoolLease {
    fn conn(&mut self) -> &mut dyn DriverConnection {
        self.conn
            .as_mut()
            .expect("pool lease used after release")
            .as_mut()
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.restore(conn);
        }
    }
}

/// Who owns the connection a queryset runs on: exactly one of a single
/// exclusive connection or a shared pool, never nullable dual fields.
pub enum ConnectionSource {
    Unpooled {
        factory: Arc<dyn ConnectionFactory>,
        conn: Mutex<Option<Box<dyn DriverConnection>>>,
    },
    Pooled(Arc<ConnectionPool>),
}

impl ConnectionSource {
    /// Single-connection mode. The connection is opened on first use and
    /// gets the same ping-and-replace treatment as pooled ones.
    #[must_use]
    pub fn unpooled(factory: Arc<dyn ConnectionFactory>) -> Self {
        ConnectionSource::Unpooled {
            factory,
            conn: Mutex::new(None),
        }
    }

    /// Pooled mode over `capacity` pre-opened connections.
    ///
    /// # Errors
    ///
    /// Propagates pool construction failures.
    pub async fn pooled(
        factory: Arc<dyn ConnectionFactory>,
        capacity: usize,
    ) -> Result<Self, QuerysetError> {
        Ok(ConnectionSource::Pooled(
            ConnectionPool::new(factory, capacity).await?,
        ))
    }

    /// Reuse an already-built pool (shared across querysets).
    #[must_use]
    pub fn from_pool(pool: Arc<ConnectionPool>) -> Self {
        ConnectionSource::Pooled(pool)
    }

    /// Check out a connection, blocking until one is available in pooled
    /// mode or until the single connection is unlocked in unpooled mode.
    ///
    /// # Errors
    ///
    /// Propagates connect/replacement failures.
    pub async fn acquire(&self) -> Result<ConnectionLease<'_>, QuerysetError> {
        match self {
            ConnectionSource::Pooled(pool) => Ok(ConnectionLease::Pooled(pool.acquire().await?)),
            ConnectionSource::Unpooled { factory, conn } => {
                let mut guard = conn.lock().await;
                let candidate = match guard.take() {
                    Some(existing) => revive(&**factory, existing).await?,
                    None => {
                        debug!("opening unpooled connection");
                        factory.connect().await?
                    }
                };
                *guard = Some(candidate);
                Ok(ConnectionLease::Unpooled(guard))
            }
        }
    }
}

/// A checked-out connection in either mode. Release is the drop.
pub enum ConnectionLease<'a> {
    Pooled(PoolLease),
    Unpooled(MutexGuard<'a, Option<Box<dyn DriverConnection>>>),
}

impl ConnectionLease<'_> {
    pub fn conn(&mut self) -> &mut dyn DriverConnection {
        match self {
            ConnectionLease::Pooled(lease) => lease.conn(),
            ConnectionLease::Unpooled(guard) => guard
                .as_mut()
                .expect("unpooled lease without a connection")
                .as_mut(),
        }
    }
}
