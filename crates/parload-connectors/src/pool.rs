//! Bounded pool of source connections.
//!
//! Capacity is one connection per concurrent worker. A [`PooledConnection`]
//! is exclusively owned by its holder and goes back to the idle list when
//! released or dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parload_core::{LoadError, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::{Connector, SourceConnection};

pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    idle: Mutex<Vec<Box<dyn SourceConnection>>>,
    permits: Arc<Semaphore>,
    capacity: usize,
    opened: AtomicUsize,
}

impl ConnectionPool {
    /// Create a pool holding at most `capacity` connections (minimum 1).
    /// No connection is opened until the first [`acquire`](Self::acquire).
    pub fn new(connector: Arc<dyn Connector>, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            connector,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            opened: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Physical connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Connections currently waiting in the idle list.
    pub fn idle(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    /// Wait for a free slot, then reuse an idle connection or open a new one.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| LoadError::ConnectionError("connection pool is closed".to_string()))?;

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let conn = match reused {
            Some(conn) => conn,
            None => {
                let conn = self.connector.connect().await?;
                let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    "Opened {} connection {}/{}",
                    self.connector.name(),
                    n,
                    self.capacity
                );
                conn
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Return a connection to the pool. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    fn put_back(&self, conn: Box<dyn SourceConnection>) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }

    /// Stop handing out connections and close the idle ones.
    pub async fn close(&self) {
        self.permits.close();
        let idle: Vec<_> = match self.idle.lock() {
            Ok(mut idle) => idle.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for conn in idle {
            if let Err(e) = conn.close().await {
                warn!("Failed to close {} connection: {}", self.connector.name(), e);
            }
        }
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection {
    conn: Option<Box<dyn SourceConnection>>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Drop the connection instead of returning it, e.g. after a failed
    /// statement left it in an unknown state.
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl Deref for PooledConnection {
    type Target = dyn SourceConnection;

    fn deref(&self) -> &Self::Target {
        // Only `discard` and `drop` take the connection, and both consume self.
        self.conn.as_deref().expect("pooled connection already taken")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("pooled connection already taken")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}
