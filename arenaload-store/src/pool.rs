//! Bounded connection pool.
//!
//! [`Pool`] owns a fixed set of connections and hands them out one at a time. Checkout is guarded
//! by a tokio semaphore with one permit per connection, so a [`Pooled`] guard always finds an idle
//! connection. Waiting for a permit is capped by the acquire timeout, after which the caller gets
//! [`StoreError::PoolExhausted`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{StoreError, StoreResult};

/// A fixed-size pool of connections of type `C`.
pub struct Pool<C> {
    idle: Arc<Mutex<Vec<C>>>,
    semaphore: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

impl<C> Pool<C> {
    /// Creates a pool owning all of the given connections.
    pub fn new(connections: Vec<C>, acquire_timeout: Duration) -> Self {
        let size = connections.len();
        Self {
            idle: Arc::new(Mutex::new(connections)),
            semaphore: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
        }
    }

    /// The total number of connections owned by the pool.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.size - self.semaphore.available_permits()
    }

    /// Checks out a connection, waiting at most the acquire timeout.
    pub async fn acquire(&self) -> StoreResult<Pooled<C>> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| StoreError::PoolExhausted {
            timeout: self.acquire_timeout,
        })?
        // The semaphore is never closed.
        .map_err(|_| StoreError::PoolExhausted {
            timeout: self.acquire_timeout,
        })?;

        let connection = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        // Holding a permit guarantees an idle connection.
        let connection = connection.ok_or(StoreError::PoolExhausted {
            timeout: self.acquire_timeout,
        })?;

        Ok(Pooled {
            connection: Some(connection),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }
}

impl<C> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size)
            .field("in_use", &self.in_use())
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// RAII guard for a checked-out connection.
///
/// Dropping the guard returns the connection to the pool before releasing its permit.
pub struct Pooled<C> {
    connection: Option<C>,
    idle: Arc<Mutex<Vec<C>>>,
    _permit: OwnedSemaphorePermit,
}

impl<C> Deref for Pooled<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only taken in `drop`.
        self.connection.as_ref().expect("pooled connection present")
    }
}

impl<C> DerefMut for Pooled<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.connection.as_mut().expect("pooled connection present")
    }
}

impl<C> Drop for Pooled<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(connection);
        }
    }
}

impl<C> fmt::Debug for Pooled<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").finish_non_exhaustive()
    }
}
