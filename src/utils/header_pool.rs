//! # Header Pool
//!
//! Connection-scoped free list of reusable headers.
//!
//! Each codec owns its own pool, so there is no contention across connections.
//! A header handed out by [`HeaderPool::acquire`] is always in its reset state;
//! when the [`PooledHeader`] guard drops, the header is reset again and goes
//! back on the free list.
//!
//! ## Usage
//! ```rust
//! use tinyrpc::core::header::{Header, RequestHeader};
//! use tinyrpc::utils::header_pool::HeaderPool;
//!
//! let pool: HeaderPool<RequestHeader> = HeaderPool::new(4);
//! {
//!     let mut header = pool.acquire();
//!     header.method.push_str("Arith.Add");
//!     header.id = 7;
//! } // reset and returned here
//! assert_eq!(pool.available(), 4);
//! assert!(pool.acquire().method.is_empty());
//! ```

use std::sync::{Arc, Mutex};

use crate::core::header::Header;

/// Default number of headers kept per pool
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Upper bound on retained headers; extras are dropped on release
const MAX_POOLED_HEADERS: usize = 64;

/// A pooled header that resets and returns itself to the pool when dropped
pub struct PooledHeader<H: Header> {
    header: H,
    pool: Arc<Mutex<Vec<H>>>,
}

impl<H: Header> std::ops::Deref for PooledHeader<H> {
    type Target = H;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

impl<H: Header> std::ops::DerefMut for PooledHeader<H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.header
    }
}

impl<H: Header> Drop for PooledHeader<H> {
    fn drop(&mut self) {
        let mut header = std::mem::take(&mut self.header);
        header.reset();
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < MAX_POOLED_HEADERS {
                pool.push(header);
            }
        }
    }
}

/// Thread-safe free list of headers
pub struct HeaderPool<H: Header> {
    pool: Arc<Mutex<Vec<H>>>,
}

impl<H: Header> HeaderPool<H> {
    /// Create a pool pre-filled with `pool_size` headers
    pub fn new(pool_size: usize) -> Self {
        let pool = (0..pool_size).map(|_| H::default()).collect();
        Self {
            pool: Arc::new(Mutex::new(pool)),
        }
    }

    /// Take a reset header from the pool (or allocate one if the pool is empty)
    pub fn acquire(&self) -> PooledHeader<H> {
        let header = self
            .pool
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_default();

        PooledHeader {
            header,
            pool: self.pool.clone(),
        }
    }

    /// Get the current number of idle headers in the pool
    pub fn available(&self) -> usize {
        self.pool.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl<H: Header> Default for HeaderPool<H> {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
