//! Fixed-size worker pool for agent tasks.
//!
//! Wraps a fair tokio semaphore: permits are handed out in FIFO order, so
//! tasks queue unbounded when the pool is saturated and wake in arrival
//! order. The pool is shared process-wide across requests.

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Wait for a worker slot. The permit releases the slot on drop.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.semaphore).acquire_owned().await
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permits_bound_parallelism() {
        let pool = Arc::new(WorkerPool::new(2));
        let p1 = pool.acquire().await.unwrap();
        let _p2 = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        // Third acquire must wait until a permit is released.
        let pool_clone = Arc::clone(&pool);
        let waiter = tokio::spawn(async move { pool_clone.acquire().await.unwrap() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(p1);
        let _p3 = waiter.await.unwrap();
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn zero_size_clamps_to_one() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.size(), 1);
    }
}
