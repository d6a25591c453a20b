//! Bounded pool of ML model handles
//!
//! A fixed set of handles with cooperative borrow/return: `borrow`
//! suspends when every handle is out, waiters resume in FIFO order, and
//! the RAII guard returns the handle on every exit path, including
//! cancellation.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct ModelPool<M> {
    semaphore: Arc<Semaphore>,
    free: Arc<Mutex<VecDeque<M>>>,
    count: usize,
}

impl<M: Send + 'static> ModelPool<M> {
    pub fn new(models: Vec<M>) -> Self {
        let count = models.len();
        Self {
            semaphore: Arc::new(Semaphore::new(count)),
            free: Arc::new(Mutex::new(models.into())),
            count,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Handles currently on the free list.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Borrow a handle, suspending until one is free. Waiters are served
    /// in arrival order.
    pub async fn borrow(&self) -> PooledModel<M> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("model pool semaphore closed");
        let model = self
            .free
            .lock()
            .unwrap()
            .pop_front()
            .expect("permit held but free list empty");
        PooledModel {
            free: Arc::clone(&self.free),
            model: Some(model),
            _permit: permit,
        }
    }

    /// Borrow, run `f`, return. The guard guarantees the handle comes
    /// back on success, error and cancellation alike.
    pub async fn with_model<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        let guard = self.borrow().await;
        f(&guard)
    }
}

/// RAII guard for one borrowed handle.
pub struct PooledModel<M: Send + 'static> {
    free: Arc<Mutex<VecDeque<M>>>,
    model: Option<M>,
    _permit: OwnedSemaphorePermit,
}

impl<M: Send + 'static> Deref for PooledModel<M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model.as_ref().expect("model taken")
    }
}

impl<M: Send + 'static> Drop for PooledModel<M> {
    fn drop(&mut self) {
        if let Some(model) = self.model.take() {
            // The handle goes back before the permit releases, so the
            // next waiter always finds the free list non-empty.
            self.free.lock().unwrap().push_back(model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_borrow_and_return() {
        let pool = ModelPool::new(vec![1u32, 2, 3]);
        assert_eq!(pool.available(), 3);
        {
            let a = pool.borrow().await;
            let b = pool.borrow().await;
            assert_eq!(pool.available(), 1);
            assert_ne!(*a, *b);
        }
        assert_eq!(pool.available(), 3);
    }

    #[tokio::test]
    async fn test_waiters_resume_fifo() {
        let pool = Arc::new(ModelPool::new(vec![0u32]));
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = pool.borrow().await;
        let mut handles = Vec::new();
        for i in 0..4 {
            let pool = Arc::clone(&pool);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let _guard = pool.borrow().await;
                order.lock().unwrap().push(i);
            }));
            // Give each waiter time to enqueue before the next.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        drop(first);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_with_model() {
        let pool = ModelPool::new(vec![41u32]);
        let out = pool.with_model(|m| m + 1).await;
        assert_eq!(out, 42);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_nothing() {
        let pool = Arc::new(ModelPool::new(vec![0u32]));
        let held = pool.borrow().await;

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let _g = pool.borrow().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        waiter.abort();
        let _ = waiter.await;

        drop(held);
        // The pool is whole again despite the aborted waiter.
        assert_eq!(pool.available(), 1);
        let g = pool.borrow().await;
        assert_eq!(*g, 0);
    }

    #[tokio::test]
    async fn test_conservation_under_load() {
        let pool = Arc::new(ModelPool::new(vec![0u32, 1, 2]));
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..24 {
            let pool = Arc::clone(&pool);
            let peak = Arc::clone(&peak);
            let current = Arc::clone(&current);
            handles.push(tokio::spawn(async move {
                let _g = pool.borrow().await;
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.available(), 3);
    }
}
