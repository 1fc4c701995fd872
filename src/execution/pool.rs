use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{ExecutorError, TradeExecutor};

/// Fixed set of executor sessions shared by concurrent evaluations.
pub struct ExecutorPool {
    idle: Mutex<Vec<Box<dyn TradeExecutor>>>,
    returned: Condvar,
    size: usize,
    leased: AtomicUsize,
    peak: AtomicUsize,
}

impl ExecutorPool {
    pub fn new(sessions: Vec<Box<dyn TradeExecutor>>) -> Self {
        let size = sessions.len();
        Self {
            idle: Mutex::new(sessions),
            returned: Condvar::new(),
            size,
            leased: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn single(session: impl TradeExecutor + 'static) -> Self {
        Self::new(vec![Box::new(session)])
    }

    /// Blocks until a session is free or `timeout` elapses.
    pub fn acquire(&self, timeout: Duration) -> Result<ExecutorLease<'_>, ExecutorError> {
        if self.size == 0 {
            return Err(ExecutorError::Unavailable("pool has no sessions".to_string()));
        }
        let deadline = Instant::now() + timeout;
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(session) = idle.pop() {
                let leased = self.leased.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(leased, Ordering::SeqCst);
                return Ok(ExecutorLease {
                    session: Some(session),
                    pool: self,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ExecutorError::Unavailable(format!(
                    "all {} sessions busy for {:?}",
                    self.size, timeout
                )));
            }
            idle = self
                .returned
                .wait_timeout(idle, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Highest number of simultaneously leased sessions observed
    pub fn peak_leased(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn release(&self, session: Box<dyn TradeExecutor>) {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).push(session);
        self.leased.fetch_sub(1, Ordering::SeqCst);
        self.returned.notify_one();
    }
}

/// Exclusive use of one session; returned to the pool on drop.
pub struct ExecutorLease<'a> {
    session: Option<Box<dyn TradeExecutor>>,
    pool: &'a ExecutorPool,
}

impl Deref for ExecutorLease<'_> {
    type Target = dyn TradeExecutor;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the session out.
        self.session.as_deref().expect("lease holds a session until dropped")
    }
}

impl DerefMut for ExecutorLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_deref_mut().expect("lease holds a session until dropped")
    }
}

impl Drop for ExecutorLease<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SimulatedExecutor;
    use std::sync::Arc;

    fn pool(sessions: usize) -> ExecutorPool {
        let ticks = Arc::new(crate::data::synthetic_ticks(1, 10, 100.0, 0.0, 0.01));
        ExecutorPool::new(
            (0..sessions)
                .map(|_| Box::new(SimulatedExecutor::new("SIM", Arc::clone(&ticks))) as Box<dyn TradeExecutor>)
                .collect(),
        )
    }

    #[test]
    fn lease_returns_session_on_drop() {
        let pool = pool(1);
        {
            let _lease = pool.acquire(Duration::from_millis(10)).unwrap();
            assert_eq!(pool.available(), 0);
            assert!(pool.acquire(Duration::from_millis(10)).is_err());
        }
        assert_eq!(pool.available(), 1);
        assert!(pool.acquire(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn waiting_acquire_wakes_on_release() {
        let pool = Arc::new(pool(1));
        let lease = pool.acquire(Duration::from_millis(10)).unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.acquire(Duration::from_secs(5)).is_ok())
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(lease);
        assert!(waiter.join().unwrap());
        assert_eq!(pool.peak_leased(), 1);
    }

    #[test]
    fn empty_pool_is_unavailable() {
        let pool = ExecutorPool::new(Vec::new());
        assert!(matches!(
            pool.acquire(Duration::from_millis(1)),
            Err(ExecutorError::Unavailable(_))
        ));
    }
}
