//! Synchronization primitives shared by the worker pools.
//!
//! The standard library already provides the mutex and condition variable;
//! what it lacks is a counting semaphore, which the job queue uses to signal
//! "at least one item is queued" to its consumers.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the guard if another thread panicked while
/// holding it. The data protected by our locks stays consistent across a
/// panic (plain pushes and pops), so poisoning carries no information here.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A counting semaphore.
///
/// `post` increments the count and wakes one waiter; `wait` blocks until the
/// count is positive and then decrements it.
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with the given initial count.
    pub fn new(initial: usize) -> Self {
        Self {
            count: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Increments the count and wakes one waiter.
    pub fn post(&self) {
        let mut count = lock(&self.count);
        *count += 1;
        self.cond.notify_one();
    }

    /// Blocks until the count is positive, then decrements it.
    pub fn wait(&self) {
        let mut count = lock(&self.count);
        while *count == 0 {
            count = self
                .cond
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn post_then_wait_does_not_block() {
        let sem = Semaphore::new(0);
        sem.post();
        sem.post();
        sem.wait();
        sem.wait();
    }

    #[test]
    fn initial_count_is_available() {
        let sem = Semaphore::new(1);
        sem.wait();
    }

    #[test]
    fn waiter_is_woken_by_post() {
        let sem = Arc::new(Semaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.wait())
        };
        sem.post();
        waiter.join().unwrap();
    }
}
