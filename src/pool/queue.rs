//! Bounded FIFO job queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::sync::{Semaphore, lock};

/// A capacity-bounded FIFO shared between one producer (the reactor thread)
/// and many consumers (the workers).
///
/// The mutex only guards the push/pop itself; the semaphore counts queued
/// items so idle consumers sleep instead of spinning on the lock.
#[derive(Debug)]
pub struct JobQueue<T> {
    items: Mutex<VecDeque<T>>,
    queued: Semaphore,
    capacity: usize,
}

impl<T> JobQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            queued: Semaphore::new(0),
            capacity,
        }
    }

    /// Appends an item at the back.
    ///
    /// Fails immediately when the queue is full, handing the item back and
    /// leaving the queue untouched.
    pub fn push(&self, item: T) -> Result<(), T> {
        {
            let mut items = lock(&self.items);
            if items.len() >= self.capacity {
                return Err(item);
            }
            items.push_back(item);
        }
        self.queued.post();
        Ok(())
    }

    /// Removes the front item, blocking until there is one.
    pub fn pop(&self) -> T {
        loop {
            self.queued.wait();
            if let Some(item) = lock(&self.items).pop_front() {
                return item;
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
