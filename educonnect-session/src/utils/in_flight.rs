//! One-shot result slot shared between a leader and any number of waiters.
//!
//! The leader performs the work and publishes the outcome once; waiters that
//! attached while the work was running all observe that same outcome.

use tokio::sync::{Notify, OnceCell};

pub struct InFlight<T> {
    result: OnceCell<T>,
    notify: Notify,
}

impl<T: Clone> InFlight<T> {
    pub fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    /// Publish the outcome and wake every waiter.
    ///
    /// Returns `false` if an outcome was already published; the first one wins.
    pub fn set_result(&self, result: T) -> bool {
        let first = self.result.set(result).is_ok();
        self.notify.notify_waiters();
        first
    }

    pub fn get(&self) -> Option<T> {
        self.result.get().cloned()
    }

    pub fn is_complete(&self) -> bool {
        self.result.initialized()
    }

    pub async fn wait(&self) -> T {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

impl<T: Clone> Default for InFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
