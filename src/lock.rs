//! Named job lock.
//!
//! Guards against overlapping runs of the same job (cron tick racing a
//! manual trigger). Holders past the hard timeout are treated as
//! crashed and their lock is stealable; contention is a no-op for the
//! caller, never an error.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct JobLock {
    held: Mutex<HashMap<String, Instant>>,
    timeout: Duration,
}

/// RAII guard; dropping it releases the named lock.
#[derive(Debug)]
pub struct JobGuard<'a> {
    lock: &'a JobLock,
    name: String,
}

impl JobLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the named lock, or `None` when it is already held and
    /// not yet stale.
    pub fn try_acquire(&self, name: &str) -> Option<JobGuard<'_>> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(acquired_at) = held.get(name) {
            if acquired_at.elapsed() < self.timeout {
                return None;
            }
            tracing::warn!("stealing stale lock '{}' (held past timeout)", name);
        }
        held.insert(name.to_string(), Instant::now());
        Some(JobGuard {
            lock: self,
            name: name.to_string(),
        })
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.lock
            .held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.name);
    }
}
