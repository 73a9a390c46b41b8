//! The owning exclusive domain for a set of configurations.
//!
//! Declaration-time mutation happens on the thread that owns the domain
//! (typically the thread configuring the project). Worker threads may be
//! registered and can enter the domain by taking an exclusive lease;
//! unregistered threads must not drive resolution at all.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::cell::thread_token;

/// Exclusive mutable-state domain shared by all configurations of one owner.
pub struct BuildDomain {
    /// Token of the thread that owns the mutable state.
    owner: AtomicU64,
    /// Token of the thread currently holding the exclusive lease, 0 if none.
    lease: AtomicU64,
    lock: Mutex<()>,
    workers: Mutex<HashSet<u64>>,
}

impl BuildDomain {
    /// Create a domain owned by the current thread.
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(thread_token()),
            lease: AtomicU64::new(0),
            lock: Mutex::new(()),
            workers: Mutex::new(HashSet::new()),
        }
    }

    /// Register the current thread as a managed worker.
    pub fn register_current_worker(&self) {
        self.workers.lock().unwrap().insert(thread_token());
    }

    /// Whether the current thread is a registered worker.
    pub fn is_worker_thread(&self) -> bool {
        self.workers.lock().unwrap().contains(&thread_token())
    }

    /// Whether the current thread may mutate domain state right now: it is
    /// the owner, or it holds the exclusive lease.
    pub fn has_mutable_state(&self) -> bool {
        let me = thread_token();
        self.owner.load(Ordering::Acquire) == me || self.lease.load(Ordering::Acquire) == me
    }

    /// Run `f` holding the exclusive lease. Worker threads use this to enter
    /// the domain before performing a resolution transition.
    pub fn with_mutable_state<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock().unwrap();
        self.lease.store(thread_token(), Ordering::Release);
        let result = f();
        self.lease.store(0, Ordering::Release);
        result
    }
}

impl Default for BuildDomain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_thread_has_mutable_state() {
        let domain = BuildDomain::new();
        assert!(domain.has_mutable_state());
    }

    #[test]
    fn other_threads_do_not_have_mutable_state() {
        let domain = std::sync::Arc::new(BuildDomain::new());
        let d = domain.clone();
        std::thread::spawn(move || {
            assert!(!d.has_mutable_state());
            assert!(!d.is_worker_thread());
            d.register_current_worker();
            assert!(d.is_worker_thread());
            d.with_mutable_state(|| assert!(d.has_mutable_state()));
            assert!(!d.has_mutable_state());
        })
        .join()
        .unwrap();
    }
}
