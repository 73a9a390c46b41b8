//! Lazy memoization and exclusive-update primitives.
//!
//! `MemoCell` is the compute-at-most-once cell used for derived state
//! (synthetic dependencies, lenient results). `ExclusiveCell` is the
//! atomically published state cell used for resolve-state transitions:
//! readers never block, writers serialize, and the thread currently inside
//! `update` may re-enter (a post-resolve listener can trigger a further
//! transition without deadlocking).

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// A small, stable, non-zero identifier for the current thread.
pub(crate) fn thread_token() -> u64 {
    THREAD_TOKEN.with(|t| *t)
}

/// A value computed at most once, safe under concurrent first access.
pub struct MemoCell<T> {
    slot: Mutex<Option<Arc<T>>>,
}

impl<T> MemoCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return the memoized value, computing it if absent. A failed
    /// computation leaves the cell empty so callers may retry.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        let mut slot = self.slot.lock().unwrap();
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = Arc::new(init()?);
        *slot = Some(value.clone());
        Ok(value)
    }

    /// Return the memoized value without computing it.
    pub fn peek(&self) -> Option<Arc<T>> {
        self.slot.lock().unwrap().clone()
    }
}

impl<T> Default for MemoCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An atomically published cell with exclusive read-modify-write updates.
///
/// `get` is wait-free and observes either the pre- or post-update value.
/// `update` serializes writers; `set` publishes an intermediate value from
/// within an update (the publish-before-listener ordering depends on this).
pub struct ExclusiveCell<T> {
    value: ArcSwap<T>,
    lock: Mutex<()>,
    /// Thread token of the thread inside `update`, 0 when idle.
    owner: AtomicU64,
}

impl<T> ExclusiveCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: ArcSwap::from_pointee(initial),
            lock: Mutex::new(()),
            owner: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Publish a value immediately. Outside of `update` this is a plain
    /// store; inside it, the value becomes visible to concurrent readers
    /// before the update completes.
    pub fn set(&self, value: Arc<T>) {
        self.value.store(value);
    }

    /// Exclusively transform the current value. Re-entrant: if the calling
    /// thread is already inside `update`, the function runs directly against
    /// the currently published value.
    pub fn update<E>(
        &self,
        f: impl FnOnce(Arc<T>) -> Result<Arc<T>, E>,
    ) -> Result<Arc<T>, E> {
        let me = thread_token();
        if self.owner.load(Ordering::Acquire) == me {
            let next = f(self.value.load_full())?;
            self.value.store(next.clone());
            return Ok(next);
        }

        let _guard = self.lock.lock().unwrap();
        self.owner.store(me, Ordering::Release);
        let reset = OwnerReset { owner: &self.owner };
        let result = f(self.value.load_full());
        drop(reset);
        let next = result?;
        self.value.store(next.clone());
        Ok(next)
    }
}

struct OwnerReset<'a> {
    owner: &'a AtomicU64,
}

impl Drop for OwnerReset<'_> {
    fn drop(&mut self) {
        self.owner.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn memo_cell_computes_once() {
        let calls = AtomicUsize::new(0);
        let cell = MemoCell::new();
        for _ in 0..3 {
            let value: Arc<i32> = cell
                .get_or_try_init(|| -> Result<i32, ()> {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_cell_failure_leaves_cell_empty() {
        let cell: MemoCell<i32> = MemoCell::new();
        let result: Result<_, &str> = cell.get_or_try_init(|| Err("nope"));
        assert!(result.is_err());
        assert!(cell.peek().is_none());
        let value = cell.get_or_try_init(|| -> Result<i32, &str> { Ok(7) }).unwrap();
        assert_eq!(*value, 7);
    }

    #[test]
    fn exclusive_cell_update_is_reentrant() {
        let cell = Arc::new(ExclusiveCell::new(0u32));
        let inner = cell.clone();
        let result: Result<_, ()> = cell.update(|outer| {
            // Nested update from the same thread must not deadlock.
            let nested = inner.update(|v| Ok::<_, ()>(Arc::new(*v + 1))).unwrap();
            assert_eq!(*nested, *outer + 1);
            Ok(Arc::new(*nested + 1))
        });
        assert_eq!(*result.unwrap(), 2);
    }

    #[test]
    fn exclusive_cell_publishes_intermediate_values() {
        let cell = ExclusiveCell::new(0u32);
        let _: Result<_, ()> = cell.update(|_| {
            cell.set(Arc::new(10));
            assert_eq!(*cell.get(), 10);
            Ok(Arc::new(20))
        });
        assert_eq!(*cell.get(), 20);
    }
}
