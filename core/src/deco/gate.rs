//! Exclusive access to the decompression model.
//!
//! The dive planner and the profile analysis both drive tissue simulations
//! that the host application treats as one shared resource. A profile pass
//! holds the gate for its whole duration.

use std::sync::{Condvar, Mutex, PoisonError};

/// A lock around the host's decompression model.
///
/// Not reentrant: acquiring twice from the same caller without releasing
/// blocks forever.
pub trait SharedDecoModel: Send + Sync {
    fn acquire(&self);
    fn release(&self);
}

/// Blocking binary gate.
#[derive(Debug)]
pub struct PlannerLock {
    locked: Mutex<bool>,
    available: Condvar,
}

impl PlannerLock {
    pub const fn new() -> Self {
        PlannerLock {
            locked: Mutex::new(false),
            available: Condvar::new(),
        }
    }

    pub fn is_held(&self) -> bool {
        *self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PlannerLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedDecoModel for PlannerLock {
    fn acquire(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        while *locked {
            locked = self
                .available
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *locked = true;
    }

    fn release(&self) {
        let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
        *locked = false;
        self.available.notify_one();
    }
}

/// Process-wide gate shared with the planner.
pub static PLANNER_LOCK: PlannerLock = PlannerLock::new();

/// Holds a gate until dropped.
pub struct ExclusiveAccess<'a> {
    gate: &'a dyn SharedDecoModel,
}

impl<'a> ExclusiveAccess<'a> {
    pub fn new(gate: &'a dyn SharedDecoModel) -> Self {
        gate.acquire();
        ExclusiveAccess { gate }
    }
}

impl Drop for ExclusiveAccess<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = PlannerLock::new();
        {
            let _access = ExclusiveAccess::new(&lock);
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
    }

    #[test]
    fn test_second_holder_waits() {
        let lock = Arc::new(PlannerLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (lock, inside, peak) = (Arc::clone(&lock), Arc::clone(&inside), Arc::clone(&peak));
                thread::spawn(move || {
                    let _access = ExclusiveAccess::new(lock.as_ref());
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1, "holders must never overlap");
        assert!(!lock.is_held());
    }
}
