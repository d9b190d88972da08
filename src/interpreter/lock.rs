//! Import Lock
//!
//! Re-entrant, thread-owned lock serializing "is this name being loaded"
//! decisions within one interpreter. A thread that already holds the lock
//! may acquire it again, so a module importing itself from its own init
//! function does not deadlock.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::error::{ImportError, ImportResult};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    count: usize,
}

pub struct ImportLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl ImportLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    /// Block until the calling thread owns the lock
    pub fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.count = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.count += 1;
                    return;
                }
                Some(_) => self.released.wait(&mut state),
            }
        }
    }

    /// Release one level of ownership
    pub fn release(&self) -> ImportResult<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            return Err(ImportError::LockNotHeld);
        }
        state.count -= 1;
        if state.count == 0 {
            state.owner = None;
            self.released.notify_one();
        }
        Ok(())
    }

    /// Acquire and return a guard that releases on drop
    pub fn guard(&self) -> ImportLockGuard<'_> {
        self.acquire();
        ImportLockGuard { lock: self }
    }

    /// Whether any thread holds the lock
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Whether the calling thread holds the lock
    pub fn is_held_by_current(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    /// Recursion depth of the current owner
    pub fn depth(&self) -> usize {
        self.state.lock().count
    }

    /// Re-derive ownership in a forked child.
    ///
    /// Only the forking thread survives a fork, so if it held the lock it
    /// keeps it at the same depth; a lock held by any other thread is reset.
    pub fn reinit_after_fork(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            *state = LockState::default();
        }
    }
}

impl Default for ImportLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped ownership of an [`ImportLock`]
pub struct ImportLockGuard<'a> {
    lock: &'a ImportLock,
}

impl Drop for ImportLockGuard<'_> {
    fn drop(&mut self) {
        // The guard's thread acquired the lock, so release cannot fail.
        let _ = self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reentrant_acquire() {
        let lock = ImportLock::new();
        lock.acquire();
        lock.acquire();
        assert_eq!(lock.depth(), 2);
        assert!(lock.is_held_by_current());

        lock.release().unwrap();
        assert!(lock.is_locked());
        lock.release().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_release_without_holding() {
        let lock = ImportLock::new();
        let err = lock.release().unwrap_err();
        assert_eq!(err.to_string(), "not holding the import lock");
    }

    #[test]
    fn test_release_from_other_thread() {
        let lock = Arc::new(ImportLock::new());
        let _guard = lock.guard();

        let other = Arc::clone(&lock);
        let result = thread::spawn(move || other.release()).join().unwrap();
        assert!(matches!(result, Err(ImportError::LockNotHeld)));
        assert!(lock.is_held_by_current());
    }

    #[test]
    fn test_guard_releases() {
        let lock = ImportLock::new();
        {
            let _outer = lock.guard();
            let _inner = lock.guard();
            assert_eq!(lock.depth(), 2);
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_reinit_after_fork_keeps_own_hold() {
        let lock = ImportLock::new();
        lock.acquire();
        lock.reinit_after_fork();
        assert!(lock.is_held_by_current());
        lock.release().unwrap();

        lock.reinit_after_fork();
        assert!(!lock.is_locked());
    }
}
