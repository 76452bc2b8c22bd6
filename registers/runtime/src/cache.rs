// Licensed under the Apache-2.0 license

//! Exclusive cached-access sessions.

use crate::error::{RalError, RalResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Behaviour of a cached session when it closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Discard the modified snapshot instead of writing it back.
    pub skip_write: bool,
    /// Read the contents back after the write and fail on any difference.
    pub verify: bool,
}

impl CacheOptions {
    pub fn read_only() -> Self {
        Self {
            skip_write: true,
            verify: false,
        }
    }

    pub fn verified() -> Self {
        Self {
            skip_write: false,
            verify: true,
        }
    }
}

/// Marks an object as having an open cached session. Shared by every clone of
/// the object so a session opened through one handle blocks all others.
///
/// A lock created with [`CacheLock::child`] also excludes its parent: an
/// element session cannot open while the enclosing array session is open,
/// and the array session cannot open while any element session is open.
#[derive(Debug, Default)]
pub struct CacheLock {
    active: AtomicBool,
    /// Open sessions on children of this lock.
    nested: AtomicUsize,
    parent: Option<Arc<CacheLock>>,
}

impl CacheLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a lock nested under `parent`.
    pub fn child(parent: &Arc<CacheLock>) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(parent.clone()),
            ..Self::default()
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Takes the lock, failing fast if a session is already open on this
    /// object, on its parent or on any of its children.
    pub fn acquire(self: &Arc<Self>, name: &str) -> RalResult<CacheGuard> {
        let busy = || RalError::CachedAccessActive {
            name: name.to_string(),
        };
        if let Some(parent) = &self.parent {
            parent.nested.fetch_add(1, Ordering::SeqCst);
            if parent.is_active() {
                parent.nested.fetch_sub(1, Ordering::SeqCst);
                return Err(busy());
            }
        }
        let release_parent = || {
            if let Some(parent) = &self.parent {
                parent.nested.fetch_sub(1, Ordering::SeqCst);
            }
        };
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            release_parent();
            return Err(busy());
        }
        if self.nested.load(Ordering::SeqCst) > 0 {
            self.active.store(false, Ordering::SeqCst);
            release_parent();
            return Err(busy());
        }
        Ok(CacheGuard { lock: self.clone() })
    }
}

/// Releases the [`CacheLock`] when dropped.
#[derive(Debug)]
pub struct CacheGuard {
    lock: Arc<CacheLock>,
}

impl Drop for CacheGuard {
    fn drop(&mut self) {
        self.lock.active.store(false, Ordering::SeqCst);
        if let Some(parent) = &self.lock.parent {
            parent.nested.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Compares a written snapshot against what was read back.
pub(crate) fn verify_words(
    address: u64,
    stride: u64,
    expected: &[u128],
    actual: &[u128],
) -> RalResult<()> {
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        if e != a {
            return Err(RalError::VerifyMismatch {
                address: address + i as u64 * stride,
                expected: *e,
                actual: *a,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let lock = CacheLock::new();
        let guard = lock.acquire("top.mem").unwrap();
        assert!(lock.is_active());
        assert_eq!(
            lock.acquire("top.mem").unwrap_err(),
            RalError::CachedAccessActive {
                name: "top.mem".to_string()
            }
        );
        drop(guard);
        assert!(!lock.is_active());
        assert!(lock.acquire("top.mem").is_ok());
    }

    #[test]
    fn test_child_excludes_parent() {
        let array = CacheLock::new();
        let first = CacheLock::child(&array);
        let second = CacheLock::child(&array);

        let element = first.acquire("top.regs[0]").unwrap();
        assert!(matches!(
            array.acquire("top.regs"),
            Err(RalError::CachedAccessActive { .. })
        ));
        assert!(!array.is_active());
        // Siblings stay independent.
        let other = second.acquire("top.regs[1]").unwrap();
        drop(element);
        assert!(array.acquire("top.regs").is_err());
        drop(other);

        let whole = array.acquire("top.regs").unwrap();
        assert_eq!(
            first.acquire("top.regs[0]").unwrap_err(),
            RalError::CachedAccessActive {
                name: "top.regs[0]".to_string()
            }
        );
        assert!(!first.is_active());
        drop(whole);
        assert!(first.acquire("top.regs[0]").is_ok());
        assert!(array.acquire("top.regs").is_ok());
    }

    #[test]
    fn test_verify_words() {
        assert!(verify_words(0x100, 4, &[1, 2], &[1, 2]).is_ok());
        assert_eq!(
            verify_words(0x100, 4, &[1, 2], &[1, 3]),
            Err(RalError::VerifyMismatch {
                address: 0x104,
                expected: 2,
                actual: 3
            })
        );
    }
}
