//! GIL Controller
//!
//! Models a runtime whose global interpreter lock can be turned off. On
//! such a runtime the lock is enabled transiently around an extension's
//! init step; once the module is created it is either released again (the
//! module declared itself lock-free) or made permanent for the rest of the
//! process. Permanent enabling is one-way.
//!
//! On runtimes with an always-on GIL every operation is a no-op.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct GilController {
    free_threaded: bool,
    permanent: AtomicBool,
    transient: AtomicUsize,
}

impl GilController {
    pub fn new(free_threaded: bool) -> Self {
        Self {
            free_threaded,
            permanent: AtomicBool::new(false),
            transient: AtomicUsize::new(0),
        }
    }

    pub fn is_free_threaded(&self) -> bool {
        self.free_threaded
    }

    /// Whether the lock is currently in effect
    pub fn is_enabled(&self) -> bool {
        !self.free_threaded
            || self.permanent.load(Ordering::Acquire)
            || self.transient.load(Ordering::Acquire) > 0
    }

    pub fn is_permanently_enabled(&self) -> bool {
        !self.free_threaded || self.permanent.load(Ordering::Acquire)
    }

    /// Take a transient hold for the duration of an init step
    pub fn enable_transient(&self) {
        if self.free_threaded {
            self.transient.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Drop a transient hold
    pub fn disable(&self) {
        if self.free_threaded {
            let _ = self
                .transient
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        }
    }

    /// Turn a transient hold into a permanent enable.
    ///
    /// Returns true only for the call that actually flipped the lock on.
    pub fn enable_permanent(&self) -> bool {
        if !self.free_threaded {
            return false;
        }
        self.disable();
        !self.permanent.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_on_runtime() {
        let gil = GilController::new(false);
        gil.enable_transient();
        gil.disable();
        assert!(gil.is_enabled());
        assert!(!gil.enable_permanent());
    }

    #[test]
    fn test_transient_hold_released() {
        let gil = GilController::new(true);
        assert!(!gil.is_enabled());
        gil.enable_transient();
        assert!(gil.is_enabled());
        gil.disable();
        assert!(!gil.is_enabled());
        gil.disable();
        assert!(!gil.is_enabled());
    }

    #[test]
    fn test_permanent_is_monotonic() {
        let gil = GilController::new(true);
        gil.enable_transient();
        assert!(gil.enable_permanent());
        gil.enable_transient();
        assert!(!gil.enable_permanent());
        gil.disable();
        assert!(gil.is_enabled());
        assert!(gil.is_permanently_enabled());
    }
}
