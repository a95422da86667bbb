//! Core pinning around timed regions
//!
//! A thread that migrates between cores in the middle of a measurement reads
//! its start and end stamps from different counters and picks up cache and
//! scheduling noise on the way. [`AffinityController::pin`] confines the
//! calling thread to the core it is running on and hands back a guard that
//! re-applies the default mask captured at initialization when dropped, on
//! every exit path including unwinding.
//!
//! # Platform Behavior
//!
//! - **Linux**: `sched_setaffinity` on the calling thread.
//! - **Everything else**: no affinity API is used; pinning is a no-op and
//!   measurements are noisier, not wrong.

mod mask;

pub use mask::AffinityMask;

use log::{debug, warn};

/// Pins timed regions to a single core, or does nothing where it can't
#[derive(Debug, Clone)]
pub enum AffinityController {
    /// Pinning available; holds the mask to restore after each region
    Pinning(AffinityMask),
    /// No affinity control on this platform or by configuration
    Unavailable,
}

impl AffinityController {
    /// Capture the calling thread's current mask as the default
    pub fn detect() -> Self {
        match AffinityMask::current() {
            Ok(mask) => {
                debug!("Captured default affinity mask: {:?}", mask);
                AffinityController::Pinning(mask)
            }
            Err(e) if e.kind() == std::io::ErrorKind::Unsupported => {
                debug!("CPU affinity not supported on this platform");
                AffinityController::Unavailable
            }
            Err(e) => {
                warn!("Cannot read CPU affinity, timed calls will not be pinned: {}", e);
                AffinityController::Unavailable
            }
        }
    }

    /// Controller that never pins
    pub fn disabled() -> Self {
        AffinityController::Unavailable
    }

    pub fn is_pinning(&self) -> bool {
        matches!(self, AffinityController::Pinning(_))
    }

    /// Mask restored after every pinned region
    pub fn default_mask(&self) -> Option<&AffinityMask> {
        match self {
            AffinityController::Pinning(mask) => Some(mask),
            AffinityController::Unavailable => None,
        }
    }

    /// Pin the calling thread to `core` until the guard is dropped
    ///
    /// A pin that cannot be applied yields an inert guard.
    pub fn pin(&self, core: u32) -> AffinityGuard<'_> {
        let AffinityController::Pinning(default) = self else {
            return AffinityGuard::inert();
        };

        let Some(single) = AffinityMask::single(core as usize) else {
            debug!("Core {} outside the affinity mask range, not pinning", core);
            return AffinityGuard::inert();
        };

        match single.apply() {
            Ok(()) => AffinityGuard {
                restore: Some(default),
                core: Some(core),
            },
            Err(e) => {
                debug!("Failed to pin thread to core {}: {}", core, e);
                AffinityGuard::inert()
            }
        }
    }
}

/// Restores the default affinity mask when dropped
#[derive(Debug)]
#[must_use = "dropping the guard immediately restores the default affinity"]
pub struct AffinityGuard<'a> {
    restore: Option<&'a AffinityMask>,
    core: Option<u32>,
}

impl AffinityGuard<'_> {
    fn inert() -> Self {
        Self {
            restore: None,
            core: None,
        }
    }

    /// Whether the thread is actually pinned
    pub fn is_pinned(&self) -> bool {
        self.restore.is_some()
    }

    /// Core the thread is pinned to
    pub fn core(&self) -> Option<u32> {
        self.core
    }
}

impl Drop for AffinityGuard<'_> {
    fn drop(&mut self) {
        if let Some(mask) = self.restore.take()
            && let Err(e) = mask.apply()
        {
            warn!("Failed to restore CPU affinity: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_noop() {
        let controller = AffinityController::disabled();
        let guard = controller.pin(0);

        assert!(!controller.is_pinning());
        assert!(!guard.is_pinned());
        assert_eq!(guard.core(), None);
    }

    #[test]
    fn test_out_of_range_core_is_inert() {
        let controller = AffinityController::detect();
        let guard = controller.pin(u32::MAX);

        assert!(!guard.is_pinned());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pin_and_restore() {
        let controller = AffinityController::detect();
        let Some(default) = controller.default_mask().cloned() else {
            return;
        };
        let Some(core) = default.first() else {
            return;
        };

        {
            let guard = controller.pin(core as u32);
            if guard.is_pinned() {
                let pinned = AffinityMask::current().unwrap();
                assert_eq!(pinned.count(), 1);
                assert!(pinned.contains(core));
            }
        }

        let restored = AffinityMask::current().unwrap();
        assert_eq!(restored, default);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_restore_on_panic() {
        let controller = AffinityController::detect();
        let Some(default) = controller.default_mask().cloned() else {
            return;
        };
        let Some(core) = default.first() else {
            return;
        };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = controller.pin(core as u32);
            panic!("timed region failed");
        }));

        assert!(result.is_err());
        assert_eq!(AffinityMask::current().unwrap(), default);
    }
}
