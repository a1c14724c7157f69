//! Interrupt masking.
//!
//! On a single processor, masking interrupts is the only way to make a
//! sequence of kernel operations atomic. Every synchronization primitive and
//! every scheduler entry point runs with interrupts off.

use core::sync::atomic::{AtomicBool, Ordering};

/// Interrupt level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLevel {
    /// Interrupts masked.
    Off,
    /// Interrupts enabled.
    On,
}

/// The interrupt controller of the simulated machine.
#[derive(Debug)]
pub struct Interrupt {
    enabled: AtomicBool,
}

impl Interrupt {
    /// Create a controller with interrupts masked, as at power-on.
    pub const fn new() -> Self {
        Interrupt {
            enabled: AtomicBool::new(false),
        }
    }

    /// Set the interrupt level and return the previous one.
    pub fn set_level(&self, level: IntLevel) -> IntLevel {
        let old = self.enabled.swap(level == IntLevel::On, Ordering::SeqCst);
        if old {
            IntLevel::On
        } else {
            IntLevel::Off
        }
    }

    /// Get the current interrupt level.
    pub fn level(&self) -> IntLevel {
        if self.enabled.load(Ordering::SeqCst) {
            IntLevel::On
        } else {
            IntLevel::Off
        }
    }

    /// Whether interrupts are currently masked.
    pub fn is_masked(&self) -> bool {
        self.level() == IntLevel::Off
    }

    /// Mask interrupts until the returned guard is dropped.
    ///
    /// The guard restores whatever level was in effect before, so nested
    /// critical sections compose.
    pub fn mask(&self) -> MaskGuard<'_> {
        let old = self.set_level(IntLevel::Off);
        MaskGuard {
            interrupt: self,
            old,
        }
    }
}

/// Restores the saved interrupt level on drop.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct MaskGuard<'a> {
    interrupt: &'a Interrupt,
    old: IntLevel,
}

impl MaskGuard<'_> {
    /// Level that will be restored.
    pub fn saved_level(&self) -> IntLevel {
        self.old
    }
}

impl Drop for MaskGuard<'_> {
    fn drop(&mut self) {
        // A thread torn down mid-section must not touch the level: the
        // thread that now owns the processor set it.
        if !std::thread::panicking() {
            self.interrupt.set_level(self.old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_level_returns_previous() {
        let interrupt = Interrupt::new();
        assert_eq!(interrupt.level(), IntLevel::Off);
        assert_eq!(interrupt.set_level(IntLevel::On), IntLevel::Off);
        assert_eq!(interrupt.set_level(IntLevel::On), IntLevel::On);
        assert!(!interrupt.is_masked());
    }

    #[test]
    fn test_nested_masks_restore_in_order() {
        let interrupt = Interrupt::new();
        interrupt.set_level(IntLevel::On);
        {
            let outer = interrupt.mask();
            assert_eq!(outer.saved_level(), IntLevel::On);
            {
                let inner = interrupt.mask();
                assert_eq!(inner.saved_level(), IntLevel::Off);
            }
            assert!(interrupt.is_masked());
        }
        assert_eq!(interrupt.level(), IntLevel::On);
    }
}
