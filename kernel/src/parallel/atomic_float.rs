//! AtomicFloat

use crate::common::Float;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Floating point value shared between threads, stored as its bit pattern
/// in an `AtomicU32`.
pub struct AtomicFloat {
    bits: AtomicU32,
}

impl AtomicFloat {
    /// Create a new `AtomicFloat`.
    ///
    /// * `v` - The value.
    pub fn new(v: Float) -> Self {
        Self {
            bits: AtomicU32::new(v.to_bits()),
        }
    }

    /// Loads the value.
    ///
    /// * `order` - Memory ordering of this operation
    pub fn load(&self, order: Ordering) -> Float {
        Float::from_bits(self.bits.load(order))
    }

    /// Stores the value.
    ///
    /// * `v`     - The value.
    /// * `order` - Memory ordering of this operation
    pub fn store(&self, v: Float, order: Ordering) {
        self.bits.store(v.to_bits(), order);
    }
}

impl Default for AtomicFloat {
    /// Returns an `AtomicFloat` holding 0.
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clone for AtomicFloat {
    fn clone(&self) -> Self {
        Self::new(self.load(Ordering::Acquire))
    }
}

impl fmt::Debug for AtomicFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomicFloat({})", self.load(Ordering::Relaxed))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_is_zero() {
        assert_eq!(AtomicFloat::default().load(Ordering::Relaxed), 0.0);
    }

    proptest! {
        #[test]
        fn store_then_load(v in -1.0e6f32..1.0e6f32) {
            let a = AtomicFloat::default();
            a.store(v, Ordering::Release);
            prop_assert_eq!(a.load(Ordering::Acquire), v);
            prop_assert_eq!(a.clone().load(Ordering::Acquire), v);
        }
    }
}
