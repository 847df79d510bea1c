// system-tests/tests/helpers/bitset.rs
// ============================================================================
// Module: Claim Bit Set
// Description: Thread-safe set-once bit set for exactly-once assertions.
// Purpose: Let concurrent consumers record claimed values and detect both
//          duplicates and gaps.
// ============================================================================

//! ## Overview
//! Exactly-once delivery is asserted with a set-once bit per produced value:
//! a duplicate delivery trips `set_once` at claim time, and `missing` names
//! any value never delivered at all.

use std::sync::Mutex;

/// Fixed-size bit set where each bit may be set exactly once.
pub struct ClaimBits {
    bits: Mutex<Vec<bool>>,
}

impl ClaimBits {
    /// Creates a set of `len` cleared bits.
    pub fn new(len: usize) -> Self {
        Self { bits: Mutex::new(vec![false; len]) }
    }

    /// Sets the bit at `index`. Returns `false` when it was already set,
    /// which means the value was delivered twice.
    pub fn set_once(&self, index: usize) -> bool {
        let mut bits = self.bits.lock().expect("bit set lock should not be poisoned");
        assert!(index < bits.len(), "value {index} outside the produced range");
        let fresh = !bits[index];
        bits[index] = true;
        fresh
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        let bits = self.bits.lock().expect("bit set lock should not be poisoned");
        bits.iter().filter(|set| **set).count()
    }

    /// Indices never delivered.
    pub fn missing(&self) -> Vec<usize> {
        let bits = self.bits.lock().expect("bit set lock should not be poisoned");
        bits.iter()
            .enumerate()
            .filter_map(|(index, set)| (!set).then_some(index))
            .collect()
    }
}
