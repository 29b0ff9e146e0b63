use std::sync::atomic::Ordering;

use portable_atomic::AtomicI64;

/// Lock-free signed 64-bit accumulator that saturates at the `i64` bounds
/// instead of wrapping.
///
/// Counters use this as a local mirror of the deltas they have emitted, so
/// `reset` can send a compensating delta. The mirror saturates; emission of
/// the caller's raw delta is unaffected.
#[derive(Debug, Default)]
pub(crate) struct SaturatingAccumulator {
    cell: AtomicI64,
}

impl SaturatingAccumulator {
    pub(crate) fn new() -> Self {
        SaturatingAccumulator {
            cell: AtomicI64::new(0),
        }
    }

    /// Adds `amount`, retrying the compare-and-swap until no concurrent
    /// mutation interferes. Once the cell holds `i64::MAX` further adds are
    /// no-ops.
    pub(crate) fn add(&self, amount: i64) {
        let mut current = self.cell.load(Ordering::Acquire);
        loop {
            if current == i64::MAX {
                return;
            }
            let next = current.saturating_add(amount);
            match self
                .cell
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Atomically zeroes the cell, returning the value it held.
    pub(crate) fn take(&self) -> i64 {
        self.cell.swap(0, Ordering::AcqRel)
    }

    pub(crate) fn get(&self) -> i64 {
        self.cell.load(Ordering::Acquire)
    }
}
