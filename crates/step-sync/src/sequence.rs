//! Call-id allocation: a monotonically advancing counter over `[1, 60000]`
//! that wraps back to 1. Occupancy (whether the allocated id already has a
//! pending waiter) is checked by the caller against a [`crate::PendingRegistry`]
//! — this type only hands out the next number in sequence, mirroring the
//! original `rpcSerial` field.

use std::sync::atomic::{AtomicU16, Ordering};

pub struct CallIdAllocator {
    current: AtomicU16,
}

impl CallIdAllocator {
    pub const MAX_CONCURRENT: u16 = 60_000;

    pub fn new() -> Self {
        Self { current: AtomicU16::new(0) }
    }

    /// Returns the next call id in `[1, MAX_CONCURRENT]`, wrapping back to 1
    /// after `MAX_CONCURRENT`.
    pub fn next(&self) -> u16 {
        loop {
            let cur = self.current.load(Ordering::SeqCst);
            let next = if cur >= Self::MAX_CONCURRENT { 1 } else { cur + 1 };
            if self
                .current
                .compare_exchange(cur, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }
}

impl Default for CallIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_id_is_one() {
        let allocator = CallIdAllocator::new();
        assert_eq!(allocator.next(), 1);
    }

    #[test]
    fn wraps_back_to_one_after_max_concurrent() {
        let allocator = CallIdAllocator::new();
        for expected in 1..=CallIdAllocator::MAX_CONCURRENT {
            assert_eq!(allocator.next(), expected);
        }
        assert_eq!(allocator.next(), 1);
    }
}
