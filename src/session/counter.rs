//! Message-counter management: outbound allocation and replay protection.

use crate::core::{SecurityError, REPLAY_WINDOW_SIZE};

/// Outbound message-counter allocator.
///
/// Starts at a random value to frustrate cross-reboot replays; wraps at
/// `2^32 - 1 → 0`.
#[derive(Debug, Clone)]
pub struct OutboundCounter {
    next: u32,
}

impl OutboundCounter {
    /// New allocator with a random starting counter.
    pub fn new() -> Self {
        Self { next: rand::random() }
    }

    /// New allocator with a fixed starting counter (tests, resumption).
    pub fn starting_at(value: u32) -> Self {
        Self { next: value }
    }

    /// Allocate the next counter.
    pub fn next(&mut self) -> u32 {
        let counter = self.next;
        self.next = self.next.wrapping_add(1);
        counter
    }
}

impl Default for OutboundCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding replay window over a peer's 32-bit message counters.
///
/// Tracks the highest counter seen plus a 32-bit bitmap of the positions
/// behind it. Bit `d` set means counter `max_seen - d` was seen.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    max_seen: u32,
    bitmap: u32,
    initialized: bool,
}

impl ReplayWindow {
    /// Fresh window; the first counter observed initializes it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a received counter and record it.
    ///
    /// - strictly greater than the max → accepted, window shifts
    /// - equal to the max or a seen position → `Duplicate`
    /// - `max - counter >= 32` → `TooOld`
    pub fn check_and_update(&mut self, counter: u32) -> Result<(), SecurityError> {
        if !self.initialized {
            self.max_seen = counter;
            self.bitmap = 1;
            self.initialized = true;
            return Ok(());
        }

        if counter > self.max_seen {
            let shift = counter - self.max_seen;
            self.bitmap = if shift >= REPLAY_WINDOW_SIZE {
                0
            } else {
                self.bitmap << shift
            };
            self.bitmap |= 1;
            self.max_seen = counter;
            return Ok(());
        }

        let diff = self.max_seen - counter;
        if diff >= REPLAY_WINDOW_SIZE {
            return Err(SecurityError::TooOld);
        }
        let bit = 1u32 << diff;
        if self.bitmap & bit != 0 {
            return Err(SecurityError::Duplicate);
        }
        self.bitmap |= bit;
        Ok(())
    }

    /// Highest counter accepted so far.
    pub fn max_seen(&self) -> u32 {
        self.max_seen
    }
}
