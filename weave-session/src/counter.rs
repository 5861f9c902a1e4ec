//! Message counters.
//!
//! Outbound: strictly monotonic per session, starting at 1. Inbound: a
//! sliding anti-replay window over the peer's counters. The window is a
//! `(max, bitmap)` pair where bitmap bit `i` records that counter value
//! `max - i` has been seen; it starts *synchronizing* and latches onto the
//! first accepted message.

use weave_core::config::MESSAGE_COUNTER_WINDOW_SIZE;

// The window must fit in the bitmap.
const _: () = assert!(MESSAGE_COUNTER_WINDOW_SIZE <= u32::BITS);

/// Why an inbound counter was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterRejection {
    /// Inside the window with its bit already set, or equal to the maximum.
    Duplicate,
    /// Behind the window entirely; nothing can be said about freshness.
    TooOld,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    max: u32,
    bitmap: u32,
}

/// Sliding-window replay protection for one peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerMessageCounter {
    window: Option<Window>,
}

impl PeerMessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first inbound message establishes the window.
    pub fn is_synchronizing(&self) -> bool {
        self.window.is_none()
    }

    /// Check `counter` against the window without mutating it.
    pub fn verify(&self, counter: u32) -> Result<(), CounterRejection> {
        let Some(window) = self.window else {
            return Ok(());
        };
        if counter > window.max {
            return Ok(());
        }
        if counter == window.max {
            return Err(CounterRejection::Duplicate);
        }
        let offset = window.max - counter;
        if offset >= MESSAGE_COUNTER_WINDOW_SIZE {
            return Err(CounterRejection::TooOld);
        }
        if window.bitmap & (1 << offset) != 0 {
            return Err(CounterRejection::Duplicate);
        }
        Ok(())
    }

    /// Record `counter` as seen. Call only after `verify` accepted it.
    pub fn commit(&mut self, counter: u32) {
        match &mut self.window {
            None => {
                self.window = Some(Window {
                    max: counter,
                    bitmap: 1,
                });
            }
            Some(window) => {
                if counter > window.max {
                    let shift = counter - window.max;
                    window.bitmap = if shift >= u32::BITS {
                        0
                    } else {
                        window.bitmap << shift
                    };
                    window.bitmap |= 1;
                    window.max = counter;
                } else {
                    window.bitmap |= 1 << (window.max - counter);
                }
            }
        }
    }

    /// Verify and, on success, commit in one step.
    pub fn verify_and_commit(&mut self, counter: u32) -> Result<(), CounterRejection> {
        self.verify(counter)?;
        self.commit(counter);
        Ok(())
    }

    /// Test hook: force `max` to `value` and forget everything seen.
    pub fn set_counter(&mut self, value: u32) {
        self.window = Some(Window {
            max: value,
            bitmap: 0,
        });
    }
}

/// Strictly monotonic outbound counter, starting at 1.
#[derive(Debug, Clone, Copy)]
pub struct OutboundCounter {
    next: u32,
}

impl OutboundCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Value the next prepared message will carry.
    pub fn peek(&self) -> u32 {
        self.next
    }

    /// Consume and return the next counter. `None` once the 32-bit space is
    /// exhausted; the session must be retired rather than wrap.
    pub fn advance(&mut self) -> Option<u32> {
        if self.next == u32::MAX {
            return None;
        }
        let value = self.next;
        self.next += 1;
        Some(value)
    }
}

impl Default for OutboundCounter {
    fn default() -> Self {
        Self::new()
    }
}
