//! Retry and timeout policy
//!
//! All loop bounds and wait limits of the bring-up sequencer and the transfer
//! engine live here so tests can substitute a fast policy.

/// Bounds applied to bring-up retries and transfer waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts for the interface probe and the operating-conditions loop
    pub max_attempts: u8,
    /// First backoff delay while the card reports busy
    pub base_delay_ms: u32,
    /// Backoff ceiling
    pub max_delay_ms: u32,
    /// Wait for the DMA completion event
    pub completion_timeout_ms: u32,
    /// Overall deadline for the card to return to the transfer state
    pub ready_timeout_ms: u32,
    /// Per-command response timeout handed to the host
    pub command_timeout_ms: u32,
}

impl RetryPolicy {
    pub const DEFAULT: Self = Self {
        max_attempts: 24,
        base_delay_ms: 1,
        max_delay_ms: 256,
        completion_timeout_ms: 300,
        ready_timeout_ms: 300,
        command_timeout_ms: 10,
    };

    /// Backoff before retry number `attempt` (0-based): doubling, capped
    pub fn backoff_delay_ms(&self, attempt: u8) -> u32 {
        if attempt >= 32 {
            return self.max_delay_ms;
        }
        let delay = (self.base_delay_ms as u64) << attempt;
        delay.min(self.max_delay_ms as u64) as u32
    }

    /// Total sleep of the operating-conditions loop against a card that
    /// never leaves busy
    pub fn worst_case_backoff_ms(&self) -> u64 {
        (0..self.max_attempts)
            .map(|attempt| self.backoff_delay_ms(attempt) as u64)
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}
