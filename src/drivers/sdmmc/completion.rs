//! DMA completion handoff
//!
//! The host's interrupt handler is the only producer: it records the
//! completion kind in an atomic slot and releases a counting semaphore. The
//! thread that issued the transfer is the only consumer and waits on the
//! semaphore with a bounded timeout. Nothing on the producer side blocks.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::error::SdError;
use crate::time::{Clock, Timeout};

/// Empty event slot
const EVENT_NONE: u8 = 0xFF;

/// Completion kind reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum XferEvent {
    ReadDone = 0x01,
    ReadError = 0x02,
    WriteDone = 0x03,
    WriteError = 0x04,
}

impl XferEvent {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(XferEvent::ReadDone),
            0x02 => Some(XferEvent::ReadError),
            0x03 => Some(XferEvent::WriteDone),
            0x04 => Some(XferEvent::WriteError),
            _ => None,
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, XferEvent::ReadError | XferEvent::WriteError)
    }
}

/// Synchronizer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Waiting = 1,
    Done = 2,
    Error = 3,
}

impl SyncState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SyncState::Waiting,
            2 => SyncState::Done,
            3 => SyncState::Error,
            _ => SyncState::Idle,
        }
    }
}

/// Counting semaphore safe to release from interrupt context
pub struct Semaphore {
    permits: AtomicU32,
}

impl Semaphore {
    pub const fn new(permits: u32) -> Self {
        Self {
            permits: AtomicU32::new(permits),
        }
    }

    /// Add one permit. Never blocks.
    pub fn release(&self) {
        self.permits.fetch_add(1, Ordering::Release);
    }

    /// Take a permit if one is available
    pub fn try_acquire(&self) -> bool {
        self.permits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Take a permit, giving up after `timeout_ms`
    pub fn acquire(&self, clock: &dyn Clock, timeout_ms: u32) -> bool {
        let timeout = Timeout::from_ms(clock, timeout_ms as u64);
        loop {
            if self.try_acquire() {
                return true;
            }
            if timeout.is_expired() {
                return false;
            }
            clock.relax();
        }
    }

    /// Drop every pending permit, returning how many there were
    pub fn drain(&self) -> u32 {
        self.permits.swap(0, Ordering::AcqRel)
    }

    pub fn available(&self) -> u32 {
        self.permits.load(Ordering::Acquire)
    }
}

/// Event slot plus semaphore for one device
pub struct Completion {
    event: AtomicU8,
    state: AtomicU8,
    sem: Semaphore,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion {
    pub const fn new() -> Self {
        Self {
            event: AtomicU8::new(EVENT_NONE),
            state: AtomicU8::new(SyncState::Idle as u8),
            sem: Semaphore::new(0),
        }
    }

    pub fn state(&self) -> SyncState {
        SyncState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Event currently recorded in the slot
    pub fn event(&self) -> Option<XferEvent> {
        XferEvent::from_raw(self.event.load(Ordering::Acquire))
    }

    /// Prepare for a new transfer
    ///
    /// A late interrupt from an earlier, timed-out transfer may have left a
    /// permit behind; it must not satisfy the next wait. The drain repeats
    /// until no permit slipped in between the drain and the slot reset.
    pub fn arm(&self) {
        loop {
            let stale = self.sem.drain();
            if stale != 0 {
                log::warn!("SDMMC: dropping {} stale completion event(s)", stale);
            }
            self.event.store(EVENT_NONE, Ordering::Release);
            self.state.store(SyncState::Waiting as u8, Ordering::Release);
            if self.sem.available() == 0 {
                break;
            }
        }
    }

    /// Producer side, callable from interrupt context
    pub fn notify(&self, event: XferEvent) {
        self.event.store(event as u8, Ordering::Release);
        let state = if event.is_error() {
            SyncState::Error
        } else {
            SyncState::Done
        };
        self.state.store(state as u8, Ordering::Release);
        self.sem.release();
    }

    /// Consumer side: wait up to `timeout_ms` for the data phase to finish
    pub fn wait(&self, clock: &dyn Clock, timeout_ms: u32) -> Result<XferEvent, SdError> {
        if !self.sem.acquire(clock, timeout_ms) {
            log::error!("SDMMC: no completion event within {} ms", timeout_ms);
            return Err(SdError::Timeout);
        }
        match (self.state(), self.event()) {
            (SyncState::Error, event) => {
                log::error!("SDMMC: transfer reported {:?}", event);
                Err(SdError::Failure)
            }
            (SyncState::Done, Some(event)) if !event.is_error() => Ok(event),
            (state, event) => {
                log::error!(
                    "SDMMC: completion signalled in state {:?} with event {:?}",
                    state,
                    event
                );
                Err(SdError::Failure)
            }
        }
    }

    /// Return the slot to its empty sentinel
    pub fn reset(&self) {
        self.event.store(EVENT_NONE, Ordering::Release);
        self.state.store(SyncState::Idle as u8, Ordering::Release);
    }
}

/// Handle given to the host so its interrupt handler can report completion
#[derive(Clone)]
pub struct CompletionSignal(Arc<Completion>);

impl CompletionSignal {
    pub fn new(completion: Arc<Completion>) -> Self {
        Self(completion)
    }

    /// Record `event` and wake the waiting thread
    pub fn notify(&self, event: XferEvent) {
        self.0.notify(event);
    }
}
