//! DMA channel allocation
//!
//! Channels are leased per transfer from a pool shared by every device on the
//! SoC. [`ChannelPool`] is a lock-free pool usable directly as the allocator.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::error::SdError;

/// Maximum number of channels a [`ChannelPool`] can track
pub const MAX_DMA_CHANNELS: u8 = 32;

/// Wait passed to [`DmaAllocator::release_channel`] meaning "no limit"
pub const DMA_WAIT_FOREVER: u32 = u32::MAX;

/// A leased DMA channel number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaChannel(pub u8);

/// DMA channel allocator shared across devices
pub trait DmaAllocator: Sync {
    /// Lease a free channel without waiting
    fn request_channel(&self) -> Result<DmaChannel, SdError>;

    /// Return a leased channel, waiting at most `wait_ms` for it to go idle
    fn release_channel(&self, channel: DmaChannel, wait_ms: u32) -> Result<(), SdError>;
}

/// Bitmask-backed channel pool
pub struct ChannelPool {
    in_use: AtomicU32,
    channels: u8,
}

impl ChannelPool {
    /// Create a pool of `channels` channels (clamped to [`MAX_DMA_CHANNELS`])
    pub const fn new(channels: u8) -> Self {
        let channels = if channels > MAX_DMA_CHANNELS {
            MAX_DMA_CHANNELS
        } else {
            channels
        };
        Self {
            in_use: AtomicU32::new(0),
            channels,
        }
    }

    /// Number of channels currently leased
    pub fn leased(&self) -> u32 {
        self.in_use.load(Ordering::Acquire).count_ones()
    }

    fn mask(&self) -> u32 {
        if self.channels == MAX_DMA_CHANNELS {
            u32::MAX
        } else {
            (1u32 << self.channels) - 1
        }
    }
}

impl DmaAllocator for ChannelPool {
    fn request_channel(&self) -> Result<DmaChannel, SdError> {
        let mut current = self.in_use.load(Ordering::Acquire);
        loop {
            let free = !current & self.mask();
            if free == 0 {
                return Err(SdError::NoDmaChannel);
            }
            let bit = free.trailing_zeros();
            match self.in_use.compare_exchange_weak(
                current,
                current | (1 << bit),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(DmaChannel(bit as u8)),
                Err(actual) => current = actual,
            }
        }
    }

    fn release_channel(&self, channel: DmaChannel, _wait_ms: u32) -> Result<(), SdError> {
        if channel.0 >= self.channels {
            return Err(SdError::InvalidParameter);
        }
        let bit = 1u32 << channel.0;
        let previous = self.in_use.fetch_and(!bit, Ordering::AcqRel);
        if previous & bit == 0 {
            log::warn!("DMA: channel {} released twice", channel.0);
            return Err(SdError::Failure);
        }
        Ok(())
    }
}
