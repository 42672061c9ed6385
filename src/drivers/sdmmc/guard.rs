//! Scoped resource ownership for transfers

use crate::drivers::dma::{DMA_WAIT_FOREVER, DmaAllocator, DmaChannel};
use crate::error::SdError;

/// A DMA channel leased for one transfer
///
/// The channel goes back to the allocator exactly once: either through
/// [`DmaLease::release`], which reports the outcome, or on drop.
pub struct DmaLease<'a> {
    dma: &'a dyn DmaAllocator,
    channel: DmaChannel,
    released: bool,
}

impl<'a> DmaLease<'a> {
    pub fn acquire(dma: &'a dyn DmaAllocator) -> Result<Self, SdError> {
        let channel = dma.request_channel().map_err(|e| {
            log::error!("SDMMC: DMA channel request failed: {:?}", e);
            SdError::NoDmaChannel
        })?;
        log::trace!("SDMMC: leased DMA channel {}", channel.0);
        Ok(Self {
            dma,
            channel,
            released: false,
        })
    }

    pub fn channel(&self) -> DmaChannel {
        self.channel
    }

    /// Hand the channel back, waiting for it to go idle
    pub fn release(mut self) -> Result<(), SdError> {
        self.released = true;
        self.dma.release_channel(self.channel, DMA_WAIT_FOREVER)
    }
}

impl Drop for DmaLease<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.dma.release_channel(self.channel, DMA_WAIT_FOREVER) {
            log::error!(
                "SDMMC: failed to release DMA channel {}: {:?}",
                self.channel.0,
                e
            );
        }
    }
}

/// Merge a cleanup result into the primary result
///
/// The first error wins; a cleanup failure behind a primary error is logged
/// and dropped.
pub fn first_error(
    primary: Result<(), SdError>,
    cleanup: Result<(), SdError>,
    what: &str,
) -> Result<(), SdError> {
    match (primary, cleanup) {
        (Err(e), Err(secondary)) => {
            log::warn!("SDMMC: {} also failed: {:?}", what, secondary);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), cleanup) => {
            if let Err(e) = cleanup {
                log::error!("SDMMC: {} failed: {:?}", what, e);
            }
            cleanup
        }
    }
}
