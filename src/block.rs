//! Block device interface
//!
//! The operation table callers see. A device is reached through
//! `&dyn BlockDevice`, so the transport behind it is fixed when the device is
//! constructed.

use crate::drivers::sdmmc::{CardInfo, SdHost, SdmmcDevice};
use crate::error::SdError;

pub trait BlockDevice: Sync {
    /// Name the device is registered under
    fn name(&self) -> &'static str;

    fn is_initialized(&self) -> bool;

    fn init(&self) -> Result<(), SdError>;

    fn deinit(&self) -> Result<(), SdError>;

    fn read_blocks(&self, buf: &mut [u8], start_block: u32, count: u32) -> Result<(), SdError>;

    fn write_blocks(&self, buf: &[u8], start_block: u32, count: u32) -> Result<(), SdError>;

    fn card_info(&self) -> Result<CardInfo, SdError>;
}

impl<H: SdHost> BlockDevice for SdmmcDevice<'_, H> {
    fn name(&self) -> &'static str {
        SdmmcDevice::name(self)
    }

    fn is_initialized(&self) -> bool {
        SdmmcDevice::is_initialized(self)
    }

    fn init(&self) -> Result<(), SdError> {
        SdmmcDevice::init(self)
    }

    fn deinit(&self) -> Result<(), SdError> {
        SdmmcDevice::deinit(self)
    }

    fn read_blocks(&self, buf: &mut [u8], start_block: u32, count: u32) -> Result<(), SdError> {
        SdmmcDevice::read_blocks(self, buf, start_block, count)
    }

    fn write_blocks(&self, buf: &[u8], start_block: u32, count: u32) -> Result<(), SdError> {
        SdmmcDevice::write_blocks(self, buf, start_block, count)
    }

    fn card_info(&self) -> Result<CardInfo, SdError> {
        SdmmcDevice::card_info(self)
    }
}
