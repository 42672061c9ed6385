//! Block transfer engine
//!
//! Every request runs under the device mutex: range check, DMA lease,
//! command issue, completion wait, optional CMD12 and the CMD13 ready poll.
//! Requests are never retried here.

use super::card::{CardBus, CardState};
use super::guard::{DmaLease, first_error};
use super::regs::*;
use super::xfer::{Command, DataPhase, SdHost, Transfer};
use super::{DeviceContext, Inner, SdmmcDevice};
use crate::error::SdError;
use crate::time::Timeout;

/// Validate the request shape and return the byte length it covers
fn request_len(buf_len: usize, count: u32) -> Result<usize, SdError> {
    if count == 0 || count > MAX_BLOCKS_PER_TRANSFER {
        log::error!("SDMMC: invalid block count {}", count);
        return Err(SdError::InvalidParameter);
    }
    let len = count as usize * SD_BLOCK_SIZE as usize;
    if buf_len < len {
        log::error!("SDMMC: buffer of {} bytes too small for {} blocks", buf_len, count);
        return Err(SdError::InvalidParameter);
    }
    Ok(len)
}

impl<H: SdHost> SdmmcDevice<'_, H> {
    /// Read `count` blocks starting at `start_block` into `buf`
    pub fn read_blocks(&self, buf: &mut [u8], start_block: u32, count: u32) -> Result<(), SdError> {
        let len = request_len(buf.len(), count)?;
        self.transfer(DataPhase::Read(&mut buf[..len]), start_block, count)
    }

    /// Write `count` blocks from `buf` starting at `start_block`
    pub fn write_blocks(&self, buf: &[u8], start_block: u32, count: u32) -> Result<(), SdError> {
        let len = request_len(buf.len(), count)?;
        self.transfer(DataPhase::Write(&buf[..len]), start_block, count)
    }

    fn transfer(&self, data: DataPhase<'_>, start_block: u32, count: u32) -> Result<(), SdError> {
        let mut inner = self.inner.lock();
        let Inner { host, ctx } = &mut *inner;
        let ctx = ctx.as_ref().ok_or(SdError::NotInitialized)?;

        if !ctx.card.contains(start_block, count) {
            log::error!(
                "SDMMC: blocks {}..{} beyond end of card ({} blocks)",
                start_block,
                start_block as u64 + count as u64,
                ctx.card.block_count()
            );
            return Err(SdError::InvalidParameter);
        }
        let arg = ctx.card.block_argument(start_block)?;

        let index = match (data.is_read(), count > 1) {
            (true, false) => MMC_CMD_READ_SINGLE_BLOCK,
            (true, true) => MMC_CMD_READ_MULTIPLE_BLOCK,
            (false, false) => MMC_CMD_WRITE_SINGLE_BLOCK,
            (false, true) => MMC_CMD_WRITE_MULTIPLE_BLOCK,
        };
        log::debug!("SDMMC: CMD{} block={} count={}", index, start_block, count);

        let policy = &self.config.policy;
        let lease = DmaLease::acquire(self.env.dma)?;
        ctx.completion.arm();

        let mut xfer = Transfer::with_data(
            Command::new(index, arg, MMC_RSP_R1, policy.command_timeout_ms),
            data,
            policy.completion_timeout_ms,
        );
        let issued = host
            .transfer_dma(&mut xfer, lease.channel())
            .inspect_err(|e| log::error!("SDMMC: CMD{} transfer error: {:?}", index, e))
            .and_then(|()| xfer.expect_echo(index));

        let result = match issued {
            Ok(()) => self.wait_ready(host, ctx, count),
            Err(e) => {
                ctx.completion.reset();
                Err(e)
            }
        };
        first_error(result, lease.release(), "DMA channel release")
    }

    /// Wait for the data phase, stop a multi-block transfer and poll the card
    /// back to the transfer state
    fn wait_ready(&self, host: &mut H, ctx: &DeviceContext, count: u32) -> Result<(), SdError> {
        let policy = &self.config.policy;
        let clock = self.env.clock;

        let mut result = ctx
            .completion
            .wait(clock, policy.completion_timeout_ms)
            .map(|_| ());

        let mut bus = CardBus::new(host, clock, policy);
        if count > 1 {
            result = first_error(result, bus.stop_transmission(), "CMD12");
        }

        if result.is_ok() {
            let deadline = Timeout::from_ms(clock, policy.ready_timeout_ms as u64);
            result = Self::poll_transfer_state(&mut bus, ctx.card.rca, deadline);
        }

        ctx.completion.reset();
        result
    }

    fn poll_transfer_state(
        bus: &mut CardBus<'_, H>,
        rca: u32,
        timeout: Timeout<'_>,
    ) -> Result<(), SdError> {
        loop {
            let status = bus.send_status(rca)?;
            if status.is_error() {
                log::error!("SDMMC: card reports error, status={:#010x}", status.raw());
                return Err(SdError::Failure);
            }
            if status.state() == Some(CardState::Transfer) {
                return Ok(());
            }
            if timeout.is_expired() {
                log::error!("SDMMC: waiting for transfer state timed out");
                return Err(SdError::Timeout);
            }
            bus.relax();
        }
    }
}
