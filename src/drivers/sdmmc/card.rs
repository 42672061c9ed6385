//! Card bring-up, identification and bus configuration
//!
//! [`CardBus`] borrows the host for the duration of one command sequence and
//! issues every command through [`SdHost::transfer_polling`]. The public entry
//! point is [`CardBus::bring_up`], which walks an SD card from power-on to the
//! transfer state and returns its [`CardInfo`].

use tock_registers::LocalRegisterCopy;

use super::config::BusWidth;
use super::csd::{Csd, CsdVersion};
use super::policy::RetryPolicy;
use super::regs::*;
use super::xfer::{Command, SdHost, Transfer};
use crate::error::SdError;
use crate::time::Clock;

/// Card family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    /// Card that never answered the interface probe (SD 1.x)
    Sd,
    /// Standard capacity
    Sdsc,
    /// High or extended capacity
    Sdhc,
}

/// Immutable description of an initialized card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardInfo {
    /// Capacity in bytes
    pub capacity: u64,
    /// Transfer block size in bytes
    pub block_size: u32,
    pub csd_version: CsdVersion,
    pub card_type: CardType,
    /// Relative card address published by CMD3
    pub rca: u32,
}

impl CardInfo {
    /// Number of addressable blocks
    pub fn block_count(&self) -> u64 {
        self.capacity / self.block_size as u64
    }

    /// Whether `[start, start + count)` lies inside the card
    pub fn contains(&self, start: u32, count: u32) -> bool {
        start as u64 + count as u64 <= self.block_count()
    }

    /// Command argument addressing block `start`
    ///
    /// Version 1 cards take byte addresses, version 2 cards block numbers.
    pub fn block_argument(&self, start: u32) -> Result<u32, SdError> {
        match self.csd_version {
            CsdVersion::V1 => start
                .checked_mul(self.block_size)
                .ok_or(SdError::InvalidParameter),
            CsdVersion::V2 => Ok(start),
        }
    }
}

/// Position of the card state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Idle,
    Ready,
    Ident,
    Standby,
    Transfer,
    Data,
    Receive,
    Program,
    Disconnect,
}

/// Decoded R1 card status
#[derive(Clone, Copy)]
pub struct CardStatus(LocalRegisterCopy<u32, CARD_STATUS::Register>);

impl CardStatus {
    pub fn new(raw: u32) -> Self {
        Self(LocalRegisterCopy::new(raw))
    }

    pub fn raw(&self) -> u32 {
        self.0.get()
    }

    pub fn state(&self) -> Option<CardState> {
        match self.0.read(CARD_STATUS::CURRENT_STATE) {
            0 => Some(CardState::Idle),
            1 => Some(CardState::Ready),
            2 => Some(CardState::Ident),
            3 => Some(CardState::Standby),
            4 => Some(CardState::Transfer),
            5 => Some(CardState::Data),
            6 => Some(CardState::Receive),
            7 => Some(CardState::Program),
            8 => Some(CardState::Disconnect),
            _ => None,
        }
    }

    /// General error bit
    pub fn is_error(&self) -> bool {
        self.0.is_set(CARD_STATUS::ERROR)
    }

    pub fn is_ready_for_data(&self) -> bool {
        self.0.is_set(CARD_STATUS::READY_FOR_DATA)
    }
}

impl core::fmt::Debug for CardStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CardStatus")
            .field("raw", &format_args!("{:#010x}", self.raw()))
            .field("state", &self.state())
            .field("error", &self.is_error())
            .finish()
    }
}

/// Command sequencer bound to one host
pub struct CardBus<'a, H: SdHost> {
    host: &'a mut H,
    clock: &'a dyn Clock,
    policy: &'a RetryPolicy,
}

impl<'a, H: SdHost> CardBus<'a, H> {
    pub fn new(host: &'a mut H, clock: &'a dyn Clock, policy: &'a RetryPolicy) -> Self {
        Self {
            host,
            clock,
            policy,
        }
    }

    /// Back off between status polls
    pub fn relax(&self) {
        self.clock.relax();
    }

    /// Issue one command and hand back the filled descriptor
    fn command(
        &mut self,
        index: u8,
        arg: u32,
        response: ResponseFlags,
    ) -> Result<Transfer<'static>, SdError> {
        let mut xfer = Transfer::command(Command::new(
            index,
            arg,
            response,
            self.policy.command_timeout_ms,
        ));
        self.host.transfer_polling(&mut xfer).inspect_err(|e| {
            log::debug!("SDMMC: CMD{} failed: {:?}", index, e);
        })?;
        log::trace!(
            "SDMMC: CMD{} resp: {:08x} {:08x} {:08x} {:08x}",
            index,
            xfer.response[0],
            xfer.response[1],
            xfer.response[2],
            xfer.response[3]
        );
        Ok(xfer)
    }

    /// CMD0 + CMD8, retried together
    ///
    /// Returns `true` once the card echoes the check pattern (SD 2.0+), or
    /// `false` when every attempt failed.
    pub fn probe_interface(&mut self) -> bool {
        for attempt in 0..self.policy.max_attempts {
            log::debug!("SDMMC: Sending CMD0 (GO_IDLE_STATE), attempt {}", attempt);
            if self.command(MMC_CMD_GO_IDLE_STATE, 0, MMC_RSP_NONE).is_err() {
                continue;
            }

            log::debug!("SDMMC: Sending CMD8 (SEND_IF_COND)");
            let Ok(xfer) = self.command(SD_CMD_SEND_IF_COND, IF_COND_ARG, MMC_RSP_R7) else {
                continue;
            };
            let r7 = LocalRegisterCopy::<u32, IF_COND::Register>::new(xfer.short_response());
            if r7.read(IF_COND::CHECK_PATTERN) == IF_COND_CHECK_PATTERN
                && r7.read(IF_COND::VHS) == IF_COND_VHS_27_36
                && xfer.echoed_index() == SD_CMD_SEND_IF_COND
            {
                log::debug!("SDMMC: SD 2.0+ card detected");
                return true;
            }
            log::debug!("SDMMC: CMD8 response mismatch: {:#x}", r7.get());
        }
        false
    }

    /// CMD55 + ACMD41 until the card leaves busy
    ///
    /// Returns the OCR of the first ready response.
    pub fn negotiate_operating_conditions(&mut self) -> Result<u32, SdError> {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            let app = match self.command(MMC_CMD_APP_CMD, 0, MMC_RSP_R1) {
                Ok(xfer) => xfer,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            if app.echoed_index() != MMC_CMD_APP_CMD {
                log::debug!("SDMMC: CMD55 echo mismatch: {:#x}", app.echoed_index());
                continue;
            }

            let op = match self.command(SD_CMD_APP_SEND_OP_COND, OP_COND_ARG, MMC_RSP_R3) {
                Ok(xfer) => xfer,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };
            if op.echoed_index() != RSP_RESERVED_INDEX {
                log::debug!("SDMMC: ACMD41 echo mismatch: {:#x}", op.echoed_index());
                continue;
            }

            let ocr = LocalRegisterCopy::<u32, OCR::Register>::new(op.short_response());
            if ocr.is_set(OCR::POWER_UP) {
                log::debug!("SDMMC: Card ready, OCR={:#010x}", ocr.get());
                return Ok(ocr.get());
            }

            let delay = self.policy.backoff_delay_ms(attempt);
            log::debug!("SDMMC: Card busy, retrying in {} ms", delay);
            self.clock.delay_ms(delay);
        }

        log::error!("SDMMC: Card initialization timeout");
        Err(last_error.unwrap_or(SdError::Failure))
    }

    /// CMD2 + CMD3, returning the published RCA
    pub fn identify(&mut self) -> Result<u32, SdError> {
        log::debug!("SDMMC: Sending CMD2 (ALL_SEND_CID)");
        let cid = self.command(MMC_CMD_ALL_SEND_CID, 0, MMC_RSP_R2)?;
        cid.expect_long_marker()?;

        log::debug!("SDMMC: Sending CMD3 (SEND_RELATIVE_ADDR)");
        let xfer = self.command(SD_CMD_SEND_RELATIVE_ADDR, 0, MMC_RSP_R6)?;
        xfer.expect_echo(SD_CMD_SEND_RELATIVE_ADDR)?;

        let rca = LocalRegisterCopy::<u32, RCA_RESPONSE::Register>::new(xfer.short_response())
            .read(RCA_RESPONSE::RCA);
        log::debug!("SDMMC: RCA={:#06x}", rca);
        Ok(rca)
    }

    /// CMD9
    pub fn read_csd(&mut self, rca: u32) -> Result<Csd, SdError> {
        log::debug!("SDMMC: Sending CMD9 (SEND_CSD)");
        let xfer = self.command(MMC_CMD_SEND_CSD, rca << 16, MMC_RSP_R2)?;
        xfer.expect_long_marker()?;
        Ok(Csd::from_response(&xfer.response))
    }

    /// CMD13
    pub fn send_status(&mut self, rca: u32) -> Result<CardStatus, SdError> {
        let xfer = self.command(MMC_CMD_SEND_STATUS, rca << 16, MMC_RSP_R1)?;
        xfer.expect_echo(MMC_CMD_SEND_STATUS)?;
        let status = CardStatus::new(xfer.short_response());
        log::trace!("SDMMC: {:?}", status);
        Ok(status)
    }

    /// CMD7
    pub fn select_card(&mut self, rca: u32) -> Result<(), SdError> {
        log::debug!("SDMMC: Sending CMD7 (SELECT_CARD)");
        self.command(MMC_CMD_SELECT_CARD, rca << 16, MMC_RSP_R1B)?
            .expect_echo(MMC_CMD_SELECT_CARD)
    }

    /// CMD55 + ACMD6
    pub fn set_bus_width(&mut self, rca: u32, width: BusWidth) -> Result<(), SdError> {
        log::debug!("SDMMC: Switching to {:?}-bit bus", width);
        self.command(MMC_CMD_APP_CMD, rca << 16, MMC_RSP_R1)?
            .expect_echo(MMC_CMD_APP_CMD)?;
        self.command(SD_CMD_APP_SET_BUS_WIDTH, width.acmd6_arg(), MMC_RSP_R1)?
            .expect_echo(SD_CMD_APP_SET_BUS_WIDTH)
    }

    /// CMD16
    pub fn set_block_len(&mut self, block_len: u32) -> Result<(), SdError> {
        log::debug!("SDMMC: Sending CMD16 (SET_BLOCKLEN {})", block_len);
        self.command(MMC_CMD_SET_BLOCKLEN, block_len, MMC_RSP_R1)?
            .expect_echo(MMC_CMD_SET_BLOCKLEN)
    }

    /// CMD12
    pub fn stop_transmission(&mut self) -> Result<(), SdError> {
        log::debug!("SDMMC: Sending CMD12 (STOP_TRANSMISSION)");
        self.command(MMC_CMD_STOP_TRANSMISSION, 0, MMC_RSP_R1B)?
            .expect_echo(MMC_CMD_STOP_TRANSMISSION)
    }

    /// Take a freshly powered card to the transfer state
    pub fn bring_up(&mut self, width: BusWidth) -> Result<CardInfo, SdError> {
        let legacy = !self.probe_interface();
        if legacy {
            log::info!("SDMMC: No answer to CMD8, treating card as SD 1.x");
        }

        let ocr = LocalRegisterCopy::<u32, OCR::Register>::new(
            self.negotiate_operating_conditions()?,
        );
        let card_type = if legacy {
            CardType::Sd
        } else if ocr.is_set(OCR::CCS) {
            CardType::Sdhc
        } else {
            CardType::Sdsc
        };

        let rca = self.identify()?;
        let csd = self.read_csd(rca)?;
        self.send_status(rca)?;
        self.select_card(rca)?;
        self.set_bus_width(rca, width)?;
        self.set_block_len(SD_BLOCK_SIZE)?;

        let info = CardInfo {
            capacity: csd.capacity_bytes(),
            block_size: csd.block_size(),
            csd_version: csd.version(),
            card_type,
            rca,
        };
        log::info!(
            "SDMMC: Card initialized: {:?}, CSD {:?}, {} blocks x {} bytes = {} MB",
            info.card_type,
            info.csd_version,
            info.block_count(),
            info.block_size,
            info.capacity / (1024 * 1024)
        );
        Ok(info)
    }
}
