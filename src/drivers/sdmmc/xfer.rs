//! Transfer descriptors and the host controller seam
//!
//! [`SdHost`] is the transfer primitive: it puts one command (and optionally
//! one data phase) on the bus and fills the response words. Everything above
//! it is controller independent.
//!
//! Response word layout filled by the host:
//! - short responses: word 0 holds the 32-bit card response, the low byte of
//!   word 1 holds the echoed command index (0x3F when the format has none)
//! - long responses: words 3..0 hold the 128 response bits, most significant
//!   word last, with the reserved 0x3F echo in the top byte of word 3

use super::completion::CompletionSignal;
use super::config::BusWidth;
use super::regs::{RSP_RESERVED_INDEX, ResponseFlags};
use crate::drivers::dma::DmaChannel;
use crate::error::SdError;

/// One command on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub index: u8,
    pub arg: u32,
    pub response: ResponseFlags,
    pub timeout_ms: u32,
}

impl Command {
    pub const fn new(index: u8, arg: u32, response: ResponseFlags, timeout_ms: u32) -> Self {
        Self {
            index,
            arg,
            response,
            timeout_ms,
        }
    }
}

/// Data moved by a transfer
#[derive(Debug)]
pub enum DataPhase<'b> {
    /// Card to memory
    Read(&'b mut [u8]),
    /// Memory to card
    Write(&'b [u8]),
}

impl DataPhase<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataPhase::Read(buf) => buf.len(),
            DataPhase::Write(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_read(&self) -> bool {
        matches!(self, DataPhase::Read(_))
    }
}

/// Transfer descriptor: a command, its optional data phase and the response
#[derive(Debug)]
pub struct Transfer<'b> {
    pub command: Command,
    pub data: Option<DataPhase<'b>>,
    pub data_timeout_ms: u32,
    pub response: [u32; 4],
}

impl<'b> Transfer<'b> {
    /// Command-only transfer
    pub fn command(command: Command) -> Self {
        Self {
            command,
            data: None,
            data_timeout_ms: 0,
            response: [0; 4],
        }
    }

    /// Command with a data phase
    pub fn with_data(command: Command, data: DataPhase<'b>, data_timeout_ms: u32) -> Self {
        Self {
            command,
            data: Some(data),
            data_timeout_ms,
            response: [0; 4],
        }
    }

    /// 32-bit payload of a short response
    pub fn short_response(&self) -> u32 {
        self.response[0]
    }

    /// Command index echoed in a short response
    pub fn echoed_index(&self) -> u8 {
        (self.response[1] & 0xFF) as u8
    }

    /// Top byte of a long response
    pub fn long_marker(&self) -> u8 {
        (self.response[3] >> 24) as u8
    }

    /// Check the short-response echo against `expected`
    pub fn expect_echo(&self, expected: u8) -> Result<(), SdError> {
        let echoed = self.echoed_index();
        if echoed == expected {
            Ok(())
        } else {
            log::error!(
                "SDMMC: CMD{} response echo mismatch (got {:#04x}, expected {:#04x})",
                self.command.index,
                echoed,
                expected
            );
            Err(SdError::Failure)
        }
    }

    /// Check the reserved marker of a long (R2) response
    pub fn expect_long_marker(&self) -> Result<(), SdError> {
        let marker = self.long_marker();
        if marker == RSP_RESERVED_INDEX {
            Ok(())
        } else {
            log::error!(
                "SDMMC: CMD{} long response marker mismatch: {:#04x}",
                self.command.index,
                marker
            );
            Err(SdError::Failure)
        }
    }
}

/// Bus parameters handed to the host at init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    pub bus_width: BusWidth,
    pub clock_hz: u32,
}

/// SD host controller transfer primitive
pub trait SdHost: Send {
    /// Bring up the controller
    fn init(&mut self, config: &HostConfig) -> Result<(), SdError>;

    /// Shut the controller down
    fn deinit(&mut self) -> Result<(), SdError>;

    /// Install (or remove) the handle the interrupt handler reports DMA
    /// completion through
    fn set_completion(&mut self, signal: Option<CompletionSignal>);

    /// Execute a command synchronously, polling for the response
    fn transfer_polling(&mut self, xfer: &mut Transfer<'_>) -> Result<(), SdError>;

    /// Start a DMA-backed data transfer on `channel`
    ///
    /// Returns once the command response is available. Data-phase completion
    /// is reported later through the installed [`CompletionSignal`], possibly
    /// from interrupt context.
    fn transfer_dma(&mut self, xfer: &mut Transfer<'_>, channel: DmaChannel)
    -> Result<(), SdError>;
}
