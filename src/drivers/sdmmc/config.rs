//! Per-device hardware configuration

use heapless::Vec;

use super::policy::RetryPolicy;
use super::regs::{BUS_WIDTH_ARG_1BIT, BUS_WIDTH_ARG_4BIT};
use super::xfer::HostConfig;
use crate::drivers::clock_gate::{ClockGateId, SDIO_MASTER_GATE};
use crate::drivers::pinmux::PinConfig;
use crate::error::SdError;

/// Maximum number of pins routed to one SD host
pub const MAX_SD_PINS: usize = 8;

/// Default bus clock (25 MHz)
pub const DEFAULT_CLOCK_HZ: u32 = 25_000_000;

/// Data bus width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    One,
    Four,
}

impl BusWidth {
    /// ACMD6 argument selecting this width
    pub fn acmd6_arg(self) -> u32 {
        match self {
            BusWidth::One => BUS_WIDTH_ARG_1BIT,
            BusWidth::Four => BUS_WIDTH_ARG_4BIT,
        }
    }
}

/// Hardware description of one SD device
#[derive(Debug, Clone)]
pub struct SdmmcConfig {
    pub name: &'static str,
    pub clock_gate: ClockGateId,
    pub bus_width: BusWidth,
    pub clock_hz: u32,
    pub pins: Vec<PinConfig, MAX_SD_PINS>,
    pub policy: RetryPolicy,
}

impl SdmmcConfig {
    /// Configuration with the board defaults: 4-bit bus at 25 MHz, no pins
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            clock_gate: SDIO_MASTER_GATE,
            bus_width: BusWidth::Four,
            clock_hz: DEFAULT_CLOCK_HZ,
            pins: Vec::new(),
            policy: RetryPolicy::DEFAULT,
        }
    }

    pub fn with_bus_width(mut self, bus_width: BusWidth) -> Self {
        self.bus_width = bus_width;
        self
    }

    pub fn with_clock_hz(mut self, clock_hz: u32) -> Self {
        self.clock_hz = clock_hz;
        self
    }

    pub fn with_clock_gate(mut self, gate: ClockGateId) -> Self {
        self.clock_gate = gate;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the pin routing table
    pub fn with_pins(mut self, pins: &[PinConfig]) -> Result<Self, SdError> {
        self.pins = Vec::from_slice(pins).map_err(|_| SdError::InvalidParameter)?;
        Ok(self)
    }

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            bus_width: self.bus_width,
            clock_hz: self.clock_hz,
        }
    }
}
