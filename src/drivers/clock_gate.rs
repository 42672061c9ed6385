//! Clock gate control
//!
//! The SD host controller's clock domain has to be ungated before any register
//! access and gated again on teardown.

use crate::error::SdError;

/// Identifier of a gated clock domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockGateId(pub u32);

/// SDIO master clock gate
pub const SDIO_MASTER_GATE: ClockGateId = ClockGateId(1 << 11);

/// Clock-gate controller
pub trait ClockGate: Sync {
    fn enable(&self, gate: ClockGateId) -> Result<(), SdError>;
    fn disable(&self, gate: ClockGateId) -> Result<(), SdError>;
}
