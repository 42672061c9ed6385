//! Signal routing for the SD bus pins

use crate::error::SdError;

/// Mux function a pin returns to when the SD host releases it
pub const DEFAULT_PIN_FUNCTION: u8 = 5;

/// One pin-to-function routing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub pin: u8,
    pub function: u8,
}

impl PinConfig {
    pub const fn new(pin: u8, function: u8) -> Self {
        Self { pin, function }
    }
}

/// I/O mux controller
pub trait PinMux: Sync {
    /// Route `pin` to mux `function`
    fn select(&self, pin: u8, function: u8) -> Result<(), SdError>;
}
