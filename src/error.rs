//! Driver error type
//!
//! Every public operation of the block engine and every collaborator trait
//! reports failures with [`SdError`].

use core::fmt;

/// SD/MMC driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdError {
    /// Null-equivalent arguments, out-of-range block counts or ranges
    InvalidParameter,
    /// Operation issued before a successful `init`
    NotInitialized,
    /// `init` issued on an already initialized device
    AlreadyInitialized,
    /// Bus, completion or ready wait exceeded its bound
    Timeout,
    /// Response mismatch, decode inconsistency or card error state
    Failure,
    /// Context or registry slot allocation failed
    NoMemory,
    /// No DMA channel could be leased for the transfer
    NoDmaChannel,
}

impl fmt::Display for SdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SdError::InvalidParameter => "invalid parameter",
            SdError::NotInitialized => "device not initialized",
            SdError::AlreadyInitialized => "device already initialized",
            SdError::Timeout => "timed out",
            SdError::Failure => "operation failed",
            SdError::NoMemory => "out of memory",
            SdError::NoDmaChannel => "no DMA channel available",
        };
        f.write_str(msg)
    }
}
