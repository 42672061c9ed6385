//! CrabSD - SD/MMC card bring-up and block transfer engine
//!
//! This library takes an SD memory card from power-on to the transfer state
//! over a pluggable host controller and then moves 512-byte blocks with DMA.
//! Devices are reached through the [`BlockDevice`] trait, usually after
//! looking them up in a [`DeviceRegistry`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod block;
pub mod drivers;
pub mod error;
pub mod logger;
pub mod registry;
pub mod time;

pub use block::BlockDevice;
pub use drivers::sdmmc::{
    BusWidth, CardInfo, CardType, CsdVersion, Environment, RetryPolicy, SdHost, SdmmcConfig,
    SdmmcDevice,
};
pub use error::SdError;
pub use registry::DeviceRegistry;
pub use time::{Clock, Timeout};
