//! Named device registry
//!
//! Boards register their block devices once at startup; applications look
//! them up by name and bring them up through [`DeviceRegistry::init`].

use heapless::Vec;
use spin::Mutex;

use crate::block::BlockDevice;
use crate::error::SdError;

/// Maximum number of registered devices by default
pub const MAX_DEVICES: usize = 4;

pub struct DeviceRegistry<'d, const N: usize = MAX_DEVICES> {
    devices: Mutex<Vec<&'d dyn BlockDevice, N>>,
}

impl<const N: usize> Default for DeviceRegistry<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'d, const N: usize> DeviceRegistry<'d, N> {
    pub const fn new() -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
        }
    }

    /// Add a device; names must be unique
    pub fn register(&self, device: &'d dyn BlockDevice) -> Result<(), SdError> {
        let mut devices = self.devices.lock();
        if devices.iter().any(|d| d.name() == device.name()) {
            log::error!("Device {} already registered", device.name());
            return Err(SdError::AlreadyInitialized);
        }
        devices.push(device).map_err(|_| {
            log::error!("Device registry full, cannot add {}", device.name());
            SdError::NoMemory
        })?;
        log::debug!("Registered device {}", device.name());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&'d dyn BlockDevice> {
        self.devices.lock().iter().copied().find(|d| d.name() == name)
    }

    /// Initialize the device registered as `name` and return it
    pub fn init(&self, name: &str) -> Result<&'d dyn BlockDevice, SdError> {
        let device = self.lookup(name)?;
        device.init()?;
        Ok(device)
    }

    /// Deinitialize the device registered as `name`
    pub fn deinit(&self, name: &str) -> Result<(), SdError> {
        self.lookup(name)?.deinit()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, name: &str) -> Result<&'d dyn BlockDevice, SdError> {
        // The registry lock is dropped before the device takes its own.
        self.get(name).ok_or_else(|| {
            log::error!("No device named {}", name);
            SdError::InvalidParameter
        })
    }
}
