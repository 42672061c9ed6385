//! SD memory card driver
//!
//! This module brings an SD card up over an [`SdHost`] controller and then
//! moves 512-byte blocks with DMA. It supports:
//! - SD 1.x, SDSC and SDHC/SDXC cards
//! - 1-bit and 4-bit buses
//! - single and multi-block reads and writes (up to 127 blocks per request)
//!
//! All hardware access of one device is serialized by its mutex. DMA
//! completion is handed from the host's interrupt handler to the waiting
//! thread through a [`Completion`].

mod card;
mod completion;
mod config;
mod csd;
mod engine;
mod guard;
mod policy;
pub mod regs;
mod xfer;

use alloc::sync::Arc;
use spin::Mutex;

use crate::drivers::clock_gate::ClockGate;
use crate::drivers::dma::DmaAllocator;
use crate::drivers::pinmux::{DEFAULT_PIN_FUNCTION, PinMux};
use crate::error::SdError;
use crate::time::Clock;

pub use card::{CardBus, CardInfo, CardState, CardStatus, CardType};
pub use completion::{Completion, CompletionSignal, Semaphore, SyncState, XferEvent};
pub use config::{BusWidth, DEFAULT_CLOCK_HZ, MAX_SD_PINS, SdmmcConfig};
pub use csd::{Csd, CsdVersion};
pub use guard::{DmaLease, first_error};
pub use policy::RetryPolicy;
pub use xfer::{Command, DataPhase, HostConfig, SdHost, Transfer};

/// Platform services a device depends on
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    pub clock_gate: &'a dyn ClockGate,
    pub dma: &'a dyn DmaAllocator,
    pub pins: &'a dyn PinMux,
    pub clock: &'a dyn Clock,
}

/// State that only exists between a successful `init` and `deinit`
struct DeviceContext {
    card: CardInfo,
    completion: Arc<Completion>,
}

struct Inner<H> {
    host: H,
    ctx: Option<DeviceContext>,
}

/// One SD card slot
pub struct SdmmcDevice<'a, H: SdHost> {
    config: SdmmcConfig,
    env: Environment<'a>,
    inner: Mutex<Inner<H>>,
}

impl<'a, H: SdHost> SdmmcDevice<'a, H> {
    pub fn new(config: SdmmcConfig, host: H, env: Environment<'a>) -> Self {
        Self {
            config,
            env,
            inner: Mutex::new(Inner { host, ctx: None }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &SdmmcConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().ctx.is_some()
    }

    /// Power the controller and take the card to the transfer state
    ///
    /// A second call on an initialized device returns
    /// [`SdError::AlreadyInitialized`] without touching hardware. On failure
    /// everything brought up so far is torn down again.
    pub fn init(&self) -> Result<(), SdError> {
        let mut inner = self.inner.lock();
        if inner.ctx.is_some() {
            return Err(SdError::AlreadyInitialized);
        }

        log::info!("SDMMC {}: initializing", self.config.name);
        self.env.clock_gate.enable(self.config.clock_gate)?;

        match self.bring_up(&mut inner.host) {
            Ok(ctx) => {
                inner.ctx = Some(ctx);
                log::info!("SDMMC {}: ready", self.config.name);
                Ok(())
            }
            Err(e) => {
                log::error!("SDMMC {}: init failed: {:?}", self.config.name, e);
                if let Err(cleanup) = self.teardown(&mut inner.host) {
                    log::warn!("SDMMC {}: rollback failed: {:?}", self.config.name, cleanup);
                }
                Err(e)
            }
        }
    }

    fn bring_up(&self, host: &mut H) -> Result<DeviceContext, SdError> {
        host.init(&self.config.host_config())?;
        self.route_pins()?;

        let card = CardBus::new(host, self.env.clock, &self.config.policy)
            .bring_up(self.config.bus_width)?;

        let completion = Arc::new(Completion::new());
        host.set_completion(Some(CompletionSignal::new(completion.clone())));
        Ok(DeviceContext { card, completion })
    }

    fn route_pins(&self) -> Result<(), SdError> {
        for pin in &self.config.pins {
            self.env.pins.select(pin.pin, pin.function).inspect_err(|e| {
                log::error!("SDMMC: failed to route pin {}: {:?}", pin.pin, e);
            })?;
        }
        Ok(())
    }

    /// Restore pins, stop the host and gate its clock; every step runs
    fn teardown(&self, host: &mut H) -> Result<(), SdError> {
        let mut result = Ok(());
        for pin in &self.config.pins {
            result = first_error(
                result,
                self.env.pins.select(pin.pin, DEFAULT_PIN_FUNCTION),
                "pin restore",
            );
        }
        host.set_completion(None);
        result = first_error(result, host.deinit(), "host deinit");
        first_error(
            result,
            self.env.clock_gate.disable(self.config.clock_gate),
            "clock gate disable",
        )
    }

    /// Release the card and the controller
    pub fn deinit(&self) -> Result<(), SdError> {
        let mut inner = self.inner.lock();
        if inner.ctx.take().is_none() {
            return Err(SdError::NotInitialized);
        }
        log::info!("SDMMC {}: deinitializing", self.config.name);
        self.teardown(&mut inner.host)
    }

    /// Card description, after checking the card still answers
    pub fn card_info(&self) -> Result<CardInfo, SdError> {
        let mut inner = self.inner.lock();
        let Inner { host, ctx } = &mut *inner;
        let ctx = ctx.as_ref().ok_or(SdError::NotInitialized)?;

        CardBus::new(host, self.env.clock, &self.config.policy).send_status(ctx.card.rca)?;
        Ok(ctx.card)
    }
}
