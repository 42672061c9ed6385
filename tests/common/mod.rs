//! Simulated SD card and platform collaborators shared by the integration
//! tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crabsd::drivers::clock_gate::{ClockGate, ClockGateId};
use crabsd::drivers::dma::{ChannelPool, DmaChannel};
use crabsd::drivers::pinmux::{PinConfig, PinMux};
use crabsd::drivers::sdmmc::{
    CompletionSignal, DataPhase, Environment, HostConfig, RetryPolicy, SdHost, SdmmcConfig,
    SdmmcDevice, Transfer, XferEvent,
};
use crabsd::{Clock, SdError};

pub const BLOCK: usize = 512;

/// RCA the simulated card publishes
pub const SIM_RCA: u32 = 0xB368;

const STATE_STANDBY: u32 = 3;
const STATE_TRAN: u32 = 4;
const STATE_PRG: u32 = 7;

/// CSD image of a 512 KiB version 2 card (C_SIZE = 0)
pub fn csd_v2_image() -> [u8; 16] {
    let mut image = [0u8; 16];
    image[0] = 0x3F;
    image[1] = 0x40;
    image
}

/// CSD image of a 512 KiB version 1 card
/// (READ_BL_LEN = 9, C_SIZE = 255, C_SIZE_MULT = 0)
pub fn csd_v1_image() -> [u8; 16] {
    let mut image = [0u8; 16];
    image[0] = 0x3F;
    image[6] = 0x09;
    image[8] = 0x3F;
    image[9] = 0xC0;
    image
}

pub struct SimState {
    pub storage: Vec<u8>,
    pub csd_image: [u8; 16],
    pub high_capacity: bool,

    /// Card ignores CMD8
    pub legacy: bool,
    /// ACMD41 reports busy this many times before ready
    pub busy_responses: u32,
    pub busy_forever: bool,
    /// DMA completion is never signalled
    pub drop_completion: bool,
    /// DMA completion reports an error event
    pub fail_data: bool,
    /// Completion is signalled from another thread after a short delay
    pub async_completion: bool,
    /// Command whose index echo is corrupted
    pub wrong_echo: Option<u8>,
    /// CMD13 reports the programming state this many times after a write
    pub program_polls: u32,
    /// CMD13 sets the general error bit
    pub status_error: bool,
    /// CMD8 answers with a corrupted check pattern
    pub bad_check_pattern: bool,
    /// ACMD41 fails at the transfer level
    pub op_cond_error: bool,
    /// CMD55 index echo is corrupted this many times
    pub app_echo_glitches: u32,
    /// ACMD41 reserved-index echo is corrupted this many times
    pub op_cond_echo_glitches: u32,

    pub commands: Vec<(u8, u32)>,
    pub bus_width_arg: Option<u32>,
    pub host_inits: u32,
    pub host_deinits: u32,
    pub interleaved: u32,

    completion: Option<CompletionSignal>,
    selected: bool,
    in_request: bool,
    pending_program: u32,
}

/// In-memory SD card behind an [`SdHost`]
#[derive(Clone)]
pub struct SimCard {
    state: Arc<Mutex<SimState>>,
}

impl SimCard {
    fn with_csd(csd_image: [u8; 16], high_capacity: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                storage: vec![0; 1024 * BLOCK],
                csd_image,
                high_capacity,
                legacy: false,
                busy_responses: 0,
                busy_forever: false,
                drop_completion: false,
                fail_data: false,
                async_completion: false,
                wrong_echo: None,
                program_polls: 0,
                status_error: false,
                bad_check_pattern: false,
                op_cond_error: false,
                app_echo_glitches: 0,
                op_cond_echo_glitches: 0,
                commands: Vec::new(),
                bus_width_arg: None,
                host_inits: 0,
                host_deinits: 0,
                interleaved: 0,
                completion: None,
                selected: false,
                in_request: false,
                pending_program: 0,
            })),
        }
    }

    /// 1024-block high capacity card
    pub fn sdhc() -> Self {
        Self::with_csd(csd_v2_image(), true)
    }

    /// 1024-block standard capacity card
    pub fn sdsc() -> Self {
        Self::with_csd(csd_v1_image(), false)
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn count(&self, index: u8) -> usize {
        self.state().commands.iter().filter(|(i, _)| *i == index).count()
    }

    pub fn command_log_len(&self) -> usize {
        self.state().commands.len()
    }

    pub fn last_arg(&self, index: u8) -> Option<u32> {
        self.state()
            .commands
            .iter()
            .rev()
            .find(|(i, _)| *i == index)
            .map(|(_, arg)| *arg)
    }

    fn status_word(state: &mut SimState) -> u32 {
        let current = if state.pending_program > 0 {
            state.pending_program -= 1;
            STATE_PRG
        } else if state.selected {
            STATE_TRAN
        } else {
            STATE_STANDBY
        };
        if current == STATE_TRAN {
            state.in_request = false;
        }
        let mut status = current << 9 | 1 << 8;
        if state.status_error {
            status |= 1 << 19;
        }
        status
    }

    fn block_offset(state: &SimState, arg: u32) -> usize {
        if state.csd_image[1] & 0x40 != 0 {
            arg as usize * BLOCK
        } else {
            arg as usize
        }
    }
}

fn long_response(image: &[u8; 16]) -> [u32; 4] {
    let word = |i: usize| u32::from_be_bytes([image[i], image[i + 1], image[i + 2], image[i + 3]]);
    [word(12), word(8), word(4), word(0)]
}

impl SdHost for SimCard {
    fn init(&mut self, _config: &HostConfig) -> Result<(), SdError> {
        self.state().host_inits += 1;
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), SdError> {
        let mut state = self.state();
        state.host_deinits += 1;
        state.selected = false;
        Ok(())
    }

    fn set_completion(&mut self, signal: Option<CompletionSignal>) {
        self.state().completion = signal;
    }

    fn transfer_polling(&mut self, xfer: &mut Transfer<'_>) -> Result<(), SdError> {
        let mut state = self.state();
        let index = xfer.command.index;
        let arg = xfer.command.arg;
        state.commands.push((index, arg));

        if state.in_request && index != 12 && index != 13 {
            state.interleaved += 1;
        }

        let mut rsp = [0u32; 4];
        rsp[1] = index as u32;
        match index {
            0 => {
                state.selected = false;
                rsp[1] = 0;
            }
            8 => {
                if state.legacy {
                    return Err(SdError::Timeout);
                }
                rsp[0] = arg & 0xFFF;
                if state.bad_check_pattern {
                    rsp[0] ^= 0xFF;
                }
            }
            55 => {
                rsp[0] = STATE_TRAN << 9 | 1 << 5;
                if state.app_echo_glitches > 0 {
                    state.app_echo_glitches -= 1;
                    rsp[1] = 0;
                }
            }
            41 => {
                if state.op_cond_error {
                    return Err(SdError::Timeout);
                }
                rsp[1] = 0x3F;
                if state.op_cond_echo_glitches > 0 {
                    state.op_cond_echo_glitches -= 1;
                    rsp[1] = 0x29;
                }
                let busy = if state.busy_forever {
                    true
                } else if state.busy_responses > 0 {
                    state.busy_responses -= 1;
                    true
                } else {
                    false
                };
                rsp[0] = 0x00FF_8000;
                if !busy {
                    rsp[0] |= 1 << 31;
                    if state.high_capacity {
                        rsp[0] |= 1 << 30;
                    }
                }
            }
            2 => {
                let mut cid = [0u8; 16];
                cid[0] = 0x3F;
                cid[1] = 0x03;
                rsp = long_response(&cid);
            }
            3 => rsp[0] = SIM_RCA << 16 | 0x0500,
            9 => {
                if arg != SIM_RCA << 16 {
                    return Err(SdError::Timeout);
                }
                rsp = long_response(&state.csd_image);
            }
            13 => {
                if arg != SIM_RCA << 16 {
                    return Err(SdError::Timeout);
                }
                rsp[0] = Self::status_word(&mut state);
            }
            7 => state.selected = true,
            6 => state.bus_width_arg = Some(arg),
            12 | 16 => {}
            _ => return Err(SdError::Failure),
        }

        if state.wrong_echo == Some(index) {
            rsp[1] = 0x00;
        }
        xfer.response = rsp;
        Ok(())
    }

    fn transfer_dma(
        &mut self,
        xfer: &mut Transfer<'_>,
        _channel: DmaChannel,
    ) -> Result<(), SdError> {
        let mut state = self.state();
        let index = xfer.command.index;
        let arg = xfer.command.arg;
        state.commands.push((index, arg));

        if state.in_request {
            state.interleaved += 1;
        }
        state.in_request = true;

        let offset = Self::block_offset(&state, arg);
        let Some(data) = xfer.data.as_mut() else {
            return Err(SdError::InvalidParameter);
        };
        let end = offset + data.len();
        if end > state.storage.len() {
            return Err(SdError::Failure);
        }

        let event = match data {
            DataPhase::Read(buf) => {
                buf.copy_from_slice(&state.storage[offset..end]);
                if state.fail_data {
                    XferEvent::ReadError
                } else {
                    XferEvent::ReadDone
                }
            }
            DataPhase::Write(buf) => {
                state.storage[offset..end].copy_from_slice(buf);
                state.pending_program = state.program_polls;
                if state.fail_data {
                    XferEvent::WriteError
                } else {
                    XferEvent::WriteDone
                }
            }
        };

        xfer.response[0] = STATE_TRAN << 9 | 1 << 8;
        xfer.response[1] = if state.wrong_echo == Some(index) {
            0
        } else {
            index as u32
        };

        if let Some(signal) = state.completion.clone().filter(|_| !state.drop_completion) {
            if state.async_completion {
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(2));
                    signal.notify(event);
                });
            } else {
                signal.notify(event);
            }
        }
        Ok(())
    }
}

/// Virtual clock: sleeps and polls advance time without waiting
#[derive(Default)]
pub struct FakeClock {
    now: AtomicU64,
    slept: AtomicU64,
}

impl FakeClock {
    pub fn slept_ms(&self) -> u64 {
        self.slept.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn delay_ms(&self, ms: u32) {
        self.now.fetch_add(ms as u64, Ordering::SeqCst);
        self.slept.fetch_add(ms as u64, Ordering::SeqCst);
    }

    fn relax(&self) {
        self.now.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wall clock for tests with real threads
pub struct StdClock(Instant);

impl StdClock {
    pub fn new() -> Self {
        Self(Instant::now())
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.0.elapsed().as_millis() as u64
    }

    fn delay_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn relax(&self) {
        std::thread::yield_now();
    }
}

#[derive(Default)]
pub struct CountingGate {
    pub enabled: AtomicU32,
    pub disabled: AtomicU32,
}

impl ClockGate for CountingGate {
    fn enable(&self, _gate: ClockGateId) -> Result<(), SdError> {
        self.enabled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self, _gate: ClockGateId) -> Result<(), SdError> {
        self.disabled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPinMux {
    pub selections: Mutex<Vec<(u8, u8)>>,
}

impl PinMux for RecordingPinMux {
    fn select(&self, pin: u8, function: u8) -> Result<(), SdError> {
        self.selections.lock().unwrap().push((pin, function));
        Ok(())
    }
}

/// SoC collaborators of one test
pub struct Board {
    pub gate: CountingGate,
    pub dma: ChannelPool,
    pub pins: RecordingPinMux,
}

impl Board {
    pub fn new() -> Self {
        Self::with_dma_channels(8)
    }

    pub fn with_dma_channels(channels: u8) -> Self {
        Self {
            gate: CountingGate::default(),
            dma: ChannelPool::new(channels),
            pins: RecordingPinMux::default(),
        }
    }

    pub fn env<'a>(&'a self, clock: &'a dyn Clock) -> Environment<'a> {
        Environment {
            clock_gate: &self.gate,
            dma: &self.dma,
            pins: &self.pins,
            clock,
        }
    }
}

pub fn sd_pins() -> [PinConfig; 6] {
    [
        PinConfig::new(22, 0),
        PinConfig::new(23, 0),
        PinConfig::new(24, 0),
        PinConfig::new(25, 0),
        PinConfig::new(26, 0),
        PinConfig::new(27, 0),
    ]
}

pub fn config(name: &'static str) -> SdmmcConfig {
    SdmmcConfig::new(name).with_policy(RetryPolicy::DEFAULT)
}

pub fn device<'a>(
    name: &'static str,
    card: &SimCard,
    board: &'a Board,
    clock: &'a dyn Clock,
) -> SdmmcDevice<'a, SimCard> {
    SdmmcDevice::new(config(name), card.clone(), board.env(clock))
}

/// Fill a buffer with a per-block ramp seeded by `seed`
pub fn ramp(blocks: usize, seed: u8) -> Vec<u8> {
    (0..blocks * BLOCK)
        .map(|i| (i / BLOCK) as u8 ^ (i as u8).wrapping_add(seed))
        .collect()
}
