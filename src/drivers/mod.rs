//! Hardware drivers for CrabSD
//!
//! The SD card driver plus the SoC collaborators it leans on: clock gating,
//! DMA channel allocation and pin routing.

pub mod clock_gate;
pub mod dma;
pub mod pinmux;
pub mod sdmmc;
