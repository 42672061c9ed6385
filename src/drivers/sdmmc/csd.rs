//! CSD (Card-Specific Data) decoding
//!
//! The host returns the R2 response as four words with the reserved 0x3F
//! marker in the top byte, so the register image is shifted by one byte:
//! CSD byte `k` (MSB first) is found at `image[k + 1]`.

use zerocopy::byteorder::big_endian::U32;
use zerocopy::{Immutable, IntoBytes};

use super::regs::SD_BLOCK_SIZE;

/// CSD structure version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsdVersion {
    /// Standard capacity layout, byte addressed
    V1,
    /// High capacity layout, block addressed
    V2,
}

/// R2 response words laid out most significant word first
#[derive(IntoBytes, Immutable)]
#[repr(C)]
struct ResponseImage {
    words: [U32; 4],
}

/// Raw CSD register image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csd {
    image: [u8; 16],
}

impl Csd {
    /// Reassemble the host's response words into the register image
    pub fn from_response(response: &[u32; 4]) -> Self {
        let words = ResponseImage {
            words: [
                U32::new(response[3]),
                U32::new(response[2]),
                U32::new(response[1]),
                U32::new(response[0]),
            ],
        };
        let mut image = [0u8; 16];
        image.copy_from_slice(words.as_bytes());
        Self { image }
    }

    /// Build from an already reassembled image
    pub fn from_image(image: [u8; 16]) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &[u8; 16] {
        &self.image
    }

    pub fn version(&self) -> CsdVersion {
        if self.image[1] & 0x40 != 0 {
            CsdVersion::V2
        } else {
            CsdVersion::V1
        }
    }

    /// Device size field (22 bits for V2, 12 bits for V1)
    pub fn c_size(&self) -> u32 {
        let b = &self.image;
        match self.version() {
            CsdVersion::V2 => {
                ((b[8] as u32 & 0x3F) << 16) | ((b[9] as u32) << 8) | b[10] as u32
            }
            CsdVersion::V1 => {
                ((b[7] as u32 & 0x03) << 10) | ((b[8] as u32) << 2) | (b[9] as u32 >> 6)
            }
        }
    }

    /// Capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        let c_size = self.c_size() as u64;
        match self.version() {
            // (C_SIZE + 1) * 512 KiB
            CsdVersion::V2 => (c_size + 1) * 512 * 1024,
            CsdVersion::V1 => {
                let b = &self.image;
                let read_bl_len = (b[6] & 0x0F) as u32;
                let c_size_mult = (((b[10] & 0x03) << 1) | (b[11] >> 7)) as u32;
                (c_size + 1) << (c_size_mult + 2 + read_bl_len)
            }
        }
    }

    /// Transfer block size; the host always runs 512-byte blocks
    pub fn block_size(&self) -> u32 {
        SD_BLOCK_SIZE
    }
}
