//! SD Command and Response Definitions
//!
//! Command indices, command arguments and the bit layouts of the short
//! responses the bring-up sequencer and the transfer engine inspect.

use bitflags::bitflags;
use tock_registers::register_bitfields;

// ============================================================================
// Geometry
// ============================================================================

/// Block size for SD cards (always 512 bytes)
pub const SD_BLOCK_SIZE: u32 = 512;

/// Maximum number of blocks moved by one read/write request
pub const MAX_BLOCKS_PER_TRANSFER: u32 = 127;

// ============================================================================
// SD/MMC Commands
// ============================================================================

/// GO_IDLE_STATE (CMD0) - Reset card to idle state
pub const MMC_CMD_GO_IDLE_STATE: u8 = 0;

/// ALL_SEND_CID (CMD2) - Ask all cards to send CID
pub const MMC_CMD_ALL_SEND_CID: u8 = 2;

/// SEND_RELATIVE_ADDR (CMD3) - Ask card to publish a new RCA
pub const SD_CMD_SEND_RELATIVE_ADDR: u8 = 3;

/// SELECT_CARD (CMD7) - Select/deselect card
pub const MMC_CMD_SELECT_CARD: u8 = 7;

/// SEND_IF_COND (CMD8) - Send interface condition
pub const SD_CMD_SEND_IF_COND: u8 = 8;

/// SEND_CSD (CMD9) - Ask card to send CSD
pub const MMC_CMD_SEND_CSD: u8 = 9;

/// STOP_TRANSMISSION (CMD12) - End a multi-block transfer
pub const MMC_CMD_STOP_TRANSMISSION: u8 = 12;

/// SEND_STATUS (CMD13) - Ask card to send its status register
pub const MMC_CMD_SEND_STATUS: u8 = 13;

/// SET_BLOCKLEN (CMD16) - Set block length
pub const MMC_CMD_SET_BLOCKLEN: u8 = 16;

/// READ_SINGLE_BLOCK (CMD17)
pub const MMC_CMD_READ_SINGLE_BLOCK: u8 = 17;

/// READ_MULTIPLE_BLOCK (CMD18)
pub const MMC_CMD_READ_MULTIPLE_BLOCK: u8 = 18;

/// WRITE_SINGLE_BLOCK (CMD24)
pub const MMC_CMD_WRITE_SINGLE_BLOCK: u8 = 24;

/// WRITE_MULTIPLE_BLOCK (CMD25)
pub const MMC_CMD_WRITE_MULTIPLE_BLOCK: u8 = 25;

/// APP_CMD (CMD55) - Next command is application-specific
pub const MMC_CMD_APP_CMD: u8 = 55;

// SD-specific commands (application commands after CMD55)

/// SET_BUS_WIDTH (ACMD6) - Set data bus width
pub const SD_CMD_APP_SET_BUS_WIDTH: u8 = 6;

/// SD_SEND_OP_COND (ACMD41) - Sends host capacity support info
pub const SD_CMD_APP_SEND_OP_COND: u8 = 41;

// ============================================================================
// Command Arguments
// ============================================================================

/// CMD8 check pattern, echoed back in R7
pub const IF_COND_CHECK_PATTERN: u32 = 0xAA;

/// CMD8 supply voltage field: 2.7-3.6V
pub const IF_COND_VHS_27_36: u32 = 0x1;

/// CMD8 argument: 2.7-3.6V supply plus the check pattern
pub const IF_COND_ARG: u32 = IF_COND_VHS_27_36 << 8 | IF_COND_CHECK_PATTERN;

/// ACMD41 argument: power-up status, HCS and the 3.2-3.3V window
pub const OP_COND_ARG: u32 = 0xC010_0000;

/// ACMD6 argument for a 1-bit bus
pub const BUS_WIDTH_ARG_1BIT: u32 = 0x00;

/// ACMD6 argument for a 4-bit bus
pub const BUS_WIDTH_ARG_4BIT: u32 = 0x02;

/// Index echo reported for responses that carry no command index (R2, R3)
pub const RSP_RESERVED_INDEX: u8 = 0x3F;

// ============================================================================
// Response Types
// ============================================================================

bitflags! {
    /// How the host has to treat the response to a command
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResponseFlags: u8 {
        /// Card sends a response
        const PRESENT = 1 << 0;
        /// 136-bit response
        const LONG = 1 << 1;
        /// Response carries a CRC the host should check
        const CRC = 1 << 2;
        /// Response echoes the command index
        const INDEX = 1 << 3;
        /// Card signals busy on DAT0 after the response
        const BUSY = 1 << 4;
    }
}

/// No response
pub const MMC_RSP_NONE: ResponseFlags = ResponseFlags::empty();

/// R1 - Normal response
pub const MMC_RSP_R1: ResponseFlags = ResponseFlags::PRESENT
    .union(ResponseFlags::CRC)
    .union(ResponseFlags::INDEX);

/// R1b - Normal response with busy
pub const MMC_RSP_R1B: ResponseFlags = MMC_RSP_R1.union(ResponseFlags::BUSY);

/// R2 - CID/CSD response (136 bits)
pub const MMC_RSP_R2: ResponseFlags = ResponseFlags::PRESENT
    .union(ResponseFlags::LONG)
    .union(ResponseFlags::CRC);

/// R3 - OCR response
pub const MMC_RSP_R3: ResponseFlags = ResponseFlags::PRESENT;

/// R6 - RCA response (SD)
pub const MMC_RSP_R6: ResponseFlags = MMC_RSP_R1;

/// R7 - Card interface condition (SD)
pub const MMC_RSP_R7: ResponseFlags = MMC_RSP_R1;

// ============================================================================
// Response Bitfields
// ============================================================================

register_bitfields! [
    u32,
    /// Card status (R1)
    pub CARD_STATUS [
        /// Card expects an application command next
        APP_CMD OFFSET(5) NUMBITS(1) [],
        /// Buffer empty on the bus
        READY_FOR_DATA OFFSET(8) NUMBITS(1) [],
        /// Card state machine position
        CURRENT_STATE OFFSET(9) NUMBITS(4) [
            Idle = 0,
            Ready = 1,
            Ident = 2,
            Standby = 3,
            Transfer = 4,
            Data = 5,
            Receive = 6,
            Program = 7,
            Disconnect = 8
        ],
        /// General or unknown error
        ERROR OFFSET(19) NUMBITS(1) [],
        /// Internal card controller error
        CC_ERROR OFFSET(20) NUMBITS(1) [],
        /// Card internal ECC failed
        CARD_ECC_FAILED OFFSET(21) NUMBITS(1) [],
        /// Command not legal for the card state
        ILLEGAL_COMMAND OFFSET(22) NUMBITS(1) [],
        /// CRC check of the previous command failed
        COM_CRC_ERROR OFFSET(23) NUMBITS(1) [],
        /// Transferred block length not allowed
        BLOCK_LEN_ERROR OFFSET(29) NUMBITS(1) [],
        /// Misaligned address
        ADDRESS_ERROR OFFSET(30) NUMBITS(1) [],
        /// Argument out of the allowed range
        OUT_OF_RANGE OFFSET(31) NUMBITS(1) []
    ],

    /// Operation conditions (R3)
    pub OCR [
        /// 3.2-3.3V
        VDD_32_33 OFFSET(20) NUMBITS(1) [],
        /// 3.3-3.4V
        VDD_33_34 OFFSET(21) NUMBITS(1) [],
        /// Switching to 1.8V accepted
        S18A OFFSET(24) NUMBITS(1) [],
        /// Card Capacity Status - set for SDHC/SDXC
        CCS OFFSET(30) NUMBITS(1) [],
        /// Card power up status (bit 31 = 0 means busy)
        POWER_UP OFFSET(31) NUMBITS(1) []
    ],

    /// Interface condition (R7)
    pub IF_COND [
        /// Echo of the check pattern
        CHECK_PATTERN OFFSET(0) NUMBITS(8) [],
        /// Accepted voltage range
        VHS OFFSET(8) NUMBITS(4) []
    ],

    /// Published RCA (R6)
    pub RCA_RESPONSE [
        /// Condensed card status
        STATUS OFFSET(0) NUMBITS(16) [],
        /// New relative card address
        RCA OFFSET(16) NUMBITS(16) []
    ]
];
