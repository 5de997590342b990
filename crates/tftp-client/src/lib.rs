// Allow unused code for items that are part of the public API or reserved for future use
#![allow(dead_code)]

pub mod audit;
pub mod bitmap;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod multicast;
pub mod options;
pub mod settings;
pub mod socket;
pub mod timer;
pub mod uri;

pub use bitmap::BlockBitmap;
pub use config::EngineConfig;
pub use consumer::Consumer;
pub use engine::{Engine, OpenFlags};
pub use error::{Result, TftpError};
pub use uri::{Scheme, TftpUri};

// RFC 1350 - The TFTP Protocol (Revision 2), with RFC 2347/2348/2349 option
// extensions and RFC 2090 multicast.
pub const DEFAULT_BLOCK_SIZE: usize = 512; // RFC 1350 standard for compatibility
pub const MAX_BLOCK_SIZE: usize = 65464; // RFC 2348 maximum block size
pub const MAX_PACKET_SIZE: usize = 65468; // Max block size + 4 byte header

pub const DEFAULT_TFTP_PORT: u16 = 69;
pub const DEFAULT_MTFTP_PORT: u16 = 1759;

// TFTP Opcodes (RFC 1350 + RFC 2347)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,   // Read Request
    Wrq = 2,   // Write Request (unused by this read-only client, kept for wire completeness)
    Data = 3,  // Data
    Ack = 4,   // Acknowledgment
    Error = 5, // Error
    Oack = 6,  // Option Acknowledgment (RFC 2347)
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Opcode::Rrq),
            2 => Some(Opcode::Wrq),
            3 => Some(Opcode::Data),
            4 => Some(Opcode::Ack),
            5 => Some(Opcode::Error),
            6 => Some(Opcode::Oack),
            _ => None,
        }
    }
}
