//! Wire encode/decode for the opcodes this client sends and receives.
//!
//! Packet-level malformation (too short for its opcode, or an opcode this
//! client never expects) is reported as `None` so the caller can drop the
//! packet with a debug log instead of treating it as a fatal protocol
//! error; only content that decodes structurally but fails validation
//! (bad option digits, say) is surfaced as an error elsewhere.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::Opcode;

/// A decoded packet this client acts on. WRQ is never received (this
/// client never serves writes) and ACK/RRQ are never decoded (this client
/// only ever sends those), so they have no variant here.
#[derive(Debug, Clone)]
pub enum Packet {
    Oack(Bytes),
    Data { block: u16, payload: Bytes },
    Error { code: u16, message: String },
}

pub fn decode(buf: &[u8]) -> Option<Packet> {
    if buf.len() < 2 {
        return None;
    }
    let mut cursor = Bytes::copy_from_slice(buf);
    let opcode = cursor.get_u16();
    match Opcode::from_u16(opcode)? {
        Opcode::Oack => Some(Packet::Oack(cursor)),
        Opcode::Data => {
            if cursor.len() < 2 {
                return None;
            }
            let block = cursor.get_u16();
            Some(Packet::Data {
                block,
                payload: cursor,
            })
        }
        Opcode::Error => {
            if cursor.len() < 2 {
                return None;
            }
            let code = cursor.get_u16();
            let message = match cursor.iter().position(|&b| b == 0) {
                Some(nul) => String::from_utf8_lossy(&cursor[..nul]).into_owned(),
                None => String::from_utf8_lossy(&cursor).into_owned(),
            };
            Some(Packet::Error { code, message })
        }
        Opcode::Rrq | Opcode::Wrq | Opcode::Ack => None,
    }
}

fn put_option(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_u8(0);
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

/// Encodes an RRQ in octet mode, optionally carrying the `blksize`/`tsize`
/// RFC 2348/2349 options and an empty-valued `multicast` option (RFC 2090).
pub fn encode_rrq(
    filename: &str,
    blksize: usize,
    include_sizes: bool,
    include_multicast: bool,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64 + filename.len());
    buf.put_u16(Opcode::Rrq as u16);
    buf.put_slice(filename.as_bytes());
    buf.put_u8(0);
    buf.put_slice(b"octet");
    buf.put_u8(0);
    if include_sizes {
        put_option(&mut buf, "blksize", &blksize.to_string());
        put_option(&mut buf, "tsize", "0");
    }
    if include_multicast {
        put_option(&mut buf, "multicast", "");
    }
    buf
}

pub fn encode_ack(block: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4);
    buf.put_u16(Opcode::Ack as u16);
    buf.put_u16(block);
    buf
}
