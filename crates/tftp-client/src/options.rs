//! Parses the NUL-delimited option pairs carried in an OACK payload.
//!
//! Reads the multicast option's `"addr,port,mc"` value format from the
//! receiving end of it.

use std::net::Ipv4Addr;

use crate::error::{Result, TftpError};

#[derive(Debug, Clone, Default)]
pub struct MulticastOption {
    /// `None` when the server defers address assignment to a later OACK.
    pub addr: Option<Ipv4Addr>,
    pub port: Option<u16>,
    pub master_client: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedOptions {
    pub blksize: Option<usize>,
    pub tsize: Option<u64>,
    pub multicast: Option<MulticastOption>,
}

/// Reads a NUL-terminated string starting at `start`. Returns `None` if no
/// terminating NUL is found, in which case the caller should stop parsing
/// rather than error: malformed trailing bytes after the last well-formed
/// pair are tolerated.
fn read_cstr(buf: &[u8], start: usize) -> Option<(String, usize)> {
    let end = buf[start..].iter().position(|&b| b == 0)? + start;
    let s = String::from_utf8_lossy(&buf[start..end]).into_owned();
    Some((s, end + 1))
}

pub fn parse(payload: &[u8]) -> Result<ParsedOptions> {
    let mut options = ParsedOptions::default();
    let mut pos = 0;
    loop {
        let Some((name, after_name)) = read_cstr(payload, pos) else {
            break;
        };
        let Some((value, after_value)) = read_cstr(payload, after_name) else {
            break;
        };
        pos = after_value;
        apply_option(&mut options, &name, &value)?;
    }
    Ok(options)
}

fn apply_option(options: &mut ParsedOptions, name: &str, value: &str) -> Result<()> {
    match name.to_ascii_lowercase().as_str() {
        "blksize" => {
            let n: usize = value
                .parse()
                .map_err(|_| TftpError::InvalidBlksize(value.to_string()))?;
            options.blksize = Some(n);
        }
        "tsize" => {
            let n: u64 = value
                .parse()
                .map_err(|_| TftpError::InvalidTsize(value.to_string()))?;
            options.tsize = Some(n);
        }
        "multicast" => {
            options.multicast = Some(parse_multicast_value(value)?);
        }
        _ => {
            // Unknown options are silently ignored, per RFC 2347.
        }
    }
    Ok(())
}

fn parse_multicast_value(value: &str) -> Result<MulticastOption> {
    let mut fields = value.split(',');

    let addr_field = fields.next().unwrap_or("");
    let port_field = fields
        .next()
        .ok_or(TftpError::MulticastMissingPort)?;
    let mc_field = fields.next().ok_or(TftpError::MulticastMissingMc)?;

    let addr = if addr_field.is_empty() {
        None
    } else {
        Some(
            addr_field
                .parse::<Ipv4Addr>()
                .map_err(|_| TftpError::MulticastInvalidIp(addr_field.to_string()))?,
        )
    };

    let port = if port_field.is_empty() {
        None
    } else {
        Some(
            port_field
                .parse::<u16>()
                .map_err(|_| TftpError::MulticastInvalidPort(port_field.to_string()))?,
        )
    };

    let master_client = match mc_field {
        "1" => true,
        "0" => false,
        other => return Err(TftpError::MulticastInvalidMc(other.to_string())),
    };

    Ok(MulticastOption {
        addr,
        port,
        master_client,
    })
}
