//! The parsed-target type the engine consumes. Resolving a textual target
//! into one of these is peripheral glue, not core engine logic; the engine
//! itself only ever sees the fields below.

use std::net::IpAddr;

use crate::error::{Result, TftpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Classic TFTP (RFC 1350), optionally with RFC 2347/2348/2349 options.
    Tftp,
    /// Multicast TFTP (RFC 2090): an RFC 2347 OACK carries a `multicast`
    /// option naming a group the engine joins for DATA delivery.
    Tftm,
    /// PXE-style MTFTP: listens on a preconfigured multicast group from the
    /// start and falls back to plain TFTP after repeated silence.
    Mtftp,
}

#[derive(Debug, Clone)]
pub struct TftpUri {
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

impl TftpUri {
    /// Parses `scheme://host[:port]/path`. No percent-decoding or IPv6
    /// bracket-literal support; those are not exercised by any scenario
    /// this client needs to handle.
    pub fn parse(s: &str) -> Result<Self> {
        let (scheme_str, rest) = s
            .split_once("://")
            .ok_or_else(|| TftpError::InvalidArgument(format!("missing scheme in '{s}'")))?;

        let scheme = match scheme_str {
            "tftp" => Scheme::Tftp,
            "tftm" => Scheme::Tftm,
            "mtftp" => Scheme::Mtftp,
            other => {
                return Err(TftpError::InvalidArgument(format!(
                    "unknown scheme '{other}' in '{s}'"
                )));
            }
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) if !h.is_empty() => {
                let port: u16 = p
                    .parse()
                    .map_err(|_| TftpError::InvalidArgument(format!("bad port in '{s}'")))?;
                (h.to_string(), Some(port))
            }
            _ => (authority.to_string(), None),
        };

        if host.is_empty() {
            return Err(TftpError::InvalidArgument(format!("missing host in '{s}'")));
        }

        Ok(Self {
            scheme,
            host,
            port,
            path: path.to_string(),
        })
    }

    /// Filename as placed on the wire: the path with a single leading `/`
    /// stripped.
    pub fn wire_filename(&self) -> &str {
        self.path.strip_prefix('/').unwrap_or(&self.path)
    }

    pub fn default_port(&self) -> u16 {
        match self.scheme {
            Scheme::Tftp | Scheme::Tftm => crate::DEFAULT_TFTP_PORT,
            Scheme::Mtftp => crate::DEFAULT_MTFTP_PORT,
        }
    }

    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.default_port())
    }
}

/// Resolves a host literal or hostname to an IP address. Literal IPs take a
/// fast path; anything else goes through the system resolver.
pub async fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(TftpError::Network)?;
    addrs
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| TftpError::InvalidArgument(format!("could not resolve host '{host}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_tftp_uri() {
        let uri = TftpUri::parse("tftp://10.0.0.1/boot/pxelinux.0").unwrap();
        assert_eq!(uri.scheme, Scheme::Tftp);
        assert_eq!(uri.host, "10.0.0.1");
        assert_eq!(uri.port, None);
        assert_eq!(uri.wire_filename(), "boot/pxelinux.0");
        assert_eq!(uri.resolved_port(), 69);
    }

    #[test]
    fn parses_mtftp_uri_with_explicit_port() {
        let uri = TftpUri::parse("mtftp://pxeserver:1759/image.bin").unwrap();
        assert_eq!(uri.scheme, Scheme::Mtftp);
        assert_eq!(uri.host, "pxeserver");
        assert_eq!(uri.port, Some(1759));
        assert_eq!(uri.resolved_port(), 1759);
    }

    #[test]
    fn parses_tftm_uri_default_path() {
        let uri = TftpUri::parse("tftm://server").unwrap();
        assert_eq!(uri.scheme, Scheme::Tftm);
        assert_eq!(uri.wire_filename(), "");
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(TftpUri::parse("10.0.0.1/file").is_err());
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(TftpUri::parse("ftp://10.0.0.1/file").is_err());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(TftpUri::parse("tftp://host:notaport/file").is_err());
    }
}
