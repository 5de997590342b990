//! Unicast socket wrapper. Binds an ephemeral local port and remembers the
//! server's request-port address; the actual peer (the TID bound on the
//! first reply) is tracked by the engine, not here.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::error::{Result, TftpError};

pub struct UnicastSocket {
    pub socket: UdpSocket,
}

impl UnicastSocket {
    /// Binds a fresh ephemeral port, matching the address family of
    /// `peer_family_hint`. Called once at open and again on every MTFTP
    /// recovery reopen, so a stale server cannot keep matching packets
    /// against an old TID.
    pub async fn bind(peer_family_hint: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if peer_family_hint.is_ipv6() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local).await.map_err(TftpError::Network)?;
        Ok(Self { socket })
    }

    pub async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<()> {
        self.socket
            .send_to(buf, addr)
            .await
            .map_err(TftpError::Network)?;
        Ok(())
    }
}
