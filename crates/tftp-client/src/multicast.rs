//! RFC 2090 multicast group membership, client side.
//!
//! This client only ever joins one group and reads DATA off it — no
//! per-client ACK tracking or selective retransmission, since master-client
//! election (see `engine.rs`) already decides whether this side ever needs
//! to send an ACK at all. What's here is just the socket construction a
//! receive-only group member needs.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::{Result, TftpError};

pub struct MulticastSocket {
    pub socket: UdpSocket,
    pub group: SocketAddrV4,
}

impl MulticastSocket {
    /// Joins `group` for receive-only use. Binds `SO_REUSEADDR` so that
    /// multiple local processes (or repeated opens within this process,
    /// across an MTFTP fallback-and-retry) can share the port.
    pub async fn join(group: SocketAddrV4) -> Result<Self> {
        let std_socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(TftpError::Network)?;
        std_socket.set_reuse_address(true).map_err(TftpError::Network)?;
        std_socket.set_nonblocking(true).map_err(TftpError::Network)?;

        let bind_addr: SocketAddr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), group.port());
        std_socket
            .bind(&bind_addr.into())
            .map_err(TftpError::Network)?;
        std_socket
            .join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)
            .map_err(TftpError::Network)?;

        let std_udp: std::net::UdpSocket = std_socket.into();
        let socket = UdpSocket::from_std(std_udp).map_err(TftpError::Network)?;

        Ok(Self { socket, group })
    }
}
