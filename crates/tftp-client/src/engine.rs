//! The transfer state machine: RRQ emission, option negotiation, block
//! reassembly (unicast or multicast), MTFTP recovery, and completion.
//!
//! The peer-TID capture from the first reply and the ACK-after-receipt
//! loop follow the same shape as a classic single-connection TFTP client,
//! generalized from fixed windowing to a block bitmap so multicast delivery
//! can arrive out of order; master-client election gates whether this side
//! ever sends an ACK at all. Running the whole state machine as one owned
//! `async fn` polled to completion avoids the self-referential-lifetime
//! problem a callback-based design would otherwise have to solve.

use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audit::AuditLogger;
use crate::bitmap::BlockBitmap;
use crate::codec::{self, Packet};
use crate::config::EngineConfig;
use crate::consumer::Consumer;
use crate::error::{Result, TftpError};
use crate::multicast::MulticastSocket;
use crate::options;
use crate::socket::UnicastSocket;
use crate::timer::RetryTimer;
use crate::uri::{Scheme, TftpUri, resolve_host};

/// What was sent most recently, so a generic retry can resend it verbatim.
#[derive(Debug, Clone, Copy)]
enum LastAction {
    Rrq,
    Ack(usize),
}

/// Per-open behavior derived from the target's scheme.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
    pub rrq_sizes: bool,
    pub rrq_multicast: bool,
    pub mtftp_recovery: bool,
}

impl OpenFlags {
    fn for_scheme(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Tftp => Self {
                rrq_sizes: true,
                rrq_multicast: false,
                mtftp_recovery: false,
            },
            Scheme::Tftm => Self {
                rrq_sizes: true,
                rrq_multicast: true,
                mtftp_recovery: false,
            },
            Scheme::Mtftp => Self {
                rrq_sizes: true,
                rrq_multicast: true,
                mtftp_recovery: true,
            },
        }
    }
}

enum Progress {
    Continue,
    Done,
}

/// One read transfer, start to finish.
pub struct Engine {
    correlation_id: String,
    wire_filename: String,
    server_addr: SocketAddr,
    flags: OpenFlags,
    blksize: usize,
    tsize: u64,
    filesize: u64,
    bitmap: BlockBitmap,
    /// Length of the highest-numbered block received so far; used for the
    /// strict completion rule (bitmap full AND this is a short block).
    highest_block: Option<(usize, usize)>,
    peer: Option<SocketAddr>,
    send_ack: bool,
    mtftp_timeouts: u32,
    last_action: LastAction,
    timer: RetryTimer,
    unicast: UnicastSocket,
    multicast: Option<MulticastSocket>,
    config: EngineConfig,
}

impl Engine {
    /// Resolves `uri`, binds sockets, and runs the transfer to completion,
    /// delivering bytes to `consumer` along the way. Returns once the
    /// transfer has terminated, successfully or not; `consumer.close` has
    /// always been called by the time this returns.
    pub async fn run(uri: TftpUri, config: EngineConfig, mut consumer: Box<dyn Consumer>) -> Result<()> {
        let correlation_id = AuditLogger::generate_correlation_id(&format!(
            "{:?}://{}{}",
            uri.scheme, uri.host, uri.path
        ));
        AuditLogger::request_opened(&correlation_id, &uri.path, scheme_name(uri.scheme));

        let started = Instant::now();
        let flags = OpenFlags::for_scheme(uri.scheme);
        let ip: IpAddr = resolve_host(&uri.host).await?;
        let server_addr = SocketAddr::new(ip, uri.resolved_port());
        let wire_filename = uri.wire_filename().to_string();

        let unicast = UnicastSocket::bind(server_addr).await?;

        let multicast = if flags.mtftp_recovery {
            let group = SocketAddrV4::new(config.mtftp_multicast_addr, config.mtftp_multicast_port);
            Some(MulticastSocket::join(group).await?)
        } else {
            None
        };

        let mut engine = Engine {
            correlation_id,
            wire_filename,
            server_addr,
            flags,
            blksize: config.default_block_size,
            tsize: 0,
            filesize: 0,
            bitmap: BlockBitmap::new(),
            highest_block: None,
            peer: None,
            send_ack: false,
            mtftp_timeouts: 0,
            last_action: LastAction::Rrq,
            timer: RetryTimer::new(
                Duration::from_millis(config.timer_initial_ms),
                Duration::from_millis(config.timer_cap_ms),
                config.timer_max_attempts,
            ),
            unicast,
            multicast,
            config,
        };

        consumer.set_window(engine.blksize);
        engine.timer.start_nodelay();

        let result = engine.drive(consumer.as_mut()).await;

        let status = result.as_ref().err().map(TftpError::status_code).unwrap_or(0);
        if let Err(e) = &result {
            AuditLogger::transfer_failed(&engine.correlation_id, &e.to_string(), status);
        } else {
            AuditLogger::transfer_completed(
                &engine.correlation_id,
                engine.filesize,
                started.elapsed().as_millis() as u64,
            );
        }
        consumer.close(status).await;
        result
    }

    async fn drive(&mut self, consumer: &mut dyn Consumer) -> Result<()> {
        let mut unicast_buf = vec![0u8; crate::MAX_PACKET_SIZE];
        let mut multicast_buf = vec![0u8; crate::MAX_PACKET_SIZE];

        loop {
            let progress = tokio::select! {
                _ = tokio::time::sleep_until(self.timer.deadline()) => {
                    self.on_timer_fire().await?
                }
                res = self.unicast.socket.recv_from(&mut unicast_buf) => {
                    let (len, from) = res.map_err(TftpError::Network)?;
                    self.on_packet(consumer, &unicast_buf[..len], from, Source::Unicast).await?
                }
                res = recv_multicast(self.multicast.as_ref(), &mut multicast_buf), if self.multicast.is_some() => {
                    let (len, from) = res.map_err(TftpError::Network)?;
                    self.on_packet(consumer, &multicast_buf[..len], from, Source::Multicast).await?
                }
            };
            if matches!(progress, Progress::Done) {
                return Ok(());
            }
        }
    }

    async fn on_timer_fire(&mut self) -> Result<Progress> {
        let failed = self.timer.expire();

        if self.peer.is_none() && self.flags.mtftp_recovery {
            self.mtftp_timeouts += 1;
            if self.mtftp_timeouts > self.config.mtftp_fallback_cap {
                self.fallback_to_plain_tftp().await?;
            } else {
                AuditLogger::mtftp_fallback(&self.correlation_id, self.mtftp_timeouts);
                self.send_rrq().await?;
            }
            return Ok(Progress::Continue);
        }

        if self.peer.is_some() && self.flags.mtftp_recovery {
            self.reopen_unicast_for_recovery().await?;
            self.send_rrq().await?;
            return Ok(Progress::Continue);
        }

        if self.peer.is_none() && self.flags.rrq_multicast {
            self.send_rrq().await?;
            return Ok(Progress::Continue);
        }

        if failed {
            return Err(TftpError::Timeout);
        }
        self.resend_last().await?;
        Ok(Progress::Continue)
    }

    async fn on_packet(
        &mut self,
        consumer: &mut dyn Consumer,
        data: &[u8],
        from: SocketAddr,
        source: Source,
    ) -> Result<Progress> {
        if let Source::Unicast = source {
            match self.peer {
                Some(peer) if peer != from => {
                    debug!(%from, %peer, "dropping packet from unbound TID");
                    return Ok(Progress::Continue);
                }
                Some(_) => {}
                None => {
                    self.peer = Some(from);
                    self.send_ack = true;
                }
            }
        }

        let Some(packet) = codec::decode(data) else {
            debug!(%from, "dropping malformed or unexpected packet");
            return Ok(Progress::Continue);
        };

        match packet {
            Packet::Error { code, message } => {
                warn!(code, %message, "server returned an error");
                AuditLogger::protocol_violation(&self.correlation_id, &message);
                Err(TftpError::from_wire_error_code(code))
            }
            Packet::Oack(payload) => self.handle_oack(consumer, &payload).await,
            Packet::Data { block, payload } => self.handle_data(consumer, block, payload).await,
        }
    }

    async fn handle_oack(&mut self, consumer: &mut dyn Consumer, payload: &Bytes) -> Result<Progress> {
        let parsed = options::parse(payload)?;

        if let Some(blksize) = parsed.blksize {
            self.blksize = blksize;
        }
        if let Some(tsize) = parsed.tsize {
            if tsize > 0 {
                self.presize(consumer, tsize).await?;
            }
        }
        let mut joined_group = None;
        if let Some(mc) = &parsed.multicast {
            self.send_ack = mc.master_client;
            if let (Some(addr), Some(port)) = (mc.addr, mc.port) {
                let group = SocketAddrV4::new(addr, port);
                self.multicast = Some(MulticastSocket::join(group).await?);
                joined_group = Some((group, mc.master_client));
            }
        }

        AuditLogger::options_negotiated(
            &self.correlation_id,
            self.blksize,
            parsed.tsize,
            parsed.multicast.is_some(),
        );
        if let Some((group, master_client)) = joined_group {
            AuditLogger::multicast_joined(&self.correlation_id, &group.to_string(), master_client);
        }

        self.timer.reset();
        self.timer.start();
        if self.send_ack {
            self.send_ack(self.bitmap.first_gap()).await?;
        }
        Ok(Progress::Continue)
    }

    async fn handle_data(
        &mut self,
        consumer: &mut dyn Consumer,
        wire_block: u16,
        payload: Bytes,
    ) -> Result<Progress> {
        let first_gap_before = self.bitmap.first_gap();

        if wire_block == 0 && first_gap_before == 0 {
            return Err(TftpError::Protocol(
                "received wire block 0 before any block was received".to_string(),
            ));
        }

        let epoch_base = first_gap_before & !0xFFFF_usize;
        let b_adj: usize = if wire_block == 0 {
            65536
        } else {
            wire_block as usize
        };
        let internal_block = epoch_base + (b_adj - 1);

        let offset = internal_block as u64 * self.blksize as u64;
        let length = payload.len();

        self.presize(consumer, offset + length as u64).await?;

        consumer.seek(offset).await?;
        consumer.deliver(&payload).await?;

        self.bitmap.set(internal_block);
        match self.highest_block {
            Some((hi, _)) if hi >= internal_block => {}
            _ => self.highest_block = Some((internal_block, length)),
        }

        self.timer.reset();
        self.timer.start();

        if self.send_ack {
            let ack_block = self.bitmap.first_gap();
            self.send_ack(ack_block).await?;
        }

        let done = self.bitmap.full()
            && self
                .highest_block
                .is_some_and(|(_, len)| len < self.blksize);

        Ok(if done { Progress::Done } else { Progress::Continue })
    }

    /// Grows the filesize lower bound and the bitmap to match, without
    /// ever shrinking either. Called from `tsize` (when present and
    /// nonzero) and from every observed DATA block's `(offset, len)`. When
    /// the lower bound actually raises `filesize`, notifies the consumer
    /// of the new length via the `seek(filesize); seek(0)` pair before
    /// returning, so a file-backed consumer can preallocate.
    async fn presize(&mut self, consumer: &mut dyn Consumer, lower_bound: u64) -> Result<()> {
        let grew = presize_raw(
            &mut self.filesize,
            &mut self.tsize,
            &mut self.bitmap,
            self.blksize,
            lower_bound,
        );
        if grew {
            consumer.seek(self.filesize).await?;
            consumer.seek(0).await?;
        }
        Ok(())
    }

    async fn send_rrq(&mut self) -> Result<()> {
        let buf = codec::encode_rrq(
            &self.wire_filename,
            self.blksize,
            self.flags.rrq_sizes,
            self.flags.rrq_multicast,
        );
        self.unicast.send_to(&buf, self.server_addr).await?;
        self.last_action = LastAction::Rrq;
        Ok(())
    }

    async fn send_ack(&mut self, block: usize) -> Result<()> {
        let peer = self.peer.unwrap_or(self.server_addr);
        let buf = codec::encode_ack((block % 65536) as u16);
        self.unicast.send_to(&buf, peer).await?;
        self.last_action = LastAction::Ack(block);
        Ok(())
    }

    async fn resend_last(&mut self) -> Result<()> {
        match self.last_action {
            LastAction::Rrq => self.send_rrq().await,
            LastAction::Ack(block) => self.send_ack(block).await,
        }
    }

    /// MTFTP_RECOVERY, peer set: rebind the unicast socket to drop any
    /// stale TID binding, then resend RRQ and fall back to waiting for a
    /// first reply.
    async fn reopen_unicast_for_recovery(&mut self) -> Result<()> {
        self.unicast = UnicastSocket::bind(self.server_addr).await?;
        self.peer = None;
        self.send_ack = false;
        Ok(())
    }

    /// MTFTP_RECOVERY exceeded its fallback cap: give up on multicast
    /// entirely and restart as a plain classic-TFTP transfer.
    async fn fallback_to_plain_tftp(&mut self) -> Result<()> {
        self.flags = OpenFlags {
            rrq_sizes: true,
            rrq_multicast: false,
            mtftp_recovery: false,
        };
        self.multicast = None;
        self.bitmap = BlockBitmap::new();
        self.highest_block = None;
        self.filesize = 0;
        self.tsize = 0;
        self.server_addr = SocketAddr::new(self.server_addr.ip(), crate::DEFAULT_TFTP_PORT);
        self.unicast = UnicastSocket::bind(self.server_addr).await?;
        self.send_rrq().await
    }
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Unicast,
    Multicast,
}

async fn recv_multicast(
    socket: Option<&MulticastSocket>,
    buf: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(m) => m.socket.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

/// Grows `filesize`/`tsize` to `lower_bound` and the bitmap to match,
/// returning whether `filesize` actually grew. The bitmap is sized to
/// `floor(filesize/blksize) + 1`: the `+1` accounts for the mandatory
/// end-of-file block (every transfer ends in a block shorter than
/// `blksize`, even when the file length is an exact multiple of it).
fn presize_raw(
    filesize: &mut u64,
    tsize: &mut u64,
    bitmap: &mut BlockBitmap,
    blksize: usize,
    lower_bound: u64,
) -> bool {
    let grew = lower_bound > *filesize;
    if grew {
        *filesize = lower_bound;
    }
    if lower_bound > *tsize {
        *tsize = lower_bound;
    }
    let blocks = (*filesize as usize) / blksize.max(1) + 1;
    bitmap.resize(blocks);
    grew
}

fn scheme_name(scheme: Scheme) -> &'static str {
    match scheme {
        Scheme::Tftp => "tftp",
        Scheme::Tftm => "tftm",
        Scheme::Mtftp => "mtftp",
    }
}
