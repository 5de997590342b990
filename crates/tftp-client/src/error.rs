use thiserror::Error;

#[derive(Error, Debug)]
pub enum TftpError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("file not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("unsupported operation")]
    Unsupported,

    #[error("invalid blksize value: {0}")]
    InvalidBlksize(String),

    #[error("invalid tsize value: {0}")]
    InvalidTsize(String),

    #[error("multicast option missing port field")]
    MulticastMissingPort,

    #[error("multicast option missing mc field")]
    MulticastMissingMc,

    #[error("multicast option has invalid mc flag: {0}")]
    MulticastInvalidMc(String),

    #[error("multicast option has invalid address: {0}")]
    MulticastInvalidIp(String),

    #[error("multicast option has invalid port: {0}")]
    MulticastInvalidPort(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("consumer closed the transfer")]
    ConsumerClosed,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TftpError>;

impl TftpError {
    /// Maps a wire ERROR packet's numeric code (RFC 1350 section 5) to the
    /// closest matching variant. Codes this client never expects to see on
    /// a read (DiskFull, FileAlreadyExists, NoSuchUser) fold into
    /// `Unsupported`, matching `OptionNegotiationFailed`.
    pub fn from_wire_error_code(code: u16) -> Self {
        match code {
            1 => TftpError::NotFound,
            2 => TftpError::PermissionDenied,
            4 => TftpError::Unsupported,
            _ => TftpError::Unsupported,
        }
    }

    /// Numeric status surfaced to the consumer's `close`.
    pub fn status_code(&self) -> u32 {
        match self {
            TftpError::InvalidArgument(_) => 1,
            TftpError::OutOfMemory => 2,
            TftpError::Timeout => 3,
            TftpError::Network(_) => 4,
            TftpError::NotFound => 5,
            TftpError::PermissionDenied => 6,
            TftpError::Unsupported => 7,
            TftpError::InvalidBlksize(_) => 8,
            TftpError::InvalidTsize(_) => 9,
            TftpError::MulticastMissingPort => 10,
            TftpError::MulticastMissingMc => 11,
            TftpError::MulticastInvalidMc(_) => 12,
            TftpError::MulticastInvalidIp(_) => 13,
            TftpError::MulticastInvalidPort(_) => 14,
            TftpError::Protocol(_) => 15,
            TftpError::ConsumerClosed => 16,
            TftpError::Other(_) => 255,
        }
    }
}
