use serde::{Deserialize, Serialize};
use tracing::{Level, event};

/// Structured transfer-lifecycle events: what a single read transfer can
/// emit, from open through option negotiation to completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RequestOpened {
        #[serde(flatten)]
        common: CommonFields,
        uri: String,
        scheme: String,
    },

    OptionsNegotiated {
        #[serde(flatten)]
        common: CommonFields,
        blksize: usize,
        tsize: Option<u64>,
        multicast: bool,
    },

    MulticastJoined {
        #[serde(flatten)]
        common: CommonFields,
        group: String,
        master_client: bool,
    },

    MtftpFallback {
        #[serde(flatten)]
        common: CommonFields,
        consecutive_timeouts: u32,
    },

    TransferCompleted {
        #[serde(flatten)]
        common: CommonFields,
        bytes_transferred: u64,
        duration_ms: u64,
    },

    TransferFailed {
        #[serde(flatten)]
        common: CommonFields,
        reason: String,
        status_code: u32,
    },

    ProtocolViolation {
        #[serde(flatten)]
        common: CommonFields,
        detail: String,
    },
}

/// Fields common to every audit record (NIST 800-53 AU-3: content of
/// audit records).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonFields {
    pub timestamp: String,
    pub hostname: String,
    pub service: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl CommonFields {
    pub fn new(severity: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
            service: "tftp-client".to_string(),
            severity: severity.to_string(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(severity: &str, correlation_id: String) -> Self {
        let mut fields = Self::new(severity);
        fields.correlation_id = Some(correlation_id);
        fields
    }
}

impl AuditEvent {
    pub fn log(&self) {
        let severity = self.severity();
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"error\": \"failed to serialize audit event: {self:?}\"}}"));

        match severity.as_str() {
            "error" => event!(Level::ERROR, audit_event = %json),
            "warn" => event!(Level::WARN, audit_event = %json),
            _ => event!(Level::INFO, audit_event = %json),
        }
    }

    fn severity(&self) -> String {
        match self {
            AuditEvent::RequestOpened { common, .. }
            | AuditEvent::OptionsNegotiated { common, .. }
            | AuditEvent::MulticastJoined { common, .. }
            | AuditEvent::TransferCompleted { common, .. } => common.severity.clone(),

            AuditEvent::MtftpFallback { common, .. } => common.severity.clone(),

            AuditEvent::TransferFailed { common, .. } | AuditEvent::ProtocolViolation { common, .. } => {
                common.severity.clone()
            }
        }
    }
}

pub struct AuditLogger;

impl AuditLogger {
    /// Generates a correlation ID so every event for one transfer can be
    /// grepped together: `<unix_millis>-<uri_hash>`.
    pub fn generate_correlation_id(uri: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        uri.hash(&mut hasher);
        let hash = hasher.finish();

        format!(
            "{:x}-{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            hash
        )
    }

    pub fn request_opened(correlation_id: &str, uri: &str, scheme: &str) {
        AuditEvent::RequestOpened {
            common: CommonFields::with_correlation("info", correlation_id.to_string()),
            uri: uri.to_string(),
            scheme: scheme.to_string(),
        }
        .log();
    }

    pub fn options_negotiated(correlation_id: &str, blksize: usize, tsize: Option<u64>, multicast: bool) {
        AuditEvent::OptionsNegotiated {
            common: CommonFields::with_correlation("info", correlation_id.to_string()),
            blksize,
            tsize,
            multicast,
        }
        .log();
    }

    pub fn multicast_joined(correlation_id: &str, group: &str, master_client: bool) {
        AuditEvent::MulticastJoined {
            common: CommonFields::with_correlation("info", correlation_id.to_string()),
            group: group.to_string(),
            master_client,
        }
        .log();
    }

    pub fn mtftp_fallback(correlation_id: &str, consecutive_timeouts: u32) {
        AuditEvent::MtftpFallback {
            common: CommonFields::with_correlation("warn", correlation_id.to_string()),
            consecutive_timeouts,
        }
        .log();
    }

    pub fn transfer_completed(correlation_id: &str, bytes_transferred: u64, duration_ms: u64) {
        AuditEvent::TransferCompleted {
            common: CommonFields::with_correlation("info", correlation_id.to_string()),
            bytes_transferred,
            duration_ms,
        }
        .log();
    }

    pub fn transfer_failed(correlation_id: &str, reason: &str, status_code: u32) {
        AuditEvent::TransferFailed {
            common: CommonFields::with_correlation("error", correlation_id.to_string()),
            reason: reason.to_string(),
            status_code,
        }
        .log();
    }

    pub fn protocol_violation(correlation_id: &str, detail: &str) {
        AuditEvent::ProtocolViolation {
            common: CommonFields::with_correlation("error", correlation_id.to_string()),
            detail: detail.to_string(),
        }
        .log();
    }
}
