//! Error taxonomy (spec §7) and the outer error type for genuinely
//! exceptional, non-probe-domain failures.

use serde::{Deserialize, Serialize};

/// Flat string enum covering every family in spec §7. This is the single
/// source of truth for `errorType` on `Observation`, `Classification`,
/// `Check`, and `Incident`. Probes and the classifier always resolve to one
/// of these — they never propagate a raw I/O error to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    // Input
    MissingTarget,
    InvalidUrl,
    ProtocolMismatch,
    MalformedStructure,
    InvalidInput,
    // DNS
    DnsNotFound,
    DnsServerFailure,
    DnsTimeout,
    DnsSlow,
    // TCP
    ConnectionRefused,
    ConnectionTimeout,
    HostUnreachable,
    NetworkUnreachable,
    ConnectionReset,
    // HTTP
    HttpInformational,
    HttpSuccess,
    HttpRedirect,
    HttpClientError,
    HttpServerError,
    HttpRateLimit,
    HttpTimeout,
    HighLatency,
    RedirectLoop,
    // SSL
    CertExpired,
    CertExpiringSoon,
    SelfSignedCert,
    CertHostnameMismatch,
    CertChainError,
    WeakSignature,
    CertRevoked,
    // SMTP
    SmtpNoBanner,
    SmtpServiceUnavailable,
    SmtpTransactionFailed,
    SmtpTemporarilyUnavailable,
    SmtpAuthFailed,
    SmtpConnectFailed,
    // UDP
    UdpPortUnreachable,
    UdpNoResponse,
    // PING
    PacketLoss,
    HighPingLatency,
    HostUnreachablePing,
    // Security
    SsrfBlocked,
    SsrfProtection,
    // Generic
    NetworkError,
    UnknownError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::MissingTarget => "MISSING_TARGET",
            ErrorType::InvalidUrl => "INVALID_URL",
            ErrorType::ProtocolMismatch => "PROTOCOL_MISMATCH",
            ErrorType::MalformedStructure => "MALFORMED_STRUCTURE",
            ErrorType::InvalidInput => "INVALID_INPUT",
            ErrorType::DnsNotFound => "DNS_NOT_FOUND",
            ErrorType::DnsServerFailure => "DNS_SERVER_FAILURE",
            ErrorType::DnsTimeout => "DNS_TIMEOUT",
            ErrorType::DnsSlow => "DNS_SLOW",
            ErrorType::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorType::ConnectionTimeout => "CONNECTION_TIMEOUT",
            ErrorType::HostUnreachable => "HOST_UNREACHABLE",
            ErrorType::NetworkUnreachable => "NETWORK_UNREACHABLE",
            ErrorType::ConnectionReset => "CONNECTION_RESET",
            ErrorType::HttpInformational => "HTTP_INFORMATIONAL",
            ErrorType::HttpSuccess => "HTTP_SUCCESS",
            ErrorType::HttpRedirect => "HTTP_REDIRECT",
            ErrorType::HttpClientError => "HTTP_CLIENT_ERROR",
            ErrorType::HttpServerError => "HTTP_SERVER_ERROR",
            ErrorType::HttpRateLimit => "HTTP_RATE_LIMIT",
            ErrorType::HttpTimeout => "HTTP_TIMEOUT",
            ErrorType::HighLatency => "HIGH_LATENCY",
            ErrorType::RedirectLoop => "REDIRECT_LOOP",
            ErrorType::CertExpired => "CERT_EXPIRED",
            ErrorType::CertExpiringSoon => "CERT_EXPIRING_SOON",
            ErrorType::SelfSignedCert => "SELF_SIGNED_CERT",
            ErrorType::CertHostnameMismatch => "CERT_HOSTNAME_MISMATCH",
            ErrorType::CertChainError => "CERT_CHAIN_ERROR",
            ErrorType::WeakSignature => "WEAK_SIGNATURE",
            ErrorType::CertRevoked => "CERT_REVOKED",
            ErrorType::SmtpNoBanner => "SMTP_NO_BANNER",
            ErrorType::SmtpServiceUnavailable => "SMTP_SERVICE_UNAVAILABLE",
            ErrorType::SmtpTransactionFailed => "SMTP_TRANSACTION_FAILED",
            ErrorType::SmtpTemporarilyUnavailable => "SMTP_TEMPORARILY_UNAVAILABLE",
            ErrorType::SmtpAuthFailed => "SMTP_AUTH_FAILED",
            ErrorType::SmtpConnectFailed => "SMTP_CONNECT_FAILED",
            ErrorType::UdpPortUnreachable => "UDP_PORT_UNREACHABLE",
            ErrorType::UdpNoResponse => "UDP_NO_RESPONSE",
            ErrorType::PacketLoss => "PACKET_LOSS",
            ErrorType::HighPingLatency => "HIGH_PING_LATENCY",
            ErrorType::HostUnreachablePing => "HOST_UNREACHABLE_PING",
            ErrorType::SsrfBlocked => "SSRF_BLOCKED",
            ErrorType::SsrfProtection => "SSRF_PROTECTION",
            ErrorType::NetworkError => "NETWORK_ERROR",
            ErrorType::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outer error type for failures that are not a classifiable probe outcome:
/// store I/O, lock-backend connectivity, queue-backend connectivity, config.
/// Per spec §9, probes never raise this for expected failure modes — only
/// the Check Runner's outer boundary and the Scheduler see it.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("lock backend error: {0}")]
    Lock(String),
    #[error("queue backend error: {0}")]
    Queue(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
