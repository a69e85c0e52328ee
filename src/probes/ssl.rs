//! SSL probe (spec §4.C "SSL"). TLS-connects with certificate
//! verification fully disabled (a custom `rustls` verifier that accepts
//! anything) so the peer chain can be collected even when invalid, then
//! inspects it. New territory for the teacher — grounded in the wider
//! corpus's use of `rustls`/`x509-parser` for certificate introspection
//! rather than any one teacher file.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};

#[derive(Debug)]
pub(crate) struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(&self, _message: &[u8], _cert: &CertificateDer<'_>, _dss: &DigitallySignedStruct) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(&self, _message: &[u8], _cert: &CertificateDer<'_>, _dss: &DigitallySignedStruct) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CertSummary {
    pub valid_from: chrono::DateTime<chrono::Utc>,
    pub valid_to: chrono::DateTime<chrono::Utc>,
    pub days_until_expiry: i64,
    pub self_signed: bool,
    pub weak_signature: bool,
    pub hostname_matches: bool,
}

#[derive(Debug, Clone)]
pub struct SslFailure {
    pub error_type: ErrorType,
    pub message: String,
}

fn client_config() -> rustls::ClientConfig {
    let mut cfg = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    cfg.key_log = Arc::new(rustls::KeyLogFile::new());
    cfg
}

/// Wildcard SAN matches exactly one additional label: `*.example.com`
/// matches `sub.example.com` but not `a.sub.example.com` or `example.com`.
fn san_matches(pattern: &str, hostname: &str) -> bool {
    if pattern == hostname {
        return true;
    }
    if let Some(rest) = pattern.strip_prefix("*.") {
        if let Some(sub) = hostname.strip_suffix(rest) {
            let sub = sub.strip_suffix('.').unwrap_or(sub);
            return !sub.is_empty() && !sub.contains('.');
        }
    }
    false
}

fn weak_signature_oid(oid: &x509_parser::der_parser::oid::Oid) -> bool {
    // sha1WithRSAEncryption, md5WithRSAEncryption, and their ecdsa-with-SHA1 cousin.
    const SHA1_RSA: &str = "1.2.840.113549.1.1.5";
    const MD5_RSA: &str = "1.2.840.113549.1.1.4";
    const ECDSA_SHA1: &str = "1.2.840.10045.4.1";
    let s = oid.to_id_string();
    s == SHA1_RSA || s == MD5_RSA || s == ECDSA_SHA1
}

/// Connect to `(addr, port)`, perform a TLS handshake using `hostname` for
/// SNI, and inspect the leaf certificate. Never verifies the chain; that's
/// exactly the point -- we want the cert even when it's garbage.
pub async fn inspect(hostname: &str, addr: IpAddr, port: u16, timeout_ms: u32) -> Result<CertSummary, SslFailure> {
    let fut = async {
        let tcp = TcpStream::connect((addr, port))
            .await
            .map_err(|e| SslFailure { error_type: ErrorType::ConnectionRefused, message: e.to_string() })?;

        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|_| SslFailure { error_type: ErrorType::InvalidInput, message: format!("invalid SNI hostname {hostname}") })?;

        let connector = TlsConnector::from(Arc::new(client_config()));
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| SslFailure { error_type: ErrorType::CertChainError, message: e.to_string() })?;

        let (_, conn) = tls.get_ref();
        let chain = conn
            .peer_certificates()
            .ok_or_else(|| SslFailure { error_type: ErrorType::CertChainError, message: "server presented no certificate".into() })?;
        let leaf = chain.first().ok_or_else(|| SslFailure { error_type: ErrorType::CertChainError, message: "empty certificate chain".into() })?;

        let (_, parsed) = x509_parser::parse_x509_certificate(leaf.as_ref())
            .map_err(|e| SslFailure { error_type: ErrorType::CertChainError, message: e.to_string() })?;

        let validity = parsed.validity();
        let valid_from = chrono::DateTime::from_timestamp(validity.not_before.timestamp(), 0).unwrap_or_default();
        let valid_to = chrono::DateTime::from_timestamp(validity.not_after.timestamp(), 0).unwrap_or_default();
        let days_until_expiry = (valid_to - chrono::Utc::now()).num_days();

        let self_signed = parsed.issuer() == parsed.subject();
        let weak_signature = weak_signature_oid(&parsed.signature_algorithm.algorithm);

        let mut hostname_matches = false;
        if let Ok(Some(san)) = parsed.subject_alternative_name() {
            for name in &san.value.general_names {
                if let x509_parser::extensions::GeneralName::DNSName(dns) = name {
                    if san_matches(dns, hostname) {
                        hostname_matches = true;
                        break;
                    }
                }
            }
        }
        if !hostname_matches {
            if let Some(cn) = parsed.subject().iter_common_name().next().and_then(|a| a.as_str().ok()) {
                hostname_matches = san_matches(cn, hostname);
            }
        }

        Ok(CertSummary { valid_from, valid_to, days_until_expiry, self_signed, weak_signature, hostname_matches })
    };

    tokio::time::timeout(Duration::from_millis(timeout_ms as u64), fut)
        .await
        .map_err(|_| SslFailure { error_type: ErrorType::ConnectionTimeout, message: "TLS handshake timed out".into() })?
}

/// Standalone SSL protocol probe (as opposed to the HTTPS cross-check in
/// `http.rs`, which calls `inspect` directly).
pub async fn probe(monitor: &Monitor) -> Observation {
    let (hostname, resolved) = match super::preflight(monitor).await {
        Ok(v) => v,
        Err(obs) => return obs,
    };
    let port = monitor.effective_port().unwrap_or(443);

    let start = Instant::now();
    let result = inspect(&hostname, resolved.address, port, monitor.timeout_ms).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match result {
        Ok(summary) => observation_from_summary(&summary, elapsed_ms, monitor.ssl_expiry_threshold_days),
        Err(failure) => {
            let mut obs = Observation::new(false, elapsed_ms, Status::Down);
            obs.error_type = Some(failure.error_type);
            obs.error_message = Some(failure.message);
            obs
        }
    }
}

/// `SslInfo` the runner attaches to the resulting `Check`, carried through
/// `Observation::meta` since the probe contract has no dedicated field for it.
pub(crate) fn ssl_info_json(summary: &CertSummary) -> serde_json::Value {
    serde_json::json!({
        "valid_from": summary.valid_from.to_rfc3339(),
        "valid_to": summary.valid_to.to_rfc3339(),
        "days_remaining": summary.days_until_expiry,
        "valid": summary.days_until_expiry >= 0 && summary.hostname_matches,
    })
}

pub fn observation_from_summary(summary: &CertSummary, elapsed_ms: u32, expiry_threshold_days: i64) -> Observation {
    if summary.days_until_expiry < 0 {
        let mut obs = Observation::new(false, elapsed_ms, Status::Down);
        obs.error_type = Some(ErrorType::CertExpired);
        obs.error_message = Some(format!("certificate expired {} days ago", -summary.days_until_expiry));
        obs.meta = ssl_info_json(summary);
        return obs;
    }
    if !summary.hostname_matches {
        let mut obs = Observation::new(false, elapsed_ms, Status::Down);
        obs.error_type = Some(ErrorType::CertHostnameMismatch);
        obs.error_message = Some("certificate does not cover this hostname".into());
        obs.meta = ssl_info_json(summary);
        return obs;
    }
    if summary.days_until_expiry < expiry_threshold_days {
        let mut obs = Observation::new(true, elapsed_ms, Status::Degraded);
        obs.error_type = Some(ErrorType::CertExpiringSoon);
        obs.error_message = Some(format!("certificate expires in {} days", summary.days_until_expiry));
        obs.meta = ssl_info_json(summary);
        return obs;
    }
    if summary.self_signed {
        let mut obs = Observation::new(true, elapsed_ms, Status::Degraded);
        obs.error_type = Some(ErrorType::SelfSignedCert);
        obs.error_message = Some("certificate is self-signed".into());
        obs.meta = ssl_info_json(summary);
        return obs;
    }
    if summary.weak_signature {
        let mut obs = Observation::new(true, elapsed_ms, Status::Degraded);
        obs.error_type = Some(ErrorType::WeakSignature);
        obs.error_message = Some("certificate uses a weak signature algorithm".into());
        obs.meta = ssl_info_json(summary);
        return obs;
    }
    let mut obs = Observation::new(true, elapsed_ms, Status::Up);
    obs.meta = ssl_info_json(summary);
    obs
}

// OCSP revocation checking is deliberately deferred: no crate in the
// dependency stack speaks the OCSP request/response protocol, and per the
// probe contract an unknown/unsupported/failed OCSP lookup is ignored
// rather than treated as DOWN. `check_ocsp` always returns `Unknown`, which
// callers must treat as "no information" rather than "revoked".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcspStatus {
    Revoked,
    Good,
    Unknown,
}

pub async fn check_ocsp(_summary: &CertSummary) -> OcspStatus {
    OcspStatus::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_one_label_only() {
        assert!(san_matches("*.example.com", "sub.example.com"));
        assert!(!san_matches("*.example.com", "a.sub.example.com"));
        assert!(!san_matches("*.example.com", "example.com"));
    }

    #[test]
    fn exact_match() {
        assert!(san_matches("example.com", "example.com"));
        assert!(!san_matches("example.com", "other.com"));
    }

    #[test]
    fn expired_cert_is_down() {
        let summary = CertSummary {
            valid_from: chrono::Utc::now() - chrono::Duration::days(400),
            valid_to: chrono::Utc::now() - chrono::Duration::days(1),
            days_until_expiry: -1,
            self_signed: false,
            weak_signature: false,
            hostname_matches: true,
        };
        let obs = observation_from_summary(&summary, 10, 14);
        assert!(!obs.is_up);
        assert_eq!(obs.error_type, Some(ErrorType::CertExpired));
    }

    #[test]
    fn hostname_mismatch_is_down_even_if_not_expired() {
        let summary = CertSummary {
            valid_from: chrono::Utc::now() - chrono::Duration::days(10),
            valid_to: chrono::Utc::now() + chrono::Duration::days(300),
            days_until_expiry: 300,
            self_signed: false,
            weak_signature: false,
            hostname_matches: false,
        };
        let obs = observation_from_summary(&summary, 10, 14);
        assert!(!obs.is_up);
        assert_eq!(obs.error_type, Some(ErrorType::CertHostnameMismatch));
    }

    #[test]
    fn expiring_soon_degrades_but_stays_up() {
        let summary = CertSummary {
            valid_from: chrono::Utc::now() - chrono::Duration::days(350),
            valid_to: chrono::Utc::now() + chrono::Duration::days(5),
            days_until_expiry: 5,
            self_signed: false,
            weak_signature: false,
            hostname_matches: true,
        };
        let obs = observation_from_summary(&summary, 10, 14);
        assert!(obs.is_up);
        assert_eq!(obs.health_state, Status::Degraded);
        assert_eq!(obs.error_type, Some(ErrorType::CertExpiringSoon));
    }

    #[test]
    fn healthy_cert_is_up_clean() {
        let summary = CertSummary {
            valid_from: chrono::Utc::now() - chrono::Duration::days(10),
            valid_to: chrono::Utc::now() + chrono::Duration::days(300),
            days_until_expiry: 300,
            self_signed: false,
            weak_signature: false,
            hostname_matches: true,
        };
        let obs = observation_from_summary(&summary, 10, 14);
        assert!(obs.is_up);
        assert_eq!(obs.health_state, Status::Up);
        assert_eq!(obs.error_type, None);
    }

    #[tokio::test]
    async fn ocsp_is_always_unknown_best_effort() {
        let summary = CertSummary {
            valid_from: chrono::Utc::now(),
            valid_to: chrono::Utc::now() + chrono::Duration::days(1),
            days_until_expiry: 1,
            self_signed: false,
            weak_signature: false,
            hostname_matches: true,
        };
        assert_eq!(check_ocsp(&summary).await, OcspStatus::Unknown);
    }
}
