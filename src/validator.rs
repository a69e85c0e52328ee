//! Component A: URL/Target Validator (spec §4.A).
//!
//! Rules are applied in order, first failure wins, mirroring the teacher's
//! inline validation blocks in `routes.rs::create_monitor` generalized to
//! all eight protocols and pulled out into a pure, independently testable
//! function.

use crate::error::ErrorType;
use crate::models::Protocol;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub error_type: ErrorType,
    pub message: String,
}

pub type ValidationResult = Result<(), ValidationFailure>;

fn fail(error_type: ErrorType, message: impl Into<String>) -> ValidationFailure {
    ValidationFailure { error_type, message: message.into() }
}

const BAD_HOSTNAME_CHARS: &[char] = &['<', '>', '[', ']', '|', '{', '}', '^', '`'];

/// Validate a monitor's target against its protocol. Pure function — no I/O.
pub fn validate(target: &str, protocol: Protocol) -> ValidationResult {
    // 1. Empty or whitespace-only target.
    if target.trim().is_empty() {
        return Err(fail(ErrorType::MissingTarget, "target is empty"));
    }

    let is_http_family = matches!(protocol, Protocol::Http | Protocol::Https);

    // 2. Explicit scheme must be http/https for HTTP family; auto-prefix if absent.
    let normalized = if is_http_family {
        if let Some(idx) = target.find("://") {
            let scheme = &target[..idx];
            if scheme != "http" && scheme != "https" {
                return Err(fail(
                    ErrorType::ProtocolMismatch,
                    format!("scheme '{scheme}' is not http/https"),
                ));
            }
            target.to_string()
        } else {
            format!("http://{target}")
        }
    } else {
        target.to_string()
    };

    // 3. Triple-slash pattern scheme:///...
    if let Some(idx) = normalized.find("://") {
        let rest = &normalized[idx + 3..];
        if rest.starts_with('/') {
            return Err(fail(ErrorType::MalformedStructure, "triple-slash URL structure"));
        }
    }

    if is_http_family {
        let url = url::Url::parse(&normalized)
            .map_err(|e| fail(ErrorType::InvalidUrl, format!("unparsable URL: {e}")))?;
        let host = url.host_str().unwrap_or("");
        // 4. Empty hostname.
        if host.is_empty() {
            return Err(fail(ErrorType::InvalidUrl, "empty hostname"));
        }
        validate_hostname_chars(host)?;
        validate_reserved_hostname(host)?;
        return Ok(());
    }

    // Non-HTTP protocols: the target is a bare host[:port], an IPv6 literal,
    // or bracketed `[ipv6]:port`.
    let host = extract_host(&normalized);
    if host.is_empty() {
        return Err(fail(ErrorType::InvalidUrl, "empty hostname"));
    }
    validate_hostname_chars(host)?;
    validate_reserved_hostname(host)?;

    // 7. DNS monitors forbid IP literals.
    if protocol == Protocol::Dns && host.parse::<std::net::IpAddr>().is_ok() {
        return Err(fail(ErrorType::InvalidInput, "DNS monitor target must be a hostname, not an IP"));
    }

    Ok(())
}

/// Extract the host portion of a non-HTTP target, distinguishing a
/// `host:port` pair from a bare IPv6 literal (which itself contains
/// colons). Bracketed `[ipv6]:port` is the unambiguous case; a string with
/// exactly one colon is `host:port`; anything else (zero or 2+ colons) is
/// treated as a bare host.
fn extract_host(target: &str) -> &str {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    if target.matches(':').count() == 1 {
        return target.split(':').next().unwrap_or(target);
    }
    target
}

fn validate_hostname_chars(host: &str) -> ValidationResult {
    // 5. Hostname containing disallowed characters or whitespace.
    if host.chars().any(|c| BAD_HOSTNAME_CHARS.contains(&c) || c.is_whitespace() || c == '\\') {
        return Err(fail(ErrorType::InvalidUrl, "hostname contains invalid characters"));
    }
    Ok(())
}

fn validate_reserved_hostname(host: &str) -> ValidationResult {
    // 6. Operational policy: localhost / .local / .internal / .localhost rejected.
    let lower = host.to_ascii_lowercase();
    if lower == "localhost"
        || lower.ends_with(".local")
        || lower.ends_with(".internal")
        || lower.ends_with(".localhost")
    {
        return Err(fail(ErrorType::InvalidUrl, "reserved hostname is not monitorable"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_target_is_missing() {
        let err = validate("", Protocol::Http).unwrap_err();
        assert_eq!(err.error_type, ErrorType::MissingTarget);
        let err = validate("   ", Protocol::Http).unwrap_err();
        assert_eq!(err.error_type, ErrorType::MissingTarget);
    }

    #[test]
    fn bare_host_is_auto_prefixed() {
        assert!(validate("example.test", Protocol::Http).is_ok());
    }

    #[test]
    fn non_http_scheme_is_protocol_mismatch() {
        let err = validate("ftp://example.test", Protocol::Http).unwrap_err();
        assert_eq!(err.error_type, ErrorType::ProtocolMismatch);
    }

    #[test]
    fn triple_slash_is_malformed() {
        let err = validate("http:///x", Protocol::Http).unwrap_err();
        assert_eq!(err.error_type, ErrorType::MalformedStructure);
    }

    #[test]
    fn invalid_hostname_chars_rejected() {
        let err = validate("http://exa mple.test", Protocol::Http).unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidUrl);
        let err = validate("http://exa<mple.test", Protocol::Http).unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidUrl);
    }

    #[test]
    fn reserved_hostnames_rejected() {
        for host in ["localhost", "http://foo.local", "http://foo.internal", "http://foo.localhost"] {
            let err = validate(host, Protocol::Http).unwrap_err();
            assert_eq!(err.error_type, ErrorType::InvalidUrl);
        }
    }

    #[test]
    fn dns_monitor_rejects_ip_literal() {
        let err = validate("1.2.3.4", Protocol::Dns).unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidInput);
        let err = validate("1.2.3.4:53", Protocol::Dns).unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidInput);
        assert!(validate("example.test", Protocol::Dns).is_ok());
    }

    #[test]
    fn ipv6_only_host_parses_distinct_from_host_port() {
        // Bare IPv6 literal (not ::1, which is reserved) validates fine for TCP.
        assert!(validate("2001:db8::1", Protocol::Tcp).is_ok());
        // Bracketed IPv6 + port also validates.
        assert!(validate("[2001:db8::1]:8080", Protocol::Tcp).is_ok());
        // `::1` is the IPv6 loopback; it isn't caught by the reserved-name
        // check (that's a hostname-string check) but callers relying on
        // the Secure Resolver's private-IP policy (component B) will still
        // block it pre-connect.
        assert!(validate("::1", Protocol::Tcp).is_ok());
    }
}
