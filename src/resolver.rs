//! Component B: Secure Resolver (spec §4.B).
//!
//! Resolves a hostname to an address, applying the private-IP policy to
//! every resolved address (not just the first), and returns the first
//! public address. Grounded in the teacher's `checker.rs::dns_lookup`
//! (same `hickory_resolver` client), generalized with the SSRF guard the
//! teacher never implemented.

use std::net::IpAddr;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;

use crate::error::ErrorType;

/// SERVFAIL and a lookup timeout are distinguishable failure modes of the
/// resolver itself; anything else (NXDOMAIN included) collapses to
/// `DNS_NOT_FOUND` -- there's no record, full stop.
fn classify_lookup_error(e: &ResolveError) -> ErrorType {
    match e.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } if *response_code == ResponseCode::ServFail => ErrorType::DnsServerFailure,
        ResolveErrorKind::Timeout => ErrorType::DnsTimeout,
        _ => ErrorType::DnsNotFound,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone)]
pub struct ResolvedAddress {
    pub address: IpAddr,
    pub family: AddressFamily,
}

#[derive(Debug, Clone)]
pub struct ResolveFailure {
    pub error_type: ErrorType,
    pub message: String,
}

/// Blocks IPv4 127/8, 10/8, 192.168/16, 172.16/12, 169.254/16 and IPv6 ::1,
/// fc00::/7, fe80::/10. IPv4-mapped IPv6 is unwrapped first.
pub fn is_private(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            if v6.is_loopback() {
                return true;
            }
            let seg0 = v6.segments()[0];
            // fc00::/7 -> top 7 bits of first segment are 1111 110x
            if seg0 & 0xfe00 == 0xfc00 {
                return true;
            }
            // fe80::/10 -> top 10 bits are 1111 1110 10
            if seg0 & 0xffc0 == 0xfe80 {
                return true;
            }
            false
        }
    }
}

fn is_private_v4(v4: &std::net::Ipv4Addr) -> bool {
    let o = v4.octets();
    o[0] == 127
        || o[0] == 10
        || (o[0] == 192 && o[1] == 168)
        || (o[0] == 172 && (16..=31).contains(&o[1]))
        || (o[0] == 169 && o[1] == 254)
}

/// Look up every A/AAAA record for `hostname`; if any resolved address is
/// private, reject the whole hostname with `SSRF_PROTECTION`. Otherwise
/// return the first public address.
pub async fn resolve(hostname: &str) -> Result<ResolvedAddress, ResolveFailure> {
    // A bare IP literal skips DNS but still goes through the policy check.
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        if is_private(&ip) {
            return Err(ResolveFailure {
                error_type: ErrorType::SsrfProtection,
                message: format!("{hostname} is a private address"),
            });
        }
        let family = if ip.is_ipv4() { AddressFamily::V4 } else { AddressFamily::V6 };
        return Ok(ResolvedAddress { address: ip, family });
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let mut v4_addrs: Vec<IpAddr> = Vec::new();
    let mut v6_addrs: Vec<IpAddr> = Vec::new();
    let mut last_error: Option<ResolveError> = None;

    match resolver.ipv4_lookup(hostname).await {
        Ok(resp) => v4_addrs.extend(
            resp.iter()
                .filter_map(|rec| rec.to_string().parse::<std::net::Ipv4Addr>().ok())
                .map(IpAddr::V4),
        ),
        Err(e) => last_error = Some(e),
    }
    match resolver.ipv6_lookup(hostname).await {
        Ok(resp) => v6_addrs.extend(
            resp.iter()
                .filter_map(|rec| rec.to_string().parse::<std::net::Ipv6Addr>().ok())
                .map(IpAddr::V6),
        ),
        Err(e) => last_error = Some(e),
    }

    if v4_addrs.is_empty() && v6_addrs.is_empty() {
        let error_type = last_error.as_ref().map(classify_lookup_error).unwrap_or(ErrorType::DnsNotFound);
        return Err(ResolveFailure {
            error_type,
            message: format!("no A/AAAA records for {hostname}"),
        });
    }

    let all: Vec<&IpAddr> = v4_addrs.iter().chain(v6_addrs.iter()).collect();
    if all.iter().any(|ip| is_private(ip)) {
        return Err(ResolveFailure {
            error_type: ErrorType::SsrfProtection,
            message: format!("{hostname} resolves to a private address"),
        });
    }

    if let Some(ip) = v4_addrs.into_iter().next() {
        return Ok(ResolvedAddress { address: ip, family: AddressFamily::V4 });
    }
    let ip = v6_addrs.into_iter().next().expect("checked non-empty above");
    Ok(ResolvedAddress { address: ip, family: AddressFamily::V6 })
}

/// Resolve every public A/AAAA record, IPv6 first. Used by probes (SMTP)
/// that need to try multiple addresses rather than just the first.
pub async fn resolve_all(hostname: &str) -> Result<Vec<ResolvedAddress>, ResolveFailure> {
    if hostname.parse::<IpAddr>().is_ok() {
        return resolve(hostname).await.map(|r| vec![r]);
    }

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

    let mut v4_addrs: Vec<IpAddr> = Vec::new();
    let mut v6_addrs: Vec<IpAddr> = Vec::new();
    let mut last_error: Option<ResolveError> = None;

    match resolver.ipv4_lookup(hostname).await {
        Ok(resp) => v4_addrs.extend(resp.iter().filter_map(|rec| rec.to_string().parse::<std::net::Ipv4Addr>().ok()).map(IpAddr::V4)),
        Err(e) => last_error = Some(e),
    }
    match resolver.ipv6_lookup(hostname).await {
        Ok(resp) => v6_addrs.extend(resp.iter().filter_map(|rec| rec.to_string().parse::<std::net::Ipv6Addr>().ok()).map(IpAddr::V6)),
        Err(e) => last_error = Some(e),
    }

    if v4_addrs.is_empty() && v6_addrs.is_empty() {
        let error_type = last_error.as_ref().map(classify_lookup_error).unwrap_or(ErrorType::DnsNotFound);
        return Err(ResolveFailure { error_type, message: format!("no A/AAAA records for {hostname}") });
    }

    if v4_addrs.iter().chain(v6_addrs.iter()).any(is_private) {
        return Err(ResolveFailure { error_type: ErrorType::SsrfProtection, message: format!("{hostname} resolves to a private address") });
    }

    let mut out: Vec<ResolvedAddress> = v6_addrs.into_iter().map(|a| ResolvedAddress { address: a, family: AddressFamily::V6 }).collect();
    out.extend(v4_addrs.into_iter().map(|a| ResolvedAddress { address: a, family: AddressFamily::V4 }));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn blocks_ipv4_private_ranges() {
        for s in ["127.0.0.1", "10.0.0.1", "192.168.1.10", "172.16.0.1", "172.31.255.255", "169.254.1.1"] {
            let ip: IpAddr = s.parse().unwrap();
            assert!(is_private(&ip), "{s} should be private");
        }
        for s in ["1.1.1.1", "8.8.8.8", "93.184.216.34"] {
            let ip: IpAddr = s.parse().unwrap();
            assert!(!is_private(&ip), "{s} should be public");
        }
    }

    #[test]
    fn blocks_ipv6_private_ranges() {
        assert!(is_private(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(is_private(&"fc00::1".parse::<IpAddr>().unwrap()));
        assert!(is_private(&"fe80::1".parse::<IpAddr>().unwrap()));
        assert!(!is_private(&"2606:4700:4700::1111".parse::<IpAddr>().unwrap()));
    }

    #[test]
    fn unwraps_ipv4_mapped_ipv6() {
        let mapped = Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x0a00, 0x0001); // ::ffff:10.0.0.1
        assert!(is_private(&IpAddr::V6(mapped)));
    }

    #[tokio::test]
    async fn ip_literal_private_rejected_without_dns() {
        let err = resolve("192.168.1.10").await.unwrap_err();
        assert_eq!(err.error_type, ErrorType::SsrfProtection);
    }

    #[tokio::test]
    async fn ip_literal_public_resolves() {
        let resolved = resolve("1.1.1.1").await.unwrap();
        assert_eq!(resolved.address, "1.1.1.1".parse::<IpAddr>().unwrap());
    }
}
