//! DNS probe (spec §4.C "DNS"). A forward lookup of the monitor's
//! hostname that reuses the Secure Resolver, but reports the DNS lookup
//! itself as the probed service rather than a means to an end. Grounded
//! in the teacher's `checker.rs::dns_lookup` / `execute_dns_check`.

use std::time::Instant;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};
use crate::resolver::ResolveFailure;

const DEGRADED_THRESHOLD_MS: u32 = 1_000;

pub async fn probe(monitor: &Monitor) -> Observation {
    if let Err(failure) = crate::validator::validate(&monitor.target, monitor.protocol) {
        let mut obs = Observation::new(false, 0, Status::Down);
        obs.error_type = Some(failure.error_type);
        obs.error_message = Some(failure.message);
        return obs;
    }

    let hostname = super::extract_hostname(&monitor.target, monitor.protocol);
    let start = Instant::now();
    let result = tokio::time::timeout(
        std::time::Duration::from_millis(monitor.timeout_ms as u64),
        crate::resolver::resolve(&hostname),
    )
    .await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match result {
        Ok(Ok(_addr)) => {
            if elapsed_ms > DEGRADED_THRESHOLD_MS {
                let mut obs = Observation::new(true, elapsed_ms, Status::Degraded);
                obs.error_type = Some(ErrorType::DnsSlow);
                obs.error_message = Some(format!("{elapsed_ms}ms exceeds {DEGRADED_THRESHOLD_MS}ms threshold"));
                obs
            } else {
                Observation::new(true, elapsed_ms, Status::Up)
            }
        }
        // A lookup that resolves to a private IP is still a DOWN, but with
        // SSRF_BLOCKED rather than DNS_NOT_FOUND -- the name resolved fine.
        Ok(Err(ResolveFailure { error_type: ErrorType::SsrfProtection, message })) => {
            let mut obs = Observation::new(false, elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::SsrfBlocked);
            obs.error_message = Some(message);
            obs
        }
        Ok(Err(ResolveFailure { error_type, message })) => {
            let mut obs = Observation::new(false, elapsed_ms, Status::Down);
            obs.error_type = Some(error_type);
            obs.error_message = Some(message);
            obs
        }
        Err(_) => {
            let mut obs = Observation::new(false, elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::DnsTimeout);
            obs.error_message = Some("lookup timed out".into());
            obs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    fn base_monitor(target: &str) -> Monitor {
        Monitor {
            id: "m1".into(),
            owner: "o1".into(),
            target: target.into(),
            protocol: Protocol::Dns,
            port: None,
            interval_minutes: 1,
            timeout_ms: 2000,
            degraded_threshold_ms: 2000,
            ssl_expiry_threshold_days: 14,
            allow_unauthorized: false,
            strict_mode: false,
            active: true,
            alert_threshold: 2,
            total_checks: 0,
            successful_checks: 0,
            consecutive_failures: 0,
            consecutive_degraded: 0,
            consecutive_slow_count: 0,
            last_checked: None,
            last_response_time: None,
            current_status: Status::Unknown,
            uptime_percentage: 100.0,
            last_24h_uptime: 100.0,
            pending_severity: None,
        }
    }

    #[tokio::test]
    async fn ip_literal_target_rejected_by_validator() {
        // Rule 4.A.7: DNS monitors forbid IP literals as the target.
        let monitor = base_monitor("1.1.1.1");
        let obs = probe(&monitor).await;
        assert!(!obs.is_up);
        assert_eq!(obs.error_type, Some(ErrorType::InvalidInput));
    }

    #[tokio::test]
    async fn resolving_to_private_ip_is_ssrf_blocked_not_dns_not_found() {
        let monitor = base_monitor("localhost.example-does-not-exist-pulseguard.invalid");
        let obs = probe(&monitor).await;
        assert!(!obs.is_up);
        // Either genuinely NXDOMAIN or, if some resolver hijacks it, SSRF_BLOCKED --
        // both are acceptable DOWN outcomes for a name with no real public record.
        assert!(matches!(obs.error_type, Some(ErrorType::DnsNotFound) | Some(ErrorType::SsrfBlocked)));
    }
}
