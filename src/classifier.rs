//! Component D: Status Classifier (spec §4.D).
//!
//! Pure function: `Observation -> Classification`. This is the single
//! source of truth for error semantics — probes never set the final
//! `status` themselves. Grounded in the teacher's
//! `checker.rs::check_rt_threshold`, generalized into the full decision
//! table per protocol family.

use crate::error::ErrorType;
use crate::models::{Classification, Confidence, Observation, Protocol, Status};

/// Classify an HTTP/HTTPS observation. Rules applied in order (spec §4.D).
pub fn classify_http(obs: &Observation, degraded_threshold_ms: u32, max_redirects: u32, redirect_count: u32) -> Classification {
    let timeout_exceeded = obs.status_code.is_none();

    // 1. No status code -> DOWN, HTTP_TIMEOUT.
    if timeout_exceeded {
        return Classification {
            status: Status::Down,
            confidence: Confidence::HIGH,
            error_type: Some(ErrorType::HttpTimeout),
            reason: obs.error_message.clone().unwrap_or_else(|| "request timed out".into()),
            severity: 1.0,
        };
    }
    let code = obs.status_code.unwrap();

    // 2. 1xx informational.
    if (100..200).contains(&code) {
        return Classification {
            status: Status::Degraded,
            confidence: Confidence::MEDIUM,
            error_type: Some(ErrorType::HttpInformational),
            reason: format!("informational response {code}"),
            severity: 0.6,
        };
    }

    // 3. 2xx success, possibly degraded by latency.
    if (200..300).contains(&code) {
        if obs.response_time_ms > degraded_threshold_ms {
            let t = degraded_threshold_ms.max(1) as f64;
            let over = (obs.response_time_ms as f64 - t) / t;
            let severity = (over * 0.6).clamp(0.0, 0.9);
            return Classification {
                status: Status::Degraded,
                confidence: Confidence::MEDIUM,
                error_type: Some(ErrorType::HighLatency),
                reason: format!("{}ms exceeds {}ms threshold", obs.response_time_ms, degraded_threshold_ms),
                severity,
            };
        }
        return Classification {
            status: Status::Up,
            confidence: Confidence::HIGH,
            error_type: Some(ErrorType::HttpSuccess),
            reason: format!("{code} OK"),
            severity: 0.0,
        };
    }

    // 4. 3xx redirects.
    if (300..400).contains(&code) {
        if redirect_count > max_redirects {
            return Classification {
                status: Status::Down,
                confidence: Confidence::HIGH,
                error_type: Some(ErrorType::RedirectLoop),
                reason: format!("redirect chain exceeded {max_redirects}"),
                severity: 1.0,
            };
        }
        return Classification {
            status: Status::Up,
            confidence: Confidence::HIGH,
            error_type: Some(ErrorType::HttpRedirect),
            reason: format!("{code} redirect"),
            severity: 0.0,
        };
    }

    // 5. 429 rate limit.
    if code == 429 {
        return Classification {
            status: Status::Degraded,
            confidence: Confidence::MEDIUM,
            error_type: Some(ErrorType::HttpRateLimit),
            reason: "rate limited".into(),
            severity: 0.6,
        };
    }

    // 6. Other 4xx.
    if (400..500).contains(&code) {
        let severity = if code == 404 { 1.0 } else { 0.9 };
        return Classification {
            status: Status::Down,
            confidence: Confidence::HIGH,
            error_type: Some(ErrorType::HttpClientError),
            reason: format!("client error {code}"),
            severity,
        };
    }

    // 7. 5xx.
    Classification {
        status: Status::Down,
        confidence: Confidence::HIGH,
        error_type: Some(ErrorType::HttpServerError),
        reason: format!("server error {code}"),
        severity: 1.0,
    }
}

/// Classify a non-HTTP observation (TCP/UDP/DNS/SMTP/SSL/PING). These
/// probes already resolve a specific `ErrorType` and `health_state`
/// per spec §4.C, so the classifier's job is narrower: derive confidence
/// and severity, and promote DEGRADED->UP/DOWN transitions that are purely
/// a function of elapsed time vs threshold (already done by the probe) —
/// this is effectively a confidence/severity attachment pass.
pub fn classify_generic(obs: &Observation, degraded_threshold_ms: u32) -> Classification {
    let confidence = match obs.health_state {
        Status::Up if obs.error_type.is_none() => Confidence::HIGH,
        // Strict-mode UDP timeout: the probe can't distinguish a dead
        // service from a firewall silently dropping the reply, so a
        // DOWN verdict here is weaker than a refused connection.
        Status::Down if obs.error_type == Some(ErrorType::UdpNoResponse) => Confidence::LOW,
        Status::Down => Confidence::HIGH,
        Status::Degraded => Confidence::MEDIUM,
        _ => Confidence::LOW,
    };

    let severity = match obs.health_state {
        Status::Up => 0.0,
        Status::Degraded => {
            if let Some(loss) = obs.packet_loss_percent {
                (loss / 100.0) * 0.8
            } else if obs.response_time_ms > degraded_threshold_ms && degraded_threshold_ms > 0 {
                let t = degraded_threshold_ms as f64;
                (((obs.response_time_ms as f64 - t) / t) * 0.6).clamp(0.0, 0.9)
            } else {
                0.5
            }
        }
        Status::Down => 1.0,
        Status::Unknown => 0.3,
    };

    Classification {
        status: obs.health_state,
        confidence,
        error_type: obs.error_type,
        reason: obs.error_message.clone().unwrap_or_else(|| obs.health_state.to_string()),
        severity,
    }
}

/// Dispatch classification by protocol.
pub fn classify(
    protocol: Protocol,
    obs: &Observation,
    degraded_threshold_ms: u32,
    max_redirects: u32,
    redirect_count: u32,
) -> Classification {
    match protocol {
        Protocol::Http | Protocol::Https => classify_http(obs, degraded_threshold_ms, max_redirects, redirect_count),
        _ => classify_generic(obs, degraded_threshold_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs_with_code(code: u16, rt: u32) -> Observation {
        let mut o = Observation::new(true, rt, Status::Up);
        o.status_code = Some(code);
        o
    }

    #[test]
    fn purity_same_input_same_output() {
        let obs = obs_with_code(200, 100);
        let a = classify_http(&obs, 2000, 10, 0);
        let b = classify_http(&obs, 2000, 10, 0);
        assert_eq!(a.status, b.status);
        assert_eq!(a.error_type, b.error_type);
        assert_eq!(a.severity, b.severity);
    }

    #[test]
    fn no_status_code_is_timeout() {
        let obs = Observation::new(false, 30_000, Status::Down);
        let c = classify_http(&obs, 2000, 10, 0);
        assert_eq!(c.status, Status::Down);
        assert_eq!(c.error_type, Some(ErrorType::HttpTimeout));
        assert_eq!(c.severity, 1.0);
    }

    #[test]
    fn informational_1xx_is_degraded() {
        let c = classify_http(&obs_with_code(103, 50), 2000, 10, 0);
        assert_eq!(c.status, Status::Degraded);
        assert_eq!(c.error_type, Some(ErrorType::HttpInformational));
        assert_eq!(c.severity, 0.6);
    }

    #[test]
    fn fast_2xx_is_up() {
        let c = classify_http(&obs_with_code(200, 250), 2000, 10, 0);
        assert_eq!(c.status, Status::Up);
        assert_eq!(c.error_type, Some(ErrorType::HttpSuccess));
    }

    #[test]
    fn slow_2xx_is_degraded_high_latency() {
        let c = classify_http(&obs_with_code(200, 4000), 2000, 10, 0);
        assert_eq!(c.status, Status::Degraded);
        assert_eq!(c.error_type, Some(ErrorType::HighLatency));
        assert!(c.severity > 0.0 && c.severity <= 0.9);
    }

    #[test]
    fn redirect_within_limit_is_up_over_limit_is_down() {
        let c = classify_http(&obs_with_code(301, 50), 2000, 10, 10);
        assert_eq!(c.status, Status::Up);
        let c = classify_http(&obs_with_code(301, 50), 2000, 10, 11);
        assert_eq!(c.status, Status::Down);
        assert_eq!(c.error_type, Some(ErrorType::RedirectLoop));
    }

    #[test]
    fn rate_limit_429_is_degraded() {
        let c = classify_http(&obs_with_code(429, 50), 2000, 10, 0);
        assert_eq!(c.status, Status::Degraded);
        assert_eq!(c.error_type, Some(ErrorType::HttpRateLimit));
    }

    #[test]
    fn client_error_severity_404_vs_other() {
        let c = classify_http(&obs_with_code(404, 50), 2000, 10, 0);
        assert_eq!(c.severity, 1.0);
        let c = classify_http(&obs_with_code(403, 50), 2000, 10, 0);
        assert_eq!(c.severity, 0.9);
    }

    #[test]
    fn server_error_5xx_is_down() {
        let c = classify_http(&obs_with_code(500, 50), 2000, 10, 0);
        assert_eq!(c.status, Status::Down);
        assert_eq!(c.error_type, Some(ErrorType::HttpServerError));
        assert_eq!(c.severity, 1.0);
    }
}
