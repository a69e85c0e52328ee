//! TCP probe (spec §4.C "TCP"). Grounded in the teacher's
//! `checker.rs::execute_tcp_check`, generalized with the Secure Resolver
//! and DNS-rebinding-safe connect.

use std::time::{Duration, Instant};

use tokio::net::TcpStream;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};

pub async fn probe(monitor: &Monitor) -> Observation {
    let (_, resolved) = match super::preflight(monitor).await {
        Ok(v) => v,
        Err(obs) => return obs,
    };

    let port = match monitor.effective_port() {
        Some(p) => p,
        None => {
            let mut obs = Observation::new(false, 0, Status::Down);
            obs.error_type = Some(ErrorType::InvalidInput);
            obs.error_message = Some("TCP monitor requires a port".into());
            return obs;
        }
    };

    let addr = std::net::SocketAddr::new(resolved.address, port);
    let start = Instant::now();
    let result = tokio::time::timeout(Duration::from_millis(monitor.timeout_ms as u64), TcpStream::connect(addr)).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match result {
        Ok(Ok(_stream)) => {
            let health = if elapsed_ms > monitor.degraded_threshold_ms { Status::Degraded } else { Status::Up };
            let mut obs = Observation::new(true, elapsed_ms, health);
            if health == Status::Degraded {
                obs.error_message = Some(format!("connect time {elapsed_ms}ms exceeds {}ms threshold", monitor.degraded_threshold_ms));
            }
            obs
        }
        Ok(Err(e)) => {
            let error_type = classify_connect_error(&e);
            let mut obs = Observation::new(false, elapsed_ms, Status::Down);
            obs.error_type = Some(error_type);
            obs.error_message = Some(e.to_string());
            obs
        }
        Err(_) => {
            let mut obs = Observation::new(false, elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::ConnectionTimeout);
            obs.error_message = Some("connect timed out".into());
            obs
        }
    }
}

fn classify_connect_error(e: &std::io::Error) -> ErrorType {
    use std::io::ErrorKind::*;
    match e.kind() {
        ConnectionRefused => ErrorType::ConnectionRefused,
        ConnectionReset => ErrorType::ConnectionReset,
        TimedOut => ErrorType::ConnectionTimeout,
        _ => {
            // io::ErrorKind doesn't distinguish host-vs-network unreachable
            // portably; fall back on the OS error code where available.
            match e.raw_os_error() {
                Some(113) => ErrorType::HostUnreachable, // EHOSTUNREACH (Linux)
                Some(101) => ErrorType::NetworkUnreachable, // ENETUNREACH (Linux)
                _ => ErrorType::NetworkError,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    fn base_monitor(target: &str, port: Option<u16>) -> Monitor {
        Monitor {
            id: "m1".into(),
            owner: "o1".into(),
            target: target.into(),
            protocol: Protocol::Tcp,
            port,
            interval_minutes: 1,
            timeout_ms: 500,
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
    async fn connect_refused_on_closed_port() {
        let monitor = base_monitor("127.0.0.1", Some(1));
        // Loopback target bypasses SSRF only because preflight validates
        // via the validator first -- 127.0.0.1 is private, so this should
        // short-circuit as SSRF_PROTECTION rather than attempt to connect.
        let obs = probe(&monitor).await;
        assert!(!obs.is_up);
        assert_eq!(obs.error_type, Some(ErrorType::SsrfProtection));
    }

    #[tokio::test]
    async fn missing_port_is_invalid_input() {
        let monitor = base_monitor("1.1.1.1", None);
        let obs = probe(&monitor).await;
        assert_eq!(obs.error_type, Some(ErrorType::InvalidInput));
    }
}
