//! UDP probe (spec §4.C "UDP"). Port 53 gets a well-formed DNS query for
//! `google.com A`; any other port gets a user payload or the literal
//! `PING`. Grounded loosely in the teacher's DNS-query construction in
//! `checker.rs::dns_lookup`, but UDP itself is new — the teacher never had
//! a raw-socket probe.

use std::net::UdpSocket as StdUdpSocket;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};

/// Build a minimal, well-formed DNS query packet for `google.com A`.
/// Pure, independently testable byte-construction — no network I/O.
pub fn build_dns_probe_query() -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    // Header: id=0x1234, flags=standard query (recursion desired), 1 question.
    buf.extend_from_slice(&[0x12, 0x34]); // ID
    buf.extend_from_slice(&[0x01, 0x00]); // flags: RD=1
    buf.extend_from_slice(&[0x00, 0x01]); // QDCOUNT=1
    buf.extend_from_slice(&[0x00, 0x00]); // ANCOUNT=0
    buf.extend_from_slice(&[0x00, 0x00]); // NSCOUNT=0
    buf.extend_from_slice(&[0x00, 0x00]); // ARCOUNT=0
    for label in "google.com".split('.') {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0x00); // root label
    buf.extend_from_slice(&[0x00, 0x01]); // QTYPE=A
    buf.extend_from_slice(&[0x00, 0x01]); // QCLASS=IN
    buf
}

fn payload_for(port: u16) -> Vec<u8> {
    if port == 53 {
        build_dns_probe_query()
    } else {
        b"PING".to_vec()
    }
}

pub async fn probe(monitor: &Monitor) -> Observation {
    let (hostname, resolved) = match super::preflight(monitor).await {
        Ok(v) => v,
        Err(obs) => return obs,
    };

    let port = match monitor.effective_port() {
        Some(p) => p,
        None => {
            let mut obs = Observation::new(false, 0, Status::Down);
            obs.error_type = Some(ErrorType::InvalidInput);
            obs.error_message = Some("UDP monitor requires a port".into());
            return obs;
        }
    };

    let bind_addr = if resolved.address.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let std_sock = match StdUdpSocket::bind(bind_addr) {
        Ok(s) => s,
        Err(e) => return network_error(&e.to_string()),
    };
    std_sock.set_nonblocking(true).ok();
    let socket = match UdpSocket::from_std(std_sock) {
        Ok(s) => s,
        Err(e) => return network_error(&e.to_string()),
    };

    let remote = std::net::SocketAddr::new(resolved.address, port);
    if let Err(e) = socket.connect(remote).await {
        return network_error(&e.to_string());
    }

    let payload = payload_for(port);
    let start = Instant::now();
    if let Err(e) = socket.send(&payload).await {
        return classify_send_or_recv_error(&e, monitor, &hostname).await;
    }

    let mut buf = [0u8; 512];
    let recv = tokio::time::timeout(Duration::from_millis(monitor.timeout_ms as u64), socket.recv(&mut buf)).await;
    let elapsed_ms = start.elapsed().as_millis() as u32;

    match recv {
        Ok(Ok(n)) if n > 0 => {
            let health = if elapsed_ms > monitor.degraded_threshold_ms { Status::Degraded } else { Status::Up };
            Observation::new(true, elapsed_ms, health)
        }
        Ok(Ok(_)) => Observation::new(true, elapsed_ms, Status::Up),
        Ok(Err(e)) => classify_send_or_recv_error(&e, monitor, &hostname).await,
        Err(_) => {
            // Timeout: lenient by default (firewalls commonly swallow UDP).
            if monitor.strict_mode {
                let mut obs = Observation::new(false, elapsed_ms, Status::Down);
                obs.error_type = Some(ErrorType::UdpNoResponse);
                obs
            } else {
                let mut obs = Observation::new(true, elapsed_ms, Status::Up);
                obs.error_type = Some(ErrorType::UdpNoResponse);
                obs
            }
        }
    }
}

async fn classify_send_or_recv_error(e: &std::io::Error, monitor: &Monitor, hostname: &str) -> Observation {
    let mut obs = Observation::new(false, 0, Status::Down);
    if e.kind() == std::io::ErrorKind::ConnectionRefused {
        // ICMP port-unreachable surfaces as ECONNREFUSED on a connected UDP socket.
        obs.error_type = Some(ErrorType::UdpPortUnreachable);
        obs.error_message = Some("ICMP port unreachable".into());
        return obs;
    }
    obs.error_type = Some(ErrorType::NetworkError);
    obs.error_message = Some(e.to_string());
    // "On any UDP error, if a DNS lookup of the hostname still succeeds,
    // the result carries a fallbackUsed=dns annotation."
    if crate::resolver::resolve(hostname).await.is_ok() {
        obs.meta = serde_json::json!({ "fallbackUsed": "dns" });
    }
    let _ = monitor;
    obs
}

fn network_error(message: &str) -> Observation {
    let mut obs = Observation::new(false, 0, Status::Down);
    obs.error_type = Some(ErrorType::NetworkError);
    obs.error_message = Some(message.to_string());
    obs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_probe_query_is_well_formed() {
        let q = build_dns_probe_query();
        assert_eq!(&q[0..2], &[0x12, 0x34]);
        assert_eq!(q[q.len() - 4..q.len() - 2], [0x00, 0x01]); // QTYPE A
        assert_eq!(&q[q.len() - 2..], &[0x00, 0x01]); // QCLASS IN
        // "google" label length prefix.
        assert_eq!(q[12], 6);
        assert_eq!(&q[13..19], b"google");
    }
}
