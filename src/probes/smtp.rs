//! SMTP probe (spec §4.C "SMTP"). Raw line-oriented protocol handling
//! over a plain `TcpStream`, upgraded to TLS via `tokio_rustls` on
//! STARTTLS -- new territory for the teacher, grounded in its socket
//! idioms (`tokio::io::AsyncWriteExt`/`AsyncReadExt`) and `ssl.rs`'s
//! TLS connector setup for the STARTTLS upgrade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};

/// Read SMTP reply lines until one without a `-` continuation marker at
/// column 4 (`250-` vs `250 `). Returns the numeric reply code of the
/// final line.
async fn read_reply<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<(u16, String)> {
    let mut last_line = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed mid-reply"));
        }
        last_line = line.clone();
        let continues = line.len() > 3 && line.as_bytes()[3] == b'-';
        if !continues {
            break;
        }
    }
    let code = last_line.get(0..3).and_then(|s| s.parse::<u16>().ok()).unwrap_or(0);
    Ok((code, last_line.trim().to_string()))
}

async fn send_line<W: AsyncWriteExt + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await
}

enum AttemptOutcome {
    Up,
    Degraded { error_type: ErrorType, message: String },
    Down { error_type: ErrorType, message: String },
}

async fn attempt(addr: std::net::IpAddr, port: u16, hostname: &str, budget: Duration) -> AttemptOutcome {
    let fut = async {
        let stream = TcpStream::connect((addr, port))
            .await
            .map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpConnectFailed, message: e.to_string() })?;
        let mut reader = BufReader::new(stream);

        let (code, line) = read_reply(&mut reader).await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpNoBanner, message: e.to_string() })?;
        if code == 250 {
            return Err(AttemptOutcome::Down { error_type: ErrorType::SmtpConnectFailed, message: format!("interception detected: got 250 banner instead of 220: {line}") });
        }
        if code != 220 {
            return Err(AttemptOutcome::Down { error_type: ErrorType::SmtpNoBanner, message: format!("unexpected banner: {line}") });
        }

        send_line(reader.get_mut(), "EHLO pulse-guard").await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpConnectFailed, message: e.to_string() })?;
        let (code, line) = read_reply(&mut reader).await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: e.to_string() })?;
        if code == 421 {
            return Err(AttemptOutcome::Degraded { error_type: ErrorType::SmtpTemporarilyUnavailable, message: line });
        }
        if code != 250 {
            return Err(AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: format!("EHLO failed: {line}") });
        }

        if port == 587 {
            send_line(reader.get_mut(), "STARTTLS").await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: e.to_string() })?;
            let (code, line) = read_reply(&mut reader).await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: e.to_string() })?;
            if code != 220 {
                return Err(AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: format!("STARTTLS refused: {line}") });
            }

            let tcp = reader.into_inner();
            let tls_config = rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(super::ssl::AcceptAnyCert))
                .with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(tls_config));
            let server_name = ServerName::try_from(hostname.to_string()).map_err(|_| AttemptOutcome::Down { error_type: ErrorType::InvalidInput, message: "invalid SNI hostname".into() })?;
            let tls_stream = connector.connect(server_name, tcp).await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: format!("TLS upgrade failed: {e}") })?;
            let mut tls_reader = BufReader::new(tls_stream);

            send_line(tls_reader.get_mut(), "EHLO pulse-guard").await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: e.to_string() })?;
            let (code, line) = read_reply(&mut tls_reader).await.map_err(|e| AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: e.to_string() })?;
            if code != 250 {
                return Err(AttemptOutcome::Down { error_type: ErrorType::SmtpTransactionFailed, message: format!("post-STARTTLS EHLO failed: {line}") });
            }
            let _ = tls_reader.get_mut().get_mut().0.shutdown().await;
        } else {
            let _ = reader.get_mut().shutdown().await;
        }

        Ok(AttemptOutcome::Up)
    };

    match tokio::time::timeout(budget, fut).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(outcome)) => outcome,
        Err(_) => AttemptOutcome::Down { error_type: ErrorType::SmtpConnectFailed, message: "per-address budget exceeded".into() },
    }
}

pub async fn probe(monitor: &Monitor) -> Observation {
    if let Err(failure) = crate::validator::validate(&monitor.target, monitor.protocol) {
        let mut obs = Observation::new(false, 0, Status::Down);
        obs.error_type = Some(failure.error_type);
        obs.error_message = Some(failure.message);
        return obs;
    }

    let hostname = super::extract_hostname(&monitor.target, monitor.protocol);
    let addresses = match crate::resolver::resolve_all(&hostname).await {
        Ok(a) => a,
        Err(failure) => {
            let mut obs = Observation::new(false, 0, Status::Down);
            obs.error_type = Some(failure.error_type);
            obs.error_message = Some(failure.message);
            return obs;
        }
    };

    let port = monitor.effective_port().unwrap_or(25);
    let n = addresses.len().max(1) as u32;
    let budget = Duration::from_millis((monitor.timeout_ms / n).max(8_000) as u64);

    let start = Instant::now();
    let mut last_error: Option<(ErrorType, String)> = None;

    for resolved in &addresses {
        match attempt(resolved.address, port, &hostname, budget).await {
            AttemptOutcome::Up => {
                let elapsed_ms = start.elapsed().as_millis() as u32;
                let health = if elapsed_ms > monitor.degraded_threshold_ms { Status::Degraded } else { Status::Up };
                return Observation::new(true, elapsed_ms, health);
            }
            AttemptOutcome::Degraded { error_type, message } => {
                let elapsed_ms = start.elapsed().as_millis() as u32;
                let mut obs = Observation::new(true, elapsed_ms, Status::Degraded);
                obs.error_type = Some(error_type);
                obs.error_message = Some(message);
                return obs;
            }
            AttemptOutcome::Down { error_type, message } => {
                last_error = Some((error_type, message));
            }
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u32;
    let mut obs = Observation::new(false, elapsed_ms, Status::Down);
    let (error_type, message) = last_error.unwrap_or((ErrorType::SmtpConnectFailed, "no addresses to try".into()));
    obs.error_type = Some(error_type);
    obs.error_message = Some(message);
    obs
}
