//! Component C: the Protocol Probe Set (spec §4.C). Each submodule
//! implements one protocol against the shared `Observation` contract
//! (spec §4.C / models.rs). Every network-bound probe pre-calls the
//! Validator and the Secure Resolver, then connects to the resolved IP
//! while keeping the original hostname for SNI/Host (DNS-rebinding
//! defence).

pub mod dns;
pub mod http;
pub mod ping;
pub mod smtp;
pub mod ssl;
pub mod tcp;
pub mod udp;

use crate::error::ErrorType;
use crate::models::{Monitor, Observation, Status};
use crate::resolver::{self, ResolveFailure};

/// Shared pre-flight: validate the target, then resolve it through the
/// Secure Resolver. Returns an already-terminal `Observation` on failure so
/// every probe can `if let Some(obs) = preflight(...).await { return obs }`.
pub(crate) async fn preflight(monitor: &Monitor) -> Result<(String, resolver::ResolvedAddress), Observation> {
    if let Err(failure) = crate::validator::validate(&monitor.target, monitor.protocol) {
        return Err(terminal_observation(failure.error_type, failure.message));
    }

    let hostname = extract_hostname(&monitor.target, monitor.protocol);

    match resolver::resolve(&hostname).await {
        Ok(addr) => Ok((hostname, addr)),
        Err(ResolveFailure { error_type, message }) => Err(terminal_observation(error_type, message)),
    }
}

fn terminal_observation(error_type: ErrorType, message: String) -> Observation {
    let mut obs = Observation::new(false, 0, Status::Down);
    obs.error_type = Some(error_type);
    obs.error_message = Some(message);
    obs
}

/// Pull the bare hostname out of a monitor target for DNS resolution,
/// regardless of whether it's a URL, `host:port`, or bare host.
pub(crate) fn extract_hostname(target: &str, protocol: crate::models::Protocol) -> String {
    use crate::models::Protocol;
    if matches!(protocol, Protocol::Http | Protocol::Https) {
        let normalized = if target.contains("://") { target.to_string() } else { format!("http://{target}") };
        if let Ok(url) = url::Url::parse(&normalized) {
            return url.host_str().unwrap_or(target).to_string();
        }
    }
    if let Some(rest) = target.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return rest[..end].to_string();
        }
    }
    if target.matches(':').count() == 1 {
        return target.split(':').next().unwrap_or(target).to_string();
    }
    target.to_string()
}
