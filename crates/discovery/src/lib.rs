//! mDNS broker discovery.
//!
//! When an agent has a token but no endpoint, it looks the broker up
//! on the local network: the broker advertises itself as
//! `<service>._http._tcp.local.` with an optional `tls=true` TXT
//! property. Resolution yields a ready-to-dial endpoint URL.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent};
use tracing::debug;

/// Service instance name brokers advertise under by default.
pub const DEFAULT_SERVICE: &str = "zencelium";

/// mDNS service type the broker registers with.
pub const SERVICE_TYPE: &str = "_http._tcp.local.";

/// How long to wait for the broker to answer.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(String),

    #[error("no broker found for service {0:?}")]
    NotFound(String),
}

/// URL scheme of the resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Http,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Http => "http",
        }
    }
}

/// Resolves the broker endpoint via multicast DNS.
///
/// Browses for `<service>._http._tcp.local.` and returns
/// `<scheme>[s]://<ipv4>:<port>/`, appending the `s` when the service
/// advertises `tls=true`. Fails with [`DiscoveryError::NotFound`] when
/// nothing resolves within [`RESOLVE_TIMEOUT`].
pub async fn resolve_endpoint(service: &str, scheme: Scheme) -> Result<String, DiscoveryError> {
    resolve_with_timeout(service, scheme, RESOLVE_TIMEOUT).await
}

/// [`resolve_endpoint`] with a caller-supplied deadline.
pub async fn resolve_with_timeout(
    service: &str,
    scheme: Scheme,
    timeout: Duration,
) -> Result<String, DiscoveryError> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| DiscoveryError::Mdns(format!("failed to create mDNS daemon: {e}")))?;
    let receiver = daemon
        .browse(SERVICE_TYPE)
        .map_err(|e| DiscoveryError::Mdns(format!("failed to browse mDNS: {e}")))?;

    let wanted = format!("{service}.{SERVICE_TYPE}");
    let deadline = Instant::now() + timeout;
    let mut found = None;

    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = tokio::time::timeout(
            remaining.min(Duration::from_millis(200)),
            tokio::task::spawn_blocking({
                let receiver = receiver.clone();
                move || receiver.recv_timeout(Duration::from_millis(100))
            }),
        )
        .await;

        let Ok(Ok(Ok(ServiceEvent::ServiceResolved(info)))) = event else {
            continue;
        };
        if info.get_fullname() != wanted {
            debug!(fullname = %info.get_fullname(), "ignoring unrelated service");
            continue;
        }
        let Some(ip) = pick_ipv4(info.get_addresses().iter().copied()) else {
            continue;
        };
        let tls = info
            .get_property_val_str("tls")
            .is_some_and(|v| v == "true");
        found = Some(format_endpoint(scheme, tls, ip, info.get_port()));
        break;
    }

    let _ = daemon.shutdown();
    found.ok_or_else(|| DiscoveryError::NotFound(service.to_owned()))
}

/// Prefers a routable IPv4; falls back to loopback when that is all
/// the broker advertises.
fn pick_ipv4(addresses: impl Iterator<Item = std::net::IpAddr>) -> Option<Ipv4Addr> {
    let v4: Vec<Ipv4Addr> = addresses
        .filter_map(|ip| match ip {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .collect();
    v4.iter()
        .find(|ip| !ip.is_loopback() && !ip.is_link_local())
        .or_else(|| v4.first())
        .copied()
}

fn format_endpoint(scheme: Scheme, tls: bool, ip: Ipv4Addr, port: u16) -> String {
    let suffix = if tls { "s" } else { "" };
    format!("{}{suffix}://{ip}:{port}/", scheme.as_str())
}
