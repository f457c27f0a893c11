// ovpn-connect - Connectivity Probe
// Best-effort reachability diagnostics for the VPN endpoint, run
// before the daemon is launched. Every signal here is fire-and-log;
// nothing in this module can change the bring-up result.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::net::{TcpStream, UdpSocket};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{Endpoint, Transport};

const PING_COUNT: u32 = 4;
const PING_TIMEOUT_SECS: u32 = 2;
const TRANSPORT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a single probe signal
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: &'static str,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeResult {
    fn ok(name: &'static str) -> Self {
        Self {
            name,
            success: true,
            latency_ms: None,
            detail: None,
        }
    }

    fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            success: false,
            latency_ms: None,
            detail: Some(detail.into()),
        }
    }
}

/// Per-endpoint probe report; purely informational
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub icmp: ProbeResult,
    pub transport: ProbeResult,
    /// Only present for the well-known HTTP/HTTPS ports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<ProbeResult>,
}

/// Run up to three independent reachability signals against the endpoint.
///
/// The signals run concurrently and are fully isolated from each other;
/// a failure is logged and recorded, never propagated.
pub async fn probe_endpoint(endpoint: &Endpoint, transport: Transport) -> ProbeReport {
    info!("Testing connection to VPN server: {}", endpoint);

    let (icmp, transport_result, http) = tokio::join!(
        probe_icmp(endpoint),
        probe_transport(endpoint, transport),
        probe_http(endpoint),
    );

    ProbeReport {
        icmp,
        transport: transport_result,
        http,
    }
}

/// ICMP echo via the system ping binary (fixed small count, short timeout)
async fn probe_icmp(endpoint: &Endpoint) -> ProbeResult {
    info!("Testing ping connectivity...");

    let output = Command::new("ping")
        .arg("-c")
        .arg(PING_COUNT.to_string())
        .arg("-W")
        .arg(PING_TIMEOUT_SECS.to_string())
        .arg(&endpoint.host)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            info!("Ping test result:\n{}", stdout.trim_end());
            ProbeResult::ok("icmp")
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Ping test failed: {}", stderr.trim_end());
            ProbeResult::failed("icmp", stderr.trim_end().to_string())
        }
        Err(e) => {
            warn!("Connection test failed: {}", e);
            ProbeResult::failed("icmp", e.to_string())
        }
    }
}

/// Transport-specific handshake probe: TCP connect, or a UDP datagram
/// liveness check (UDP silence is a warning, not an error)
async fn probe_transport(endpoint: &Endpoint, transport: Transport) -> ProbeResult {
    match transport {
        Transport::Tcp => probe_tcp(endpoint).await,
        Transport::Udp => probe_udp(endpoint).await,
    }
}

async fn probe_tcp(endpoint: &Endpoint) -> ProbeResult {
    info!("Testing TCP connectivity to port {}...", endpoint.port);

    let start = Instant::now();
    let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
    match timeout(TRANSPORT_PROBE_TIMEOUT, connect).await {
        Ok(Ok(_stream)) => {
            let latency = start.elapsed();
            info!(
                "Successfully connected to {} via TCP ({} ms)",
                endpoint,
                latency.as_millis()
            );
            ProbeResult {
                latency_ms: Some(latency.as_millis() as u64),
                ..ProbeResult::ok("tcp")
            }
        }
        Ok(Err(e)) => {
            warn!("Could not connect to {}: {}", endpoint, e);
            ProbeResult::failed("tcp", e.to_string())
        }
        Err(_) => {
            warn!("Timeout connecting to {}", endpoint);
            ProbeResult::failed("tcp", "connect timeout")
        }
    }
}

async fn probe_udp(endpoint: &Endpoint) -> ProbeResult {
    info!("Testing UDP liveness on port {}...", endpoint.port);

    let attempt = async {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .send_to(&[], (endpoint.host.as_str(), endpoint.port))
            .await?;
        let mut buf = [0u8; 512];
        socket.recv_from(&mut buf).await
    };

    match timeout(TRANSPORT_PROBE_TIMEOUT, attempt).await {
        Ok(Ok((len, from))) => {
            info!("Received {} byte UDP response from {}", len, from);
            ProbeResult::ok("udp")
        }
        Ok(Err(e)) => {
            warn!("UDP probe failed: {}", e);
            ProbeResult::failed("udp", e.to_string())
        }
        Err(_) => {
            // UDP has no connection concept; silence proves nothing
            warn!(
                "No UDP response from {} within {:?} (not necessarily an error)",
                endpoint, TRANSPORT_PROBE_TIMEOUT
            );
            ProbeResult::failed("udp", "no response datagram")
        }
    }
}

/// Header-only HTTP(S) fetch, attempted only on the well-known web ports.
/// Failures are expected for VPN endpoints and logged at info level.
async fn probe_http(endpoint: &Endpoint) -> Option<ProbeResult> {
    let scheme = match endpoint.port {
        80 => "http",
        443 => "https",
        _ => return None,
    };
    let url = format!("{}://{}", scheme, endpoint.host);
    info!("Testing HTTP connectivity: {}", url);

    let result = async {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;
        client.head(&url).send().await
    }
    .await;

    Some(match result {
        Ok(response) => {
            info!("HTTP test result: {:?} {}", response.version(), response.status());
            ProbeResult::ok("http")
        }
        Err(e) => {
            info!("HTTP test failed (expected for non-web services): {}", e);
            ProbeResult::failed("http", e.to_string())
        }
    })
}
