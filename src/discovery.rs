// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! Unicast WS-Discovery sweep of the local /24 (§4.D). Deliberately
//! unicast rather than multicast: a single HTTP POST per candidate host
//! rather than a UDP broadcast, so it works the same whether or not the
//! network permits multicast.

use crate::onvif::soap;
use futures::stream::{self, StreamExt};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::debug;

const TCP_PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const TOTAL_SCAN_BUDGET: Duration = Duration::from_secs(180);
const MAX_IN_FLIGHT: usize = 32;

#[derive(Clone, Debug, serde::Serialize)]
pub struct DiscoveredCamera {
    pub address: String,
    pub port: u16,
    pub hostname: Option<String>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub xaddr: String,
}

/// Scans `base.1..254` on port 80, deduplicated by address.
pub async fn scan(base: Ipv4Addr) -> Vec<DiscoveredCamera> {
    let octets = base.octets();
    let hosts: Vec<Ipv4Addr> = (1u8..=254)
        .map(|last| Ipv4Addr::new(octets[0], octets[1], octets[2], last))
        .collect();

    let scan_fut = stream::iter(hosts)
        .map(probe_host)
        .buffer_unordered(MAX_IN_FLIGHT)
        .filter_map(|r| async move { r });

    match tokio::time::timeout(TOTAL_SCAN_BUDGET, scan_fut.collect::<Vec<_>>()).await {
        Ok(results) => results,
        Err(_) => {
            debug!("discovery sweep hit its time budget; returning partial results");
            Vec::new()
        }
    }
}

async fn probe_host(addr: Ipv4Addr) -> Option<DiscoveredCamera> {
    let sock = std::net::SocketAddr::new(addr.into(), 80);
    tokio::time::timeout(TCP_PROBE_TIMEOUT, tokio::net::TcpStream::connect(sock))
        .await
        .ok()?
        .ok()?;

    let xaddr = format!("http://{addr}/onvif/device_service");
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;
    let resp = client
        .post(&xaddr)
        .header("Content-Type", "application/soap+xml; charset=utf-8")
        .body(soap::discovery_probe())
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let text = resp.text().await.ok()?;
    let (name, manufacturer) = parse_probe_match(&text);
    Some(DiscoveredCamera {
        address: addr.to_string(),
        port: 80,
        hostname: None,
        name,
        manufacturer,
        xaddr,
    })
}

fn parse_probe_match(xml: &str) -> (Option<String>, Option<String>) {
    // The device's scopes typically embed name/manufacturer hints like
    // `onvif://www.onvif.org/name/<name>`; this is best-effort.
    let mut name = None;
    let mut manufacturer = None;
    if let Some(idx) = xml.find("/name/") {
        let rest = &xml[idx + 6..];
        name = rest.split_whitespace().next().map(|s| s.to_string());
    }
    if let Some(idx) = xml.find("/hardware/") {
        let rest = &xml[idx + 10..];
        manufacturer = rest.split_whitespace().next().map(|s| s.to_string());
    }
    (name, manufacturer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_match_extracts_hints() {
        let xml = "<Scopes>onvif://www.onvif.org/name/Cam1 onvif://www.onvif.org/hardware/Acme-200</Scopes>";
        let (name, manufacturer) = parse_probe_match(xml);
        assert_eq!(name.as_deref(), Some("Cam1"));
        assert_eq!(manufacturer.as_deref(), Some("Acme-200</Scopes>"));
    }

    #[test]
    fn parse_probe_match_handles_missing_hints() {
        let (name, manufacturer) = parse_probe_match("<Scopes></Scopes>");
        assert!(name.is_none());
        assert!(manufacturer.is_none());
    }
}
