//! Relay probing.
//!
//! A probe answers one question: can this relay be reached right now,
//! and how fast. Probes never fail; an unreachable or unsuitable relay
//! is reported as unavailable. Probes go through the shared pool so a
//! relay the engine is already connected to is not dialed twice.

use std::time::{Duration, Instant};

use pad_core::{normalize_url, RelayEndpoint};

use crate::pool::RelayPool;
use crate::socket::RelayConnector;

/// How long a probe waits before declaring a relay unreachable.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Smallest event content a relay must accept to carry pad events.
/// Relays declaring a lower cap are screened out before dialing.
pub const MIN_CONTENT_LEN: u64 = 16 * 1024;

/// What one probe learned about one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Normalized relay URL.
    pub url: String,
    /// Whether the relay answered in time.
    pub available: bool,
    /// Connection latency when available.
    pub latency_ms: Option<u64>,
}

impl ProbeOutcome {
    fn unavailable(url: &str) -> Self {
        Self {
            url: normalize_url(url),
            available: false,
            latency_ms: None,
        }
    }

    /// Convert into a selectable endpoint.
    pub fn into_endpoint(self) -> RelayEndpoint {
        let endpoint = RelayEndpoint::new(&self.url);
        match self.latency_ms {
            Some(latency) if self.available => endpoint.reachable(latency),
            _ => endpoint,
        }
    }
}

/// Probe one relay with the default timeout.
pub async fn probe<C: RelayConnector>(pool: &RelayPool<C>, url: &str) -> ProbeOutcome {
    probe_with_timeout(pool, url, PROBE_TIMEOUT).await
}

/// Probe one relay, waiting at most `timeout` for the connection.
pub async fn probe_with_timeout<C: RelayConnector>(
    pool: &RelayPool<C>,
    url: &str,
    timeout: Duration,
) -> ProbeOutcome {
    let url = normalize_url(url);
    let started = Instant::now();
    match tokio::time::timeout(timeout, pool.acquire(&url)).await {
        Ok(Ok(_conn)) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            pool.release(&url).await;
            ProbeOutcome {
                url,
                available: true,
                latency_ms: Some(latency_ms),
            }
        }
        Ok(Err(e)) => {
            tracing::debug!(url = %url, error = %e, "probe failed");
            ProbeOutcome::unavailable(&url)
        }
        Err(_) => {
            tracing::debug!(url = %url, "probe timed out");
            ProbeOutcome::unavailable(&url)
        }
    }
}

/// Probe one relay, first screening it on its capability document.
///
/// A relay that declares payment, authentication, or a content cap too
/// small for pad events is excluded without dialing. A relay serving no
/// document makes no claims and is probed normally.
pub async fn probe_screened<C: RelayConnector>(pool: &RelayPool<C>, url: &str) -> ProbeOutcome {
    if let Some(info) = pool.connector().fetch_info(url).await {
        if info.unsuitable(MIN_CONTENT_LEN) {
            tracing::debug!(url = %url, "relay screened out by capability document");
            return ProbeOutcome::unavailable(url);
        }
    }
    probe(pool, url).await
}
