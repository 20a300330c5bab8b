//! Relay endpoints, selections, and pure ranking.
//!
//! Probing and discovery happen in pad-client; this module only holds the
//! data shapes and the ranking function that turns probe results into a
//! selection. Keeping the ranking pure makes the fallback rules testable
//! without a network.

use serde::{Deserialize, Serialize};

/// How many ranked endpoints a selection aims for.
pub const SELECTION_TARGET: usize = 3;

/// Where a relay selection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The fixed bootstrap set answered directly.
    Bootstrap,
    /// Candidates found through peer-advertised directories.
    Discovered,
    /// A previous selection replayed from the local cache.
    Cached,
}

/// One candidate or selected relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEndpoint {
    /// Normalized relay URL.
    pub url: String,
    /// Whether the relay is advertised for reading.
    pub read: bool,
    /// Whether the relay is advertised for writing.
    pub write: bool,
    /// Latency of the last successful probe, if any.
    pub last_latency_ms: Option<u64>,
    /// Whether the last probe reached the relay.
    pub available: bool,
}

impl RelayEndpoint {
    /// A fresh, unprobed endpoint for a URL.
    pub fn new(url: &str) -> Self {
        Self {
            url: normalize_url(url),
            read: true,
            write: true,
            last_latency_ms: None,
            available: false,
        }
    }

    /// Mark the endpoint reachable with the given probe latency.
    pub fn reachable(mut self, latency_ms: u64) -> Self {
        self.available = true;
        self.last_latency_ms = Some(latency_ms);
        self
    }
}

/// A ranked, capped, provenance-tagged relay set for one pad.
///
/// Always a superset of the bootstrap set: even when every bootstrap relay
/// failed its probe, the caller must have somewhere to fall back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaySelection {
    /// Endpoints in rank order.
    pub endpoints: Vec<RelayEndpoint>,
    /// How this selection was produced.
    pub provenance: Provenance,
}

impl RelaySelection {
    /// The whole bootstrap set, unprobed, as a selection of last resort.
    pub fn bootstrap(urls: &[String]) -> Self {
        Self {
            endpoints: urls.iter().map(|u| RelayEndpoint::new(u)).collect(),
            provenance: Provenance::Bootstrap,
        }
    }

    /// URLs in rank order.
    pub fn urls(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.url.clone()).collect()
    }

    /// Whether the selection contains the given URL after normalization.
    pub fn contains(&self, url: &str) -> bool {
        let url = normalize_url(url);
        self.endpoints.iter().any(|e| e.url == url)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the selection is empty. A correctly produced selection never is.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Rank probed candidates and union in the bootstrap set.
///
/// Unavailable candidates are dropped, the rest sort by ascending probe
/// latency (stable, so equal latencies keep discovery order), the top
/// `target` survive, and every bootstrap URL missing from the result is
/// appended unprobed. The union may exceed `target`; the superset rule wins
/// over the cap.
pub fn rank(
    candidates: Vec<RelayEndpoint>,
    bootstrap: &[String],
    target: usize,
) -> Vec<RelayEndpoint> {
    let mut ranked: Vec<RelayEndpoint> =
        candidates.into_iter().filter(|e| e.available).collect();
    ranked.sort_by_key(|e| e.last_latency_ms.unwrap_or(u64::MAX));
    ranked.truncate(target);
    for url in bootstrap {
        let url = normalize_url(url);
        if !ranked.iter().any(|e| e.url == url) {
            ranked.push(RelayEndpoint {
                url,
                read: true,
                write: true,
                last_latency_ms: None,
                available: false,
            });
        }
    }
    ranked
}

/// Normalize a relay URL: lowercase scheme and host, strip trailing slashes.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.split_once('/') {
                Some((h, p)) => (h, Some(p)),
                None => (rest, None),
            };
            let mut out = format!(
                "{}://{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase()
            );
            if let Some(p) = path {
                out.push('/');
                out.push_str(p);
            }
            out
        }
        None => trimmed.to_string(),
    }
}
