//! Relay selection.
//!
//! Produces the relay set a pad syncs over. Selection never hard-fails:
//! every path bottoms out at the configured bootstrap relays, so the
//! caller always gets a non-empty set (given a non-empty bootstrap list)
//! within a bounded wait.
//!
//! Writer path: fresh cache, else bootstrap quorum, else discovery
//! (mine seed relays for candidate URLs, screen and probe them
//! concurrently, rank by latency), else bootstrap fallback. Successful
//! selections are announced for viewers and cached.
//!
//! Reader path: fresh cache, else look up the writer's announcement on
//! the bootstrap relays and read announced plus bootstrap, else read
//! from bootstrap alone.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use pad_core::{
    normalize_url, rank, Provenance, RelayEndpoint, RelaySelection, SELECTION_TARGET,
};
use pad_types::{
    Filter, PadId, RelayEvent, Tag, APP_DISCRIMINATOR, KIND_PAD_RELAYS, KIND_RELAY_DIRECTORY,
    KIND_RELAY_PREFS,
};

use crate::identity::PadIdentity;
use crate::now_ms;
use crate::pool::{RelayPool, SharedConn, SubMessage};
use crate::probe::{probe, probe_screened, ProbeOutcome};
use crate::socket::{RelayConnector, RelaySocket};
use crate::store::LocalStore;

/// Bootstrap relays that must answer for the cheap path to win.
pub const BOOTSTRAP_QUORUM: usize = 2;

/// Hard cap on candidates carried into the probe race.
pub const CANDIDATE_POOL_CAP: usize = 12;

/// How long one seed may take to answer a discovery query.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(4);

/// How long an announcement publish may take per relay.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(4);

/// How long a cached selection stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSelection {
    selection: RelaySelection,
    stored_at_ms: u64,
}

/// Computes relay selections for pads, caching per pad id.
pub struct RelaySelector<C: RelayConnector> {
    pool: Arc<RelayPool<C>>,
    store: Arc<LocalStore>,
    bootstrap: Vec<String>,
}

impl<C: RelayConnector> RelaySelector<C> {
    /// Build a selector over a pool and store. Bootstrap URLs are
    /// normalized and deduplicated, keeping first-seen order.
    pub fn new(pool: Arc<RelayPool<C>>, store: Arc<LocalStore>, bootstrap: Vec<String>) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(bootstrap.len());
        for url in bootstrap {
            let url = normalize_url(&url);
            if !normalized.contains(&url) {
                normalized.push(url);
            }
        }
        Self {
            pool,
            store,
            bootstrap: normalized,
        }
    }

    /// The normalized bootstrap set.
    pub fn bootstrap_urls(&self) -> &[String] {
        &self.bootstrap
    }

    /// Select relays to publish a pad over, announcing the result so
    /// viewers can find it.
    pub async fn select_for_writer(&self, identity: &PadIdentity) -> RelaySelection {
        let pad_id = identity.pad_id();
        if let Some(cached) = self.cached(&pad_id).await {
            tracing::debug!(pad = %pad_id, "using cached relay selection");
            return cached;
        }

        // Cheap path: enough bootstrap relays answering means no
        // discovery round at all.
        let outcomes = join_all(self.bootstrap.iter().map(|url| probe(&self.pool, url))).await;
        let responding = outcomes.iter().filter(|o| o.available).count();
        let quorum = BOOTSTRAP_QUORUM.min(self.bootstrap.len());
        if responding > 0 && responding >= quorum {
            let endpoints: Vec<RelayEndpoint> = outcomes
                .into_iter()
                .map(ProbeOutcome::into_endpoint)
                .collect();
            let selection = RelaySelection {
                endpoints,
                provenance: Provenance::Bootstrap,
            };
            tracing::info!(pad = %pad_id, relays = selection.len(), "bootstrap quorum met");
            self.announce(identity, &selection).await;
            self.remember(&pad_id, &selection).await;
            return selection;
        }

        // Discovery: mine the seeds for candidate URLs and race probes
        // across them. Bootstrap outcomes from the quorum check carry
        // their measured latencies into the ranking.
        let candidates = self.discover_candidates().await;
        let discovered =
            join_all(candidates.iter().map(|url| probe_screened(&self.pool, url))).await;
        let mut probed: Vec<RelayEndpoint> = outcomes
            .into_iter()
            .map(ProbeOutcome::into_endpoint)
            .collect();
        probed.extend(discovered.into_iter().map(ProbeOutcome::into_endpoint));

        if probed.iter().any(|e| e.available) {
            let selection = RelaySelection {
                endpoints: rank(probed, &self.bootstrap, SELECTION_TARGET),
                provenance: Provenance::Discovered,
            };
            tracing::info!(pad = %pad_id, relays = selection.len(), "selected discovered relays");
            self.announce(identity, &selection).await;
            self.remember(&pad_id, &selection).await;
            return selection;
        }

        tracing::warn!(pad = %pad_id, "no relay answered, falling back to bootstrap set");
        let selection = RelaySelection::bootstrap(&self.bootstrap);
        self.announce(identity, &selection).await;
        selection
    }

    /// Select relays to read a pad from, without write credentials.
    pub async fn select_for_reader(&self, pad_id: &PadId) -> RelaySelection {
        if let Some(cached) = self.cached(pad_id).await {
            tracing::debug!(pad = %pad_id, "using cached relay selection");
            return cached;
        }

        if let Some(announcement) = self.lookup_announcement(pad_id).await {
            let mut endpoints: Vec<RelayEndpoint> = Vec::new();
            for url in announcement.relay_urls() {
                let url = normalize_url(&url);
                if !endpoints.iter().any(|e| e.url == url) {
                    endpoints.push(RelayEndpoint::new(&url));
                }
            }
            for url in &self.bootstrap {
                if !endpoints.iter().any(|e| e.url == *url) {
                    endpoints.push(RelayEndpoint::new(url));
                }
            }
            let selection = RelaySelection {
                endpoints,
                provenance: Provenance::Discovered,
            };
            tracing::info!(pad = %pad_id, relays = selection.len(), "following relay announcement");
            self.remember(pad_id, &selection).await;
            return selection;
        }

        tracing::debug!(pad = %pad_id, "no announcement found, reading from bootstrap set");
        RelaySelection::bootstrap(&self.bootstrap)
    }

    /// Drop the cached selection for a pad, forcing the next selection
    /// to recompute. Called after sync failures.
    pub async fn forget(&self, pad_id: &PadId) {
        if let Err(e) = self.store.remove(&cache_name(pad_id)).await {
            tracing::warn!(pad = %pad_id, error = %e, "failed to drop cached selection");
        }
    }

    /// Mine the seed relays for candidate URLs: relay preference lists
    /// and relay directory entries. First-seen order, deduplicated,
    /// bootstrap URLs excluded (they are already ranked), capped.
    async fn discover_candidates(&self) -> Vec<String> {
        let harvests = join_all(self.bootstrap.iter().map(|url| self.query_seed(url))).await;
        let mut candidates: Vec<String> = Vec::new();
        for urls in harvests {
            for url in urls {
                let url = normalize_url(&url);
                if !self.bootstrap.contains(&url) && !candidates.contains(&url) {
                    candidates.push(url);
                }
            }
        }
        candidates.truncate(CANDIDATE_POOL_CAP);
        tracing::debug!(count = candidates.len(), "gathered relay candidates");
        candidates
    }

    /// Query one seed for candidate URLs, bounded by the discovery
    /// timeout. Failures yield an empty harvest.
    async fn query_seed(&self, url: &str) -> Vec<String> {
        let conn = match tokio::time::timeout(DISCOVERY_TIMEOUT, self.pool.acquire(url)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "seed unreachable");
                return Vec::new();
            }
            Err(_) => {
                tracing::debug!(url = %url, "seed connect timed out");
                return Vec::new();
            }
        };
        let urls = match tokio::time::timeout(DISCOVERY_TIMEOUT, harvest_urls(&conn)).await {
            Ok(urls) => urls,
            Err(_) => {
                tracing::debug!(url = %url, "seed query timed out");
                Vec::new()
            }
        };
        self.pool.release(url).await;
        urls
    }

    /// Find the pad's relay announcement on the bootstrap relays.
    ///
    /// The discriminator-scoped filter is tried first, then the pad-tag
    /// filter for announcements published before the scoped form. Every
    /// candidate is verified and bound to the pad id before it counts;
    /// among valid announcements the newest wins.
    async fn lookup_announcement(&self, pad_id: &PadId) -> Option<RelayEvent> {
        let scoped = Filter::new()
            .kind(KIND_PAD_RELAYS)
            .d_tag(&format!("{APP_DISCRIMINATOR}:{pad_id}"))
            .limit(1);
        let tagged = Filter::new().kind(KIND_PAD_RELAYS).pad_tag(pad_id).limit(1);

        for filter in [scoped, tagged] {
            let finds = join_all(
                self.bootstrap
                    .iter()
                    .map(|url| self.find_announcement(url, filter.clone(), pad_id)),
            )
            .await;
            let newest = finds
                .into_iter()
                .flatten()
                .max_by_key(|event| event.created_at_ms);
            if newest.is_some() {
                return newest;
            }
        }
        None
    }

    async fn find_announcement(
        &self,
        url: &str,
        filter: Filter,
        pad_id: &PadId,
    ) -> Option<RelayEvent> {
        let conn = match tokio::time::timeout(DISCOVERY_TIMEOUT, self.pool.acquire(url)).await {
            Ok(Ok(conn)) => conn,
            _ => return None,
        };
        let found = tokio::time::timeout(DISCOVERY_TIMEOUT, scan_for_announcement(&conn, filter, pad_id))
            .await
            .unwrap_or(None);
        self.pool.release(url).await;
        found
    }

    /// Publish the selection as a pad-tagged announcement on the
    /// bootstrap relays. Best effort; viewers that miss it fall back to
    /// the bootstrap set anyway.
    async fn announce(&self, identity: &PadIdentity, selection: &RelaySelection) {
        let pad_id = identity.pad_id();
        let mut tags = vec![
            Tag::discriminator(&format!("{APP_DISCRIMINATOR}:{pad_id}")),
            Tag::pad(&pad_id),
        ];
        for url in selection.urls() {
            tags.push(Tag::relay(&url));
        }
        let event = match RelayEvent::signed(
            KIND_PAD_RELAYS,
            tags,
            String::new(),
            now_ms(),
            identity.signing_key(),
        ) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "failed to build relay announcement");
                return;
            }
        };

        let sends = join_all(
            self.bootstrap
                .iter()
                .map(|url| self.pool.publish_once(url, event.clone(), ANNOUNCE_TIMEOUT)),
        )
        .await;
        let delivered = sends.iter().filter(|sent| **sent).count();
        tracing::debug!(
            pad = %pad_id,
            delivered,
            attempted = self.bootstrap.len(),
            "published relay announcement"
        );
    }

    async fn cached(&self, pad_id: &PadId) -> Option<RelaySelection> {
        let cached: CachedSelection = self
            .store
            .read_json(&cache_name(pad_id))
            .await
            .ok()
            .flatten()?;
        let age_ms = now_ms().saturating_sub(cached.stored_at_ms);
        if age_ms > CACHE_TTL.as_millis() as u64 || cached.selection.is_empty() {
            return None;
        }
        Some(RelaySelection {
            endpoints: cached.selection.endpoints,
            provenance: Provenance::Cached,
        })
    }

    async fn remember(&self, pad_id: &PadId, selection: &RelaySelection) {
        if selection.is_empty() {
            return;
        }
        let cached = CachedSelection {
            selection: selection.clone(),
            stored_at_ms: now_ms(),
        };
        if let Err(e) = self.store.write_json(&cache_name(pad_id), &cached).await {
            tracing::warn!(pad = %pad_id, error = %e, "failed to cache relay selection");
        }
    }
}

fn cache_name(pad_id: &PadId) -> String {
    format!("relays-{pad_id}.json")
}

/// Drain one subscription's stored events for relay URLs.
async fn harvest_urls<S: RelaySocket + 'static>(conn: &SharedConn<S>) -> Vec<String> {
    let filters = vec![
        Filter::new().kind(KIND_RELAY_PREFS).limit(16),
        Filter::new().kind(KIND_RELAY_DIRECTORY).limit(16),
    ];
    let mut sub = match conn.subscribe(filters).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::debug!(url = %conn.url(), error = %e, "discovery subscribe failed");
            return Vec::new();
        }
    };
    let mut urls = Vec::new();
    while let Some(message) = sub.next().await {
        match message {
            SubMessage::Event(event) => {
                if event.kind == KIND_RELAY_PREFS {
                    urls.extend(event.relay_urls());
                } else if event.kind == KIND_RELAY_DIRECTORY {
                    if let Some(subject) = event.tag_value("d") {
                        urls.push(subject.to_string());
                    }
                }
            }
            SubMessage::EndOfStored => break,
        }
    }
    sub.close().await;
    urls
}

/// Scan one subscription for a valid announcement bound to `pad_id`.
async fn scan_for_announcement<S: RelaySocket + 'static>(
    conn: &SharedConn<S>,
    filter: Filter,
    pad_id: &PadId,
) -> Option<RelayEvent> {
    let mut sub = match conn.subscribe(vec![filter]).await {
        Ok(sub) => sub,
        Err(_) => return None,
    };
    let mut newest: Option<RelayEvent> = None;
    while let Some(message) = sub.next().await {
        match message {
            SubMessage::Event(event) => {
                if event.kind != KIND_PAD_RELAYS {
                    continue;
                }
                if event.author_pad_id() != *pad_id {
                    tracing::debug!(
                        pad = %pad_id,
                        author_pad = %event.author_pad_id(),
                        "announcement author does not derive this pad id, skipping"
                    );
                    continue;
                }
                if !event.verify() {
                    tracing::debug!(pad = %pad_id, "announcement failed verification, skipping");
                    continue;
                }
                let newer = newest
                    .as_ref()
                    .map(|n| event.created_at_ms > n.created_at_ms)
                    .unwrap_or(true);
                if newer {
                    newest = Some(event);
                }
            }
            SubMessage::EndOfStored => break,
        }
    }
    sub.close().await;
    newest
}
