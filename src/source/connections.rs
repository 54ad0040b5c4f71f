//! Ordered upstream sources with one active entry.
//!
//! # State Transitions
//! ```text
//! fetch ok:     active source's failure count → 0
//! fetch failed: failure count += 1
//!               count >= failover_threshold → active = (active + 1) % len, count → 0
//! update:       whole list replaced, active → 0
//! ```

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::model::{CacheKey, RawConfig};
use crate::observability::metrics;
use crate::source::client::SourceClient;
use crate::source::SourceError;

/// One upstream source.
#[derive(Debug)]
pub struct Source {
    spec: String,
    url: Url,
    consecutive_failures: AtomicUsize,
}

impl Source {
    pub fn parse(spec: &str) -> Result<Self, SourceError> {
        let spec = spec.trim();
        Ok(Self {
            url: parse_source_url(spec)?,
            spec: spec.to_string(),
            consecutive_failures: AtomicUsize::new(0),
        })
    }

    /// The address as configured.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn mark_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Count a failure. Returns true when the threshold was reached, resetting the count.
    fn mark_failure(&self, threshold: usize) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= threshold {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return true;
        }
        false
    }
}

/// Accepts `host:port` or an `http(s)://` URL.
pub fn parse_source_url(spec: &str) -> Result<Url, SourceError> {
    let invalid = |reason: String| SourceError::InvalidAddress {
        address: spec.to_string(),
        reason,
    };
    if spec.is_empty() {
        return Err(invalid("empty address".to_string()));
    }
    let candidate = if spec.contains("://") {
        spec.to_string()
    } else {
        format!("http://{spec}")
    };
    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Split a comma separated source list, trimming and dropping empty entries.
pub fn split_source_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// An immutable list plus the index of the active source.
#[derive(Debug)]
pub struct SourceList {
    sources: Vec<Arc<Source>>,
    active: AtomicUsize,
}

impl SourceList {
    fn parse(specs: &[String]) -> Result<Self, SourceError> {
        let sources = specs
            .iter()
            .map(|spec| Source::parse(spec).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            sources,
            active: AtomicUsize::new(0),
        })
    }

    fn active(&self) -> Option<(usize, &Arc<Source>)> {
        let index = self.active.load(Ordering::Acquire);
        self.sources.get(index).map(|source| (index, source))
    }

    /// Move past `from` unless someone already has. Returns the new active source.
    fn advance_from(&self, from: usize) -> Option<&Arc<Source>> {
        let next = (from + 1) % self.sources.len();
        self.active
            .compare_exchange(from, next, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .and_then(|_| self.sources.get(next))
    }
}

/// Upstream source manager.
pub struct SourceConnections {
    list: ArcSwap<SourceList>,
    client: Arc<dyn SourceClient>,
    failover_threshold: usize,
    fetch_timeout: Duration,
}

impl SourceConnections {
    /// An empty `specs` is allowed; fetches then fail with [`SourceError::NoSources`].
    pub fn new(
        specs: &[String],
        client: Arc<dyn SourceClient>,
        failover_threshold: usize,
        fetch_timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            list: ArcSwap::from_pointee(SourceList::parse(specs)?),
            client,
            failover_threshold: failover_threshold.max(1),
            fetch_timeout,
        })
    }

    /// Replace every source. Nothing changes if any address is invalid.
    pub fn update_sources(&self, specs: &[String]) -> Result<(), SourceError> {
        if specs.is_empty() {
            return Err(SourceError::NoSources);
        }
        let list = SourceList::parse(specs)?;
        self.list.store(Arc::new(list));
        tracing::info!(sources = ?specs, "Config sources updated");
        Ok(())
    }

    pub fn active_source(&self) -> Option<String> {
        let list = self.list.load();
        list.active().map(|(_, source)| source.spec().to_string())
    }

    pub fn sources(&self) -> Vec<String> {
        self.list
            .load()
            .sources
            .iter()
            .map(|source| source.spec().to_string())
            .collect()
    }

    /// `listSourceConnections` output.
    pub fn listing(&self) -> Vec<String> {
        let current = self.active_source().unwrap_or_default();
        let mut all = String::from("All sources:\n");
        for spec in self.sources() {
            all.push_str(&spec);
            all.push('\n');
        }
        vec![format!("Current source: {current}"), all]
    }

    /// Fetch `key` from the active source, failing over after repeated errors.
    pub async fn fetch(&self, key: &CacheKey, generation: i64) -> Result<RawConfig, SourceError> {
        let list = self.list.load_full();
        let Some((index, source)) = list.active() else {
            return Err(SourceError::NoSources);
        };

        let attempt = self.client.fetch(source.url(), key, generation);
        let result = match tokio::time::timeout(self.fetch_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                address: source.spec().to_string(),
                after: self.fetch_timeout,
            }),
        };

        match &result {
            Ok(config) => {
                source.mark_success();
                tracing::debug!(
                    source = %source.spec(),
                    key = %key,
                    generation = config.generation(),
                    "Fetched config"
                );
            }
            Err(e) => {
                metrics::record_source_failure(source.spec());
                tracing::warn!(source = %source.spec(), key = %key, error = %e, "Fetch from config source failed");
                if source.mark_failure(self.failover_threshold) {
                    if let Some(next) = list.advance_from(index) {
                        metrics::record_failover(next.spec());
                        tracing::warn!(
                            from = %source.spec(),
                            to = %next.spec(),
                            "Failing over to next config source"
                        );
                    }
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for SourceConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConnections")
            .field("sources", &self.sources())
            .field("active", &self.active_source())
            .field("failover_threshold", &self.failover_threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Fails for every host in `down`, records every host asked.
    #[derive(Default)]
    struct ScriptedClient {
        down: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn with_down(hosts: &[&str]) -> Arc<Self> {
            let client = Self::default();
            client
                .down
                .lock()
                .extend(hosts.iter().map(|h| h.to_string()));
            Arc::new(client)
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SourceClient for ScriptedClient {
        async fn fetch(
            &self,
            source: &Url,
            key: &CacheKey,
            _last_known_generation: i64,
        ) -> Result<RawConfig, SourceError> {
            let host = source.host_str().unwrap_or_default().to_string();
            self.calls.lock().push(host.clone());
            if self.down.lock().contains(&host) {
                return Err(SourceError::Transport {
                    address: host,
                    message: "connection refused".into(),
                });
            }
            Ok(RawConfig::new(key.clone(), host, 1, false))
        }
    }

    fn key() -> CacheKey {
        CacheKey::new("cloud.config", "sentinel", "hosts/node1", "")
    }

    fn specs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn source_address_forms() {
        assert_eq!(parse_source_url("s1:19070").unwrap().as_str(), "http://s1:19070/");
        assert_eq!(
            parse_source_url("https://s1.example.com:19071").unwrap().scheme(),
            "https"
        );
        assert!(parse_source_url("").is_err());
        assert!(parse_source_url("ftp://s1:21").is_err());
        assert!(parse_source_url("s1:notaport").is_err());
    }

    #[test]
    fn source_list_splitting() {
        assert_eq!(split_source_list(" a:1, ,b:2 ,"), specs(&["a:1", "b:2"]));
        assert!(split_source_list(" , ").is_empty());
    }

    #[tokio::test]
    async fn fails_over_after_threshold() {
        let client = ScriptedClient::with_down(&["s1"]);
        let sources =
            SourceConnections::new(&specs(&["s1:19070", "s2:19070"]), client.clone(), 2, Duration::from_secs(1))
                .unwrap();

        assert!(sources.fetch(&key(), 0).await.is_err());
        assert_eq!(sources.active_source().as_deref(), Some("s1:19070"));
        assert!(sources.fetch(&key(), 0).await.is_err());
        assert_eq!(sources.active_source().as_deref(), Some("s2:19070"));

        let config = sources.fetch(&key(), 0).await.unwrap();
        assert_eq!(config.payload().as_ref(), b"s2");
        assert_eq!(client.calls(), vec!["s1", "s1", "s2"]);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let client = ScriptedClient::with_down(&["s1"]);
        let sources =
            SourceConnections::new(&specs(&["s1:1", "s2:1"]), client.clone(), 2, Duration::from_secs(1))
                .unwrap();

        assert!(sources.fetch(&key(), 0).await.is_err());
        client.down.lock().clear();
        assert!(sources.fetch(&key(), 0).await.is_ok());
        client.down.lock().insert("s1".into());
        assert!(sources.fetch(&key(), 0).await.is_err());
        assert_eq!(sources.active_source().as_deref(), Some("s1:1"));
    }

    #[tokio::test]
    async fn failover_wraps_around() {
        let client = ScriptedClient::with_down(&["s1", "s2"]);
        let sources =
            SourceConnections::new(&specs(&["s1:1", "s2:1"]), client, 1, Duration::from_secs(1)).unwrap();
        let _ = sources.fetch(&key(), 0).await;
        assert_eq!(sources.active_source().as_deref(), Some("s2:1"));
        let _ = sources.fetch(&key(), 0).await;
        assert_eq!(sources.active_source().as_deref(), Some("s1:1"));
    }

    #[tokio::test]
    async fn update_replaces_and_resets_active() {
        let client = ScriptedClient::with_down(&["a"]);
        let sources =
            SourceConnections::new(&specs(&["a:1", "b:1"]), client, 1, Duration::from_secs(1)).unwrap();
        let _ = sources.fetch(&key(), 0).await;
        assert_eq!(sources.active_source().as_deref(), Some("b:1"));

        sources.update_sources(&specs(&["c:1", "d:1"])).unwrap();
        assert_eq!(sources.active_source().as_deref(), Some("c:1"));
        assert_eq!(
            sources.listing(),
            vec!["Current source: c:1".to_string(), "All sources:\nc:1\nd:1\n".to_string()]
        );
    }

    #[tokio::test]
    async fn rejected_update_keeps_list() {
        let sources = SourceConnections::new(
            &specs(&["a:1"]),
            Arc::new(ScriptedClient::default()),
            2,
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(matches!(
            sources.update_sources(&specs(&["b:1", "ftp://c"])),
            Err(SourceError::InvalidAddress { .. })
        ));
        assert!(matches!(sources.update_sources(&[]), Err(SourceError::NoSources)));
        assert_eq!(sources.sources(), specs(&["a:1"]));
    }

    #[tokio::test]
    async fn empty_list_reports_no_sources() {
        let sources =
            SourceConnections::new(&[], Arc::new(ScriptedClient::default()), 2, Duration::from_secs(1)).unwrap();
        assert!(matches!(sources.fetch(&key(), 0).await, Err(SourceError::NoSources)));
        assert_eq!(sources.listing()[0], "Current source: ");
    }
}
