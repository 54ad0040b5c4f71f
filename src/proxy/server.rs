//! The request-resolving core shared by every RPC handler.

use std::path::Path;
use std::sync::Arc;

use crate::cache::{dump, CacheStore, DumpError};
use crate::delayed::{DelayedResponses, Registration};
use crate::model::{ConfigRequest, RawConfig};
use crate::proxy::mode::{Mode, ModeController, ModeError};
use crate::rpc::responder::Responder;
use crate::source::{split_source_list, SourceConnections, SourceError};

/// What to do with a `getConfig` request.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Answer now with this value.
    Respond(Arc<RawConfig>),
    /// Nothing new for this client; park the request.
    Wait,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateSourcesError {
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error("Could not update config sources: {0}")]
    Source(#[from] SourceError),
}

/// Owns the cache, the long-poll registry, the sources and the mode.
#[derive(Debug)]
pub struct ProxyServer {
    cache: Arc<CacheStore>,
    delayed: Arc<DelayedResponses>,
    sources: SourceConnections,
    mode: ModeController,
}

impl ProxyServer {
    pub fn new(sources: SourceConnections, mode: Mode) -> Self {
        let cache = Arc::new(CacheStore::new());
        Self {
            delayed: DelayedResponses::new(cache.clone()),
            cache,
            sources,
            mode: ModeController::new(mode),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn delayed(&self) -> &Arc<DelayedResponses> {
        &self.delayed
    }

    pub fn sources(&self) -> &SourceConnections {
        &self.sources
    }

    pub fn mode(&self) -> &ModeController {
        &self.mode
    }

    /// Decide between answering now and waiting.
    ///
    /// A failed fetch is not an error here: the request waits and the
    /// refresher retries the key.
    pub async fn resolve(&self, request: &ConfigRequest) -> Resolution {
        if let Some(cached) = self.cache.get(&request.key) {
            return Self::decide(request, cached);
        }

        if !self.mode.get().requires_config_source() {
            tracing::debug!(key = %request.key, "Not cached and sources are off limits, waiting");
            return Resolution::Wait;
        }

        match self
            .sources
            .fetch(&request.key, request.known_generation)
            .await
        {
            Ok(config) => {
                self.update_config(config);
                match self.cache.get(&request.key) {
                    Some(cached) => Self::decide(request, cached),
                    None => Resolution::Wait,
                }
            }
            Err(_) => Resolution::Wait,
        }
    }

    fn decide(request: &ConfigRequest, cached: Arc<RawConfig>) -> Resolution {
        if request.is_outdated_by(&cached) {
            Resolution::Respond(cached)
        } else {
            Resolution::Wait
        }
    }

    /// Park `request` in the long-poll registry.
    pub fn defer(&self, request: ConfigRequest, responder: Responder) -> Registration {
        self.delayed.register(request, responder)
    }

    /// Store `config` and answer the requests waiting for it.
    ///
    /// Returns false if a higher generation was already cached.
    pub fn update_config(&self, config: RawConfig) -> bool {
        let config = Arc::new(config);
        if !self.cache.put(config.clone()) {
            return false;
        }
        let answered = self.delayed.notify_updated(&config);
        if answered > 0 {
            tracing::debug!(key = %config.key(), generation = config.generation(), answered, "Answered waiting requests");
        }
        true
    }

    /// Replace the source list from a comma separated string.
    ///
    /// A concurrent mode switch lands either before the check or after the swap.
    pub fn update_sources(&self, csv: &str) -> Result<Vec<String>, UpdateSourcesError> {
        self.mode.with_current(|mode| -> Result<Vec<String>, UpdateSourcesError> {
            if !mode.requires_config_source() {
                return Err(ModeError::SourcesLocked(mode).into());
            }
            let specs = split_source_list(csv);
            self.sources.update_sources(&specs)?;
            Ok(specs)
        })
    }

    pub fn invalidate_cache(&self) {
        self.cache.invalidate_all();
    }

    pub fn dump_cache(&self, path: &Path) -> Result<usize, DumpError> {
        self.cache.dump_to_disk(path)
    }

    /// Feed every record of a dump through [`update_config`](Self::update_config).
    ///
    /// Returns how many records were stored; older generations are skipped.
    pub fn load_cache(&self, path: &Path) -> Result<usize, DumpError> {
        let configs = dump::read_dump(path)?;
        let total = configs.len();
        let stored = configs
            .into_iter()
            .map(|config| self.update_config(config))
            .filter(|stored| *stored)
            .count();
        tracing::info!(path = %path.display(), total, stored, "Cache loaded");
        Ok(stored)
    }

    /// `printStatistics` text.
    pub fn statistics(&self) -> String {
        let pending = self.delayed.snapshot();
        let mut out = format!(
            "\nDelayed responses queue size: {}\nContents: ",
            pending.len()
        );
        for info in pending {
            out.push_str(&info.to_string());
            out.push('\n');
        }
        out
    }
}
