//! Registry of long-poll requests waiting for a fresher config.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::cache::CacheStore;
use crate::model::{CacheKey, ConfigRequest, RawConfig};
use crate::net::{ConnectionId, Target, TargetWatcher};
use crate::observability::metrics;
use crate::rpc::protocol::RpcResponse;
use crate::rpc::responder::Responder;

/// A request parked until its key changes or its connection closes.
#[derive(Debug)]
pub struct DelayedResponse {
    pub request: ConfigRequest,
    pub registered_at: Instant,
    responder: Responder,
}

impl DelayedResponse {
    pub fn target(&self) -> &Target {
        &self.request.target
    }
}

/// Outcome of [`DelayedResponses::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Parked until the key changes.
    Pending,
    /// The cache already held something newer; answered on the spot.
    Answered,
    /// The caller or its connection is gone; nothing was stored.
    Discarded,
}

/// Diagnostic view of one parked request.
#[derive(Debug, Clone)]
pub struct PendingInfo {
    pub description: String,
    pub age: Duration,
}

impl fmt::Display for PendingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (waiting {}ms)", self.description, self.age.as_millis())
    }
}

#[derive(Default)]
struct Pending {
    by_key: HashMap<CacheKey, HashMap<ConnectionId, DelayedResponse>>,
    count: usize,
}

impl Pending {
    fn has_target(&self, id: ConnectionId) -> bool {
        self.by_key.values().any(|waiting| waiting.contains_key(&id))
    }
}

/// Pending long-polls keyed by `(CacheKey, Target)`.
///
/// Every state change happens under one lock, and the cache is read inside
/// that lock, so a registration can never slip between a cache update and
/// the notification that follows it.
pub struct DelayedResponses {
    cache: Arc<CacheStore>,
    pending: Mutex<Pending>,
    me: Weak<DelayedResponses>,
}

impl DelayedResponses {
    pub fn new(cache: Arc<CacheStore>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            cache,
            pending: Mutex::new(Pending::default()),
            me: me.clone(),
        })
    }

    /// Park `request` unless the cache already has something newer for it.
    ///
    /// A second request for the same key from the same target replaces the
    /// first; the replaced caller's channel is closed unanswered.
    pub fn register(&self, request: ConfigRequest, responder: Responder) -> Registration {
        let mut pending = self.pending.lock();

        if responder.is_closed() {
            return Registration::Discarded;
        }

        if let Some(current) = self.cache.get(&request.key) {
            if request.is_outdated_by(&current) {
                tracing::debug!(
                    request = %responder.log_id(),
                    key = %request.key,
                    generation = current.generation(),
                    "Config changed before registration, answering now"
                );
                responder.send(RpcResponse::config(&current, request.trace.clone()));
                return Registration::Answered;
            }
        }

        let subscribed = match self.me.upgrade() {
            Some(me) => request.target.add_watcher(me),
            None => false,
        };
        if !subscribed {
            tracing::debug!(request = %responder.log_id(), target = %request.target, "Target gone, not registering");
            return Registration::Discarded;
        }

        let target_id = request.target.id();
        let key = request.key.clone();
        tracing::debug!(request = %responder.log_id(), %request, "Delaying response");
        let previous = pending.by_key.entry(key).or_default().insert(
            target_id,
            DelayedResponse {
                request,
                registered_at: Instant::now(),
                responder,
            },
        );
        match previous {
            Some(replaced) => {
                tracing::debug!(request = %replaced.responder.log_id(), "Superseded by a newer long-poll");
            }
            None => pending.count += 1,
        }
        metrics::record_delayed_responses(pending.count);
        Registration::Pending
    }

    /// Answer every request on `config`'s key that does not already hold the
    /// newest value. Returns how many callers received a response.
    pub fn notify_updated(&self, config: &RawConfig) -> usize {
        let mut pending = self.pending.lock();

        let cached = self.cache.get(config.key());
        let latest: &RawConfig = match cached.as_deref() {
            Some(current) if current.generation() >= config.generation() => current,
            _ => config,
        };

        let Some(waiting) = pending.by_key.get_mut(config.key()) else {
            return 0;
        };
        let ready: Vec<ConnectionId> = waiting
            .iter()
            .filter(|(_, delayed)| delayed.request.is_outdated_by(latest))
            .map(|(id, _)| *id)
            .collect();

        let mut delivered = 0;
        let mut released = Vec::with_capacity(ready.len());
        for id in ready {
            let Some(DelayedResponse {
                request, responder, ..
            }) = waiting.remove(&id)
            else {
                continue;
            };
            tracing::debug!(
                request = %responder.log_id(),
                generation = latest.generation(),
                content_hash = %latest.content_hash(),
                "Returning delayed response"
            );
            if responder.send(RpcResponse::config(latest, request.trace.clone())) {
                delivered += 1;
            }
            released.push(request.target);
        }
        if waiting.is_empty() {
            pending.by_key.remove(config.key());
        }
        pending.count -= released.len();

        self.release_watchers(&pending, released);
        metrics::record_delayed_responses(pending.count);
        delivered
    }

    /// Unsubscribe from targets that have nothing left parked here.
    fn release_watchers(&self, pending: &Pending, targets: Vec<Target>) {
        for target in targets {
            if !pending.has_target(target.id()) {
                target.remove_watcher(self);
            }
        }
    }

    /// Drop, unanswered, everything parked for `target`.
    pub fn purge(&self, target: &Target) -> usize {
        let mut pending = self.pending.lock();
        let mut purged = 0;
        pending.by_key.retain(|_, waiting| {
            if let Some(delayed) = waiting.remove(&target.id()) {
                tracing::debug!(request = %delayed.responder.log_id(), "Removing delayed response for closed target");
                purged += 1;
            }
            !waiting.is_empty()
        });
        pending.count -= purged;
        metrics::record_delayed_responses(pending.count);
        purged
    }

    /// Drop entries whose caller stopped waiting without closing the connection.
    pub fn prune_closed(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut released = Vec::new();
        pending.by_key.retain(|_, waiting| {
            waiting.retain(|_, delayed| {
                let open = !delayed.responder.is_closed();
                if !open {
                    released.push(delayed.request.target.clone());
                }
                open
            });
            !waiting.is_empty()
        });

        let pruned = released.len();
        pending.count -= pruned;
        self.release_watchers(&pending, released);
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned abandoned delayed responses");
            metrics::record_delayed_responses(pending.count);
        }
        pruned
    }

    pub fn size(&self) -> usize {
        self.pending.lock().count
    }

    /// Keys with at least one waiter.
    pub fn pending_keys(&self) -> Vec<CacheKey> {
        self.pending.lock().by_key.keys().cloned().collect()
    }

    /// Copy of every parked request, for diagnostics.
    pub fn snapshot(&self) -> Vec<PendingInfo> {
        let now = Instant::now();
        let pending = self.pending.lock();
        pending
            .by_key
            .values()
            .flat_map(|waiting| waiting.values())
            .map(|delayed| PendingInfo {
                description: delayed.request.to_string(),
                age: now.saturating_duration_since(delayed.registered_at),
            })
            .collect()
    }
}

impl TargetWatcher for DelayedResponses {
    fn notify_target_invalid(&self, target: &Target) {
        let purged = self.purge(target);
        if purged > 0 {
            tracing::debug!(%target, purged, "Purged delayed responses for closed target");
        }
    }
}

impl fmt::Debug for DelayedResponses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedResponses")
            .field("size", &self.size())
            .finish()
    }
}
