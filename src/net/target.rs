//! Client connection handles and disconnect subscriptions.
//!
//! # Responsibilities
//! - Identify the connection a request arrived on
//! - Let interested parties subscribe to "this connection is gone"
//! - Fire each subscription exactly once when the connection closes
//!
//! # Design Decisions
//! - Identity is the connection id; two handles are equal iff they share it
//! - Validity flag and watcher list share one lock, so a watcher added
//!   successfully is guaranteed to be notified on invalidation
//! - Watchers run outside the lock

use parking_lot::Mutex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::net::connection::ConnectionId;

/// Something that wants to hear about a closed client connection.
pub trait TargetWatcher: Send + Sync {
    fn notify_target_invalid(&self, target: &Target);
}

struct TargetState {
    valid: bool,
    watchers: Vec<Arc<dyn TargetWatcher>>,
}

struct TargetInner {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    state: Mutex<TargetState>,
}

/// Handle to a client connection. Cheap to clone.
#[derive(Clone)]
pub struct Target {
    inner: Arc<TargetInner>,
}

impl Target {
    pub fn new(id: ConnectionId, peer: Option<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                id,
                peer,
                state: Mutex::new(TargetState {
                    valid: true,
                    watchers: Vec::new(),
                }),
            }),
        }
    }

    /// A target not tied to any socket, for internal callers and tests.
    pub fn detached() -> Self {
        Self::new(ConnectionId::new(), None)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn is_valid(&self) -> bool {
        self.inner.state.lock().valid
    }

    /// Subscribe `watcher` to invalidation of this target.
    ///
    /// Adding the same watcher twice is a no-op. Returns false if the target
    /// is already invalid, in which case the watcher will never be called.
    pub fn add_watcher(&self, watcher: Arc<dyn TargetWatcher>) -> bool {
        let mut state = self.inner.state.lock();
        if !state.valid {
            return false;
        }
        let present = state
            .watchers
            .iter()
            .any(|w| std::ptr::addr_eq(Arc::as_ptr(w), Arc::as_ptr(&watcher)));
        if !present {
            state.watchers.push(watcher);
        }
        true
    }

    /// Drop a subscription. Returns true if it was present.
    pub fn remove_watcher<W: TargetWatcher + ?Sized>(&self, watcher: &W) -> bool {
        let watcher: *const W = watcher;
        let mut state = self.inner.state.lock();
        let before = state.watchers.len();
        state
            .watchers
            .retain(|w| !std::ptr::addr_eq(Arc::as_ptr(w), watcher));
        before != state.watchers.len()
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.state.lock().watchers.len()
    }

    /// Mark the connection closed and notify every watcher once.
    ///
    /// Returns false if the target had already been invalidated.
    pub fn invalidate(&self) -> bool {
        let watchers = {
            let mut state = self.inner.state.lock();
            if !state.valid {
                return false;
            }
            state.valid = false;
            std::mem::take(&mut state.watchers)
        };

        tracing::debug!(target_id = %self.inner.id, watchers = watchers.len(), "Target invalid");
        for watcher in watchers {
            watcher.notify_target_invalid(self);
        }
        true
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .finish()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.peer {
            Some(peer) => write!(f, "{} ({})", self.inner.id, peer),
            None => write!(f, "{}", self.inner.id),
        }
    }
}
