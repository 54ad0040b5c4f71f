//! One-shot reply handle for an RPC call.

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::rpc::protocol::RpcResponse;

/// The only way to answer a call.
///
/// `send` consumes the handle, so a call can be answered at most once.
/// Dropping it unanswered closes the caller's channel.
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<RpcResponse>,
    log_id: String,
}

impl Responder {
    /// Create a handle plus the receiver the transport waits on.
    pub fn channel(method: &str) -> (Self, oneshot::Receiver<RpcResponse>) {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4().simple().to_string();
        let log_id = format!("{method}/{}", &id[..8]);
        (Self { tx, log_id }, rx)
    }

    /// Deliver the answer. Returns false if the caller has gone away.
    pub fn send(self, response: RpcResponse) -> bool {
        let log_id = self.log_id;
        match self.tx.send(response) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(request = %log_id, "Caller gone before response was sent");
                false
            }
        }
    }

    /// True once the caller stopped waiting.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_once() {
        let (responder, mut rx) = Responder::channel("ping");
        assert!(responder.log_id().starts_with("ping/"));
        assert!(responder.send(RpcResponse::ok(0)));
        assert_eq!(rx.try_recv().unwrap(), RpcResponse::ok(0));
    }

    #[test]
    fn reports_closed_caller() {
        let (responder, rx) = Responder::channel("ping");
        drop(rx);
        assert!(responder.is_closed());
        assert!(!responder.send(RpcResponse::ok(0)));
    }
}
