// =============================================================================
// Deriv message router: req_id correlation and subscription fan-out
// =============================================================================
//
// Every outbound request carries a client-assigned `req_id` that Deriv echoes
// back on the response and on every later message of a subscription. The
// router owns:
//   - `pending`: one-shot waiters for the first reply to each request.
//   - `streams`: long-lived subscription sinks, keyed by the same req_id.
//   - `latest`:  the newest stream per msg_type, used for messages whose
//                req_id is unknown (e.g. a subscription that already existed
//                before this connection asked for it).
//
// Nothing here touches the socket, so routing is tested with plain JSON.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::types::{Proposal, Tick};

/// Error object returned by the Deriv API inside a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Deriv API error {code}: {message}")]
pub struct DerivApiError {
    pub code: String,
    pub message: String,
}

impl DerivApiError {
    pub fn is_already_subscribed(&self) -> bool {
        self.code == "AlreadySubscribed"
            || self.message.to_lowercase().contains("already subscribed")
    }
}

pub(crate) type Reply = std::result::Result<Value, DerivApiError>;

// =============================================================================
// Envelope
// =============================================================================

/// A parsed inbound frame.
#[derive(Debug, Clone)]
pub(crate) struct Envelope {
    pub req_id: Option<u64>,
    pub msg_type: String,
    pub body: Reply,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text).context("failed to parse Deriv JSON")?;

        let req_id = root.get("req_id").and_then(Value::as_u64);
        let msg_type = root
            .get("msg_type")
            .and_then(Value::as_str)
            .context("missing field msg_type")?
            .to_string();

        let body = match root.get("error") {
            Some(err) => Err(DerivApiError {
                code: err["code"].as_str().unwrap_or("Unknown").to_string(),
                message: err["message"].as_str().unwrap_or_default().to_string(),
            }),
            None => Ok(root),
        };

        Ok(Self {
            req_id,
            msg_type,
            body,
        })
    }
}

// =============================================================================
// Stream sinks
// =============================================================================

/// Capacity of every subscription channel.
pub(crate) const STREAM_BUFFER: usize = 256;

pub(crate) enum StreamSink {
    Ticks {
        symbol: String,
        tx: mpsc::Sender<Tick>,
    },
    Proposals(mpsc::Sender<Proposal>),
    OpenContract {
        contract_id: u64,
        tx: mpsc::Sender<Value>,
    },
}

/// Result of handing one message to a sink.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Message belonged to another symbol / contract or could not be parsed.
    Skipped,
    /// Receiver is gone; the sink should be dropped.
    Closed,
    /// Contract settled; the sink should be dropped and the server-side
    /// subscription forgotten.
    Finished { subscription_id: Option<String> },
}

impl StreamSink {
    fn msg_type(&self) -> &'static str {
        match self {
            Self::Ticks { .. } => "tick",
            Self::Proposals(_) => "proposal",
            Self::OpenContract { .. } => "proposal_open_contract",
        }
    }

    pub fn forward(&self, body: &Value) -> Delivery {
        match self {
            Self::Ticks { symbol, tx } => {
                let tick: Tick = match serde_json::from_value(body["tick"].clone()) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "failed to parse tick payload");
                        return Delivery::Skipped;
                    }
                };
                if &tick.symbol != symbol {
                    return Delivery::Skipped;
                }
                send(tx, tick)
            }
            Self::Proposals(tx) => match serde_json::from_value(body["proposal"].clone()) {
                Ok(p) => send(tx, p),
                Err(e) => {
                    warn!(error = %e, "failed to parse proposal payload");
                    Delivery::Skipped
                }
            },
            Self::OpenContract { contract_id, tx } => {
                let poc = &body["proposal_open_contract"];
                if poc["contract_id"].as_u64() != Some(*contract_id) {
                    return Delivery::Skipped;
                }
                let sold = poc["is_sold"].as_u64() == Some(1) || poc["is_sold"].as_bool() == Some(true);
                match send(tx, poc.clone()) {
                    Delivery::Delivered if sold => Delivery::Finished {
                        subscription_id: subscription_id(body),
                    },
                    other => other,
                }
            }
        }
    }
}

fn send<T>(tx: &mpsc::Sender<T>, item: T) -> Delivery {
    match tx.try_send(item) {
        Ok(()) => Delivery::Delivered,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!("subscription channel full, dropping message");
            Delivery::Skipped
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
    }
}

/// `subscription.id` of a streamed message, if present.
pub(crate) fn subscription_id(body: &Value) -> Option<String> {
    body["subscription"]["id"].as_str().map(str::to_string)
}

// =============================================================================
// Router
// =============================================================================

#[derive(Default)]
pub(crate) struct Router {
    next_req_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    streams: Mutex<HashMap<u64, StreamSink>>,
    latest: Mutex<HashMap<&'static str, u64>>,
}

impl Router {
    /// Allocate a fresh request id (starting at 1).
    pub fn next_req_id(&self) -> u64 {
        self.next_req_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Register a waiter for the first reply to `req_id`.
    pub fn expect_reply(&self, req_id: u64) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(req_id, tx);
        rx
    }

    pub fn cancel_reply(&self, req_id: u64) {
        self.pending.lock().remove(&req_id);
    }

    /// Register a subscription sink; it also becomes the fallback for its
    /// msg_type.
    pub fn add_stream(&self, req_id: u64, sink: StreamSink) {
        self.latest.lock().insert(sink.msg_type(), req_id);
        self.streams.lock().insert(req_id, sink);
    }

    pub fn remove_stream(&self, req_id: u64) {
        if let Some(sink) = self.streams.lock().remove(&req_id) {
            let mut latest = self.latest.lock();
            if latest.get(sink.msg_type()) == Some(&req_id) {
                latest.remove(sink.msg_type());
            }
        }
    }

    /// Drop every stream of the given msg_type (e.g. all tick sinks).
    pub fn remove_streams_of(&self, msg_type: &str) {
        self.streams.lock().retain(|_, sink| sink.msg_type() != msg_type);
        self.latest.lock().remove(msg_type);
    }

    /// Fail every waiting request, e.g. when the socket closes. Dropping the
    /// senders wakes the receivers with `RecvError`.
    pub fn close_all(&self) {
        let dropped = self.pending.lock().drain().count();
        self.streams.lock().clear();
        self.latest.lock().clear();
        if dropped > 0 {
            warn!(dropped, "connection closed with requests in flight");
        }
    }

    /// Route one inbound envelope. Returns the subscription id to forget when
    /// a stream finished on its own.
    pub fn dispatch(&self, envelope: Envelope) -> Option<String> {
        if let Some(req_id) = envelope.req_id {
            if let Some(tx) = self.pending.lock().remove(&req_id) {
                // The waiter may have timed out; nothing to do then.
                let _ = tx.send(envelope.body);
                return None;
            }
        }

        let body = match envelope.body {
            Ok(body) => body,
            Err(e) => {
                warn!(req_id = ?envelope.req_id, msg_type = %envelope.msg_type, error = %e, "unsolicited error message");
                return None;
            }
        };

        let target = envelope
            .req_id
            .filter(|id| self.streams.lock().contains_key(id))
            .or_else(|| self.latest.lock().get(envelope.msg_type.as_str()).copied());

        let Some(req_id) = target else {
            debug!(msg_type = %envelope.msg_type, "unrouted message");
            return None;
        };

        let delivery = match self.streams.lock().get(&req_id) {
            Some(sink) => sink.forward(&body),
            None => return None,
        };

        match delivery {
            Delivery::Delivered | Delivery::Skipped => None,
            Delivery::Closed => {
                debug!(req_id, "subscription receiver dropped");
                self.remove_stream(req_id);
                None
            }
            Delivery::Finished { subscription_id } => {
                debug!(req_id, "subscription finished");
                self.remove_stream(req_id);
                subscription_id
            }
        }
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    #[cfg(test)]
    pub fn streams_len(&self) -> usize {
        self.streams.lock().len()
    }
}
