//! Delivery core types: invocation outcomes, sink channels, and the
//! registry that routes a finished result to the sink of the call that
//! spawned it.

use crate::ids::CorrelationId;
use dashmap::DashMap;
use may::sync::mpsc;
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Failure raised while executing a captured handler function.
///
/// These never propagate to the (already returned) calling thread; they are
/// wrapped into a failed [`Delivery`] and forwarded to the sink instead.
#[derive(Debug)]
pub enum InvocationError {
    /// The argument sequence did not match the arity the target expects
    ArgumentShape {
        /// Arguments the target function takes
        expected: usize,
        /// Arguments the entry point was invoked with
        actual: usize,
    },
    /// The target function returned an error
    Handler(anyhow::Error),
    /// The target function panicked on the worker coroutine
    Panicked(String),
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationError::ArgumentShape { expected, actual } => {
                write!(
                    f,
                    "argument shape mismatch: target expects {expected} arguments, got {actual}"
                )
            }
            InvocationError::Handler(cause) => {
                write!(f, "handler failed: {cause}")
            }
            InvocationError::Panicked(message) => {
                write!(f, "handler panicked: {message}")
            }
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvocationError::Handler(cause) => Some(cause.as_ref()),
            _ => None,
        }
    }
}

/// Outcome of one deferred invocation, produced once and consumed exactly
/// once by the sink keyed by its correlation id.
#[derive(Debug)]
pub struct Delivery {
    /// Correlation id of the call that spawned the work
    pub correlation_id: CorrelationId,
    /// Produced value, or the failure cause
    pub outcome: Result<Value, InvocationError>,
}

/// Sender side of a delivery sink.
///
/// Clone this to feed one sink from multiple places.
#[derive(Clone)]
pub struct SinkSender {
    tx: mpsc::Sender<Delivery>,
}

impl SinkSender {
    pub(crate) fn send(&self, delivery: Delivery) -> Result<(), std::sync::mpsc::SendError<Delivery>> {
        self.tx.send(delivery)
    }
}

/// Receiver side of a delivery sink, held by the delivery transport.
pub struct SinkReceiver {
    rx: mpsc::Receiver<Delivery>,
}

impl SinkReceiver {
    /// Block until the next delivery arrives or every sender is gone.
    pub fn recv(&self) -> Result<Delivery, std::sync::mpsc::RecvError> {
        self.rx.recv()
    }
}

/// Create a new delivery sink returning the sender and receiver halves.
pub fn sink_channel() -> (SinkSender, SinkReceiver) {
    let (tx, rx) = mpsc::channel();
    (SinkSender { tx }, SinkReceiver { rx })
}

/// Registry of live delivery sinks keyed by correlation id.
///
/// Sinks are registered by the delivery transport before the entry point is
/// invoked and removed when the originating connection goes away. A result
/// completing with no matching sink is dropped with a warning; there is no
/// consumer left to retry toward.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: DashMap<CorrelationId, SinkSender>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self {
            sinks: DashMap::new(),
        }
    }

    /// Register a sink for a correlation id. Replaces any previous sink
    /// under the same id.
    pub fn insert(&self, id: CorrelationId, sender: SinkSender) {
        if self.sinks.insert(id, sender).is_some() {
            warn!(correlation_id = %id, "Replaced existing delivery sink");
        }
    }

    /// Remove the sink for a correlation id. Returns whether one existed.
    pub fn remove(&self, id: CorrelationId) -> bool {
        self.sinks.remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Forward a delivery to the sink registered for its correlation id.
    ///
    /// Returns `false` when the delivery was dropped: no sink is registered,
    /// or the sink's receiver is gone (in which case the dead sink is also
    /// removed).
    pub(crate) fn deliver(&self, delivery: Delivery) -> bool {
        let id = delivery.correlation_id;
        let send_result = match self.sinks.get(&id) {
            Some(sink) => sink.send(delivery),
            None => {
                warn!(
                    correlation_id = %id,
                    "No delivery sink registered - dropping result"
                );
                return false;
            }
        };
        if send_result.is_err() {
            // Guard from the lookup above is released; safe to mutate.
            self.sinks.remove(&id);
            warn!(
                correlation_id = %id,
                "Delivery sink closed - removing it and dropping result"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deliver_routes_to_the_matching_sink() {
        let registry = SinkRegistry::new();
        let id = CorrelationId::new();
        let (tx, rx) = sink_channel();
        registry.insert(id, tx);

        assert!(registry.deliver(Delivery {
            correlation_id: id,
            outcome: Ok(json!("done")),
        }));
        let delivery = rx.recv().unwrap();
        assert_eq!(delivery.outcome.unwrap(), json!("done"));
    }

    #[test]
    fn deliver_drops_without_a_sink() {
        let registry = SinkRegistry::new();
        assert!(!registry.deliver(Delivery {
            correlation_id: CorrelationId::new(),
            outcome: Ok(json!(1)),
        }));
    }

    #[test]
    fn deliver_prunes_closed_sinks() {
        let registry = SinkRegistry::new();
        let id = CorrelationId::new();
        let (tx, rx) = sink_channel();
        registry.insert(id, tx);
        drop(rx);

        assert!(!registry.deliver(Delivery {
            correlation_id: id,
            outcome: Ok(json!(1)),
        }));
        assert!(registry.is_empty());
    }

    #[test]
    fn error_display_names_the_failure() {
        let err = InvocationError::ArgumentShape {
            expected: 2,
            actual: 1,
        };
        assert!(err.to_string().contains("expects 2 arguments"));

        let err = InvocationError::Handler(anyhow::anyhow!("boom"));
        assert!(err.to_string().contains("boom"));
    }
}
