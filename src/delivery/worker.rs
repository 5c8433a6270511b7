//! Delivery worker pool: executes captured handler functions off the
//! calling thread and forwards each outcome to its sink.
//!
//! Workers are `may` coroutines sharing one job channel; all of them load
//! balance across submitted work. A panicking handler is caught and
//! converted into a failure delivery so one bad invocation never takes a
//! worker down.

use crate::context::RequestContext;
use crate::delivery::core::{Delivery, InvocationError, SinkRegistry, SinkSender};
use crate::delivery::sink_channel;
use crate::ids::CorrelationId;
use crate::runtime_config::RuntimeConfig;
use may::sync::mpsc;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Configuration for the delivery worker pool
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl DeliveryConfig {
    /// Load configuration from environment variables.
    ///
    /// - `BOOM_DELIVERY_WORKERS`: number of worker coroutines (default: 4)
    /// - `BOOM_STACK_SIZE`: worker stack size, hex or decimal (default: 0x4000)
    pub fn from_env() -> Self {
        let num_workers = std::env::var("BOOM_DELIVERY_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        let stack_size = RuntimeConfig::from_env().stack_size;

        Self {
            num_workers,
            stack_size,
        }
    }

    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers,
            stack_size,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            stack_size: 0x4000,
        }
    }
}

/// Counters for the delivery pool
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Units of work submitted to the pool
    pub submitted_count: AtomicU64,
    /// Units that completed with a success value
    pub completed_count: AtomicU64,
    /// Units that completed with a failure (handler error or panic)
    pub failed_count: AtomicU64,
    /// Deliveries dropped because no live sink was registered
    pub dropped_count: AtomicU64,
}

impl DeliveryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_submitted_count(&self) -> u64 {
        self.submitted_count.load(Ordering::Relaxed)
    }

    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    pub fn get_failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn get_dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }
}

/// One unit of deferred work: the captured call plus the context it was
/// submitted under.
struct DeliveryJob {
    context: RequestContext,
    work: Box<dyn FnOnce() -> Result<Value, InvocationError> + Send>,
}

/// Cloneable handle for submitting work and managing sinks.
///
/// This is the `send(context, work)` surface the dispatch core talks to;
/// the transport side uses [`subscribe`](DeliveryHandle::subscribe) /
/// [`unsubscribe`](DeliveryHandle::unsubscribe) to wire sinks.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<DeliveryJob>,
    sinks: Arc<SinkRegistry>,
    metrics: Arc<DeliveryMetrics>,
}

impl DeliveryHandle {
    /// Schedule `work` for execution on a worker coroutine. Returns as soon
    /// as the unit is queued; the outcome is forwarded to the sink
    /// registered under `context.correlation_id` once the work completes.
    pub fn send<W>(&self, context: RequestContext, work: W)
    where
        W: FnOnce() -> Result<Value, InvocationError> + Send + 'static,
    {
        self.metrics.record_submitted();
        let correlation_id = context.correlation_id;
        let job = DeliveryJob {
            context,
            work: Box::new(work),
        };
        if let Err(e) = self.tx.send(job) {
            self.metrics.record_dropped();
            error!(
                correlation_id = %correlation_id,
                error = %e,
                "Delivery channel disconnected - dropping work"
            );
        }
    }

    /// Register a sink for a correlation id and return its receiver half.
    pub fn subscribe(&self, id: CorrelationId) -> crate::delivery::SinkReceiver {
        let (tx, rx) = sink_channel();
        self.sinks.insert(id, tx);
        rx
    }

    /// Register an externally created sink sender for a correlation id.
    pub fn attach_sink(&self, id: CorrelationId, sender: SinkSender) {
        self.sinks.insert(id, sender);
    }

    /// Remove the sink for a correlation id, e.g. when the originating
    /// connection closed. Returns whether one existed.
    pub fn unsubscribe(&self, id: CorrelationId) -> bool {
        self.sinks.remove(id)
    }

    pub fn metrics(&self) -> &Arc<DeliveryMetrics> {
        &self.metrics
    }
}

/// The asynchronous delivery channel: a pool of worker coroutines plus the
/// sink registry results are forwarded through.
pub struct DeliveryChannel {
    handle: DeliveryHandle,
    config: DeliveryConfig,
}

impl DeliveryChannel {
    /// Start the delivery pool with the given configuration.
    ///
    /// # Safety
    ///
    /// This function is marked unsafe because it spawns coroutines using
    /// `may::coroutine::Builder::spawn()`, which is unsafe in the `may`
    /// runtime. The caller must ensure the May coroutine runtime is
    /// properly initialized before calling this.
    pub unsafe fn start(config: DeliveryConfig) -> Self {
        let (tx, rx) = mpsc::channel::<DeliveryJob>();
        let rx = Arc::new(rx);
        let sinks = Arc::new(SinkRegistry::new());
        let metrics = Arc::new(DeliveryMetrics::new());

        info!(
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Starting delivery worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let sinks = Arc::clone(&sinks);
            let metrics = Arc::clone(&metrics);

            // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by
            // the may runtime. The closure owns its channel and registry
            // handles (Send + 'static), and worker failures are routed
            // through the sink registry rather than unwound.
            let spawn_result = unsafe {
                may::coroutine::Builder::new()
                    .stack_size(config.stack_size)
                    .spawn(move || {
                        debug!(worker_id, "Delivery worker start");

                        loop {
                            let job = match rx.recv() {
                                Ok(job) => job,
                                Err(_) => break,
                            };
                            let DeliveryJob { context, work } = job;
                            let correlation_id = context.correlation_id;

                            info!(
                                correlation_id = %correlation_id,
                                worker_id,
                                method = %context.method,
                                path = %context.path,
                                "Executing deferred work"
                            );
                            let start = Instant::now();

                            let outcome = match std::panic::catch_unwind(
                                std::panic::AssertUnwindSafe(move || work()),
                            ) {
                                Ok(result) => result,
                                Err(panic) => {
                                    let panic_message = format!("{panic:?}");
                                    error!(
                                        correlation_id = %correlation_id,
                                        worker_id,
                                        panic_message = %panic_message,
                                        "Deferred work panicked - CRITICAL"
                                    );
                                    Err(InvocationError::Panicked(panic_message))
                                }
                            };

                            let execution_time_ms = start.elapsed().as_millis() as u64;
                            match &outcome {
                                Ok(_) => {
                                    metrics.record_completed();
                                    debug!(
                                        correlation_id = %correlation_id,
                                        worker_id,
                                        execution_time_ms,
                                        "Deferred work complete"
                                    );
                                }
                                Err(err) => {
                                    metrics.record_failed();
                                    warn!(
                                        correlation_id = %correlation_id,
                                        worker_id,
                                        execution_time_ms,
                                        error = %err,
                                        "Deferred work failed"
                                    );
                                }
                            }

                            let delivered = sinks.deliver(Delivery {
                                correlation_id,
                                outcome,
                            });
                            if !delivered {
                                metrics.record_dropped();
                            }
                        }

                        debug!(worker_id, "Delivery worker exiting");
                    })
            };

            if let Err(e) = spawn_result {
                error!(
                    worker_id,
                    error = %e,
                    stack_size = config.stack_size,
                    "Failed to spawn delivery worker - CRITICAL"
                );
            }
        }

        Self {
            handle: DeliveryHandle { tx, sinks, metrics },
            config,
        }
    }

    /// Get a cloneable handle for submitting work and managing sinks.
    pub fn handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = DeliveryConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.stack_size, 0x4000);
    }

    #[test]
    fn config_from_env_reads_worker_count() {
        std::env::set_var("BOOM_DELIVERY_WORKERS", "7");
        assert_eq!(DeliveryConfig::from_env().num_workers, 7);
        std::env::remove_var("BOOM_DELIVERY_WORKERS");
        assert_eq!(DeliveryConfig::from_env().num_workers, 4);
    }

    #[test]
    fn metrics_counters() {
        let metrics = DeliveryMetrics::new();

        assert_eq!(metrics.get_submitted_count(), 0);
        assert_eq!(metrics.get_completed_count(), 0);
        assert_eq!(metrics.get_failed_count(), 0);
        assert_eq!(metrics.get_dropped_count(), 0);

        metrics.record_submitted();
        metrics.record_completed();
        metrics.record_failed();
        metrics.record_dropped();

        assert_eq!(metrics.get_submitted_count(), 1);
        assert_eq!(metrics.get_completed_count(), 1);
        assert_eq!(metrics.get_failed_count(), 1);
        assert_eq!(metrics.get_dropped_count(), 1);
    }
}
