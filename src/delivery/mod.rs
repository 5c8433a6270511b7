//! # Delivery Module
//!
//! The asynchronous delivery channel: executes captured handler functions
//! off the calling thread and forwards each result, or failure, to the
//! delivery sink of the call that spawned it.
//!
//! ## Overview
//!
//! The delivery channel is the sole parallelism boundary of the crate:
//!
//! - Work is submitted with `send(context, work)` and queued on an MPSC
//!   channel; the submitting thread returns immediately
//! - A pool of `may` worker coroutines shares the queue and load balances
//!   across submissions
//! - Each unit executes under panic recovery; a panic becomes a failure
//!   delivery instead of a dead worker
//! - The outcome is forwarded to the sink registered under the submitting
//!   call's correlation id
//!
//! ## Ordering
//!
//! Delivery to a sink happens-after the completion of its unit of work. No
//! ordering is guaranteed between units submitted from different contexts.
//!
//! ## Failure policy
//!
//! Failures raised by the captured function (including argument shape
//! mismatches and panics) are wrapped into [`InvocationError`] and
//! delivered as failed [`Delivery`] values. A result completing with no
//! registered sink, or a sink whose receiver is gone, is dropped with a
//! warning and counted in the pool metrics; nothing is retried and nothing
//! reaches the original caller.

mod core;
mod worker;

pub use self::core::{
    sink_channel, Delivery, InvocationError, SinkReceiver, SinkRegistry, SinkSender,
};
pub use worker::{DeliveryChannel, DeliveryConfig, DeliveryHandle, DeliveryMetrics};
