#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, unsafe_code)]

//! Tests for the delivery channel's sink policy
//!
//! # Test Coverage
//!
//! - Results completing with no registered sink are dropped and counted
//! - Sinks whose receiver is gone are pruned and the delivery counted as
//!   dropped
//! - Invocations arriving with no ambient context run under a detached
//!   context
//! - Subscribe / unsubscribe lifecycle

use boomerang::context::{ContextScope, RequestContext};
use boomerang::delivery::{sink_channel, DeliveryChannel, DeliveryConfig};
use boomerang::dispatcher::{ArgVec, DeferredEntry, HandlerDescriptor, InvocationUnit};
use boomerang::registration::RouteMeta;
use http::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
mod tracing_util;
use tracing_util::TestTracing;

fn set_stack_size() -> TestTracing {
    may::config().set_stack_size(0x8000);
    TestTracing::init()
}

fn start_channel() -> DeliveryChannel {
    unsafe { DeliveryChannel::start(DeliveryConfig::new(1, 0x8000)) }
}

fn noop_entry(channel: &DeliveryChannel) -> DeferredEntry {
    let descriptor = Arc::new(HandlerDescriptor::from_fn0(Arc::new(()), |_: &()| {
        Ok(json!("done"))
    }));
    let unit = Arc::new(InvocationUnit::new(descriptor, channel.handle()));
    DeferredEntry::new(unit, RouteMeta::new("noop", Method::GET, "/noop"))
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

#[test]
fn test_result_without_a_sink_is_dropped_and_counted() {
    let _tracing = set_stack_size();
    let channel = start_channel();
    let entry = noop_entry(&channel);

    // Context installed, but no sink ever registered for it.
    let ctx = RequestContext::new(Method::GET, "/noop");
    let _scope = ContextScope::enter(ctx);
    entry.invoke(ArgVec::new());

    let metrics = channel.handle().metrics().clone();
    assert!(
        wait_until(Duration::from_secs(2), || metrics.get_dropped_count() == 1),
        "delivery was not dropped within the deadline"
    );
    assert_eq!(metrics.get_submitted_count(), 1);
    assert_eq!(metrics.get_completed_count(), 1);
}

#[test]
fn test_closed_sink_is_pruned_and_counted_as_dropped() {
    let _tracing = set_stack_size();
    let channel = start_channel();
    let entry = noop_entry(&channel);

    let ctx = RequestContext::new(Method::GET, "/noop");
    let sink = channel.handle().subscribe(ctx.correlation_id);
    drop(sink);
    let _scope = ContextScope::enter(ctx);
    entry.invoke(ArgVec::new());

    let metrics = channel.handle().metrics().clone();
    assert!(
        wait_until(Duration::from_secs(2), || metrics.get_dropped_count() == 1),
        "delivery was not dropped within the deadline"
    );
}

#[test]
fn test_invocation_without_a_scope_runs_detached() {
    let _tracing = set_stack_size();
    let channel = start_channel();
    let entry = noop_entry(&channel);

    // No ContextScope installed: the ack still carries a correlation id
    // and the work still executes, delivering into the void.
    let ack = entry.invoke(ArgVec::new());
    assert!(!ack.correlation_id.to_string().is_empty());

    let metrics = channel.handle().metrics().clone();
    assert!(
        wait_until(Duration::from_secs(2), || {
            metrics.get_completed_count() == 1 && metrics.get_dropped_count() == 1
        }),
        "detached invocation did not complete within the deadline"
    );
}

#[test]
fn test_one_sink_can_serve_multiple_contexts() {
    let _tracing = set_stack_size();
    let channel = start_channel();
    assert_eq!(channel.config().num_workers, 1);
    let handle = channel.handle();
    let entry = noop_entry(&channel);

    // A fan-in transport: both calls deliver into the same receiver.
    let (tx, rx) = sink_channel();
    let first = RequestContext::new(Method::GET, "/noop").with_peer("10.0.0.1:9000");
    let second = RequestContext::new(Method::GET, "/noop").with_peer("10.0.0.2:9000");
    handle.attach_sink(first.correlation_id, tx.clone());
    handle.attach_sink(second.correlation_id, tx);

    let mut expected = vec![first.correlation_id, second.correlation_id];
    for ctx in [first, second] {
        let _scope = ContextScope::enter(ctx);
        entry.invoke(ArgVec::new());
    }

    for _ in 0..2 {
        let delivery = rx.recv().expect("delivery");
        let pos = expected
            .iter()
            .position(|id| *id == delivery.correlation_id)
            .expect("delivery keyed by a submitted context");
        expected.remove(pos);
        assert_eq!(delivery.outcome.unwrap(), json!("done"));
    }
    assert!(expected.is_empty());
}

#[test]
fn test_unsubscribe_removes_the_sink() {
    let _tracing = set_stack_size();
    let channel = start_channel();
    let handle = channel.handle();

    let ctx = RequestContext::new(Method::GET, "/noop");
    let id = ctx.correlation_id;
    let _sink = handle.subscribe(id);

    assert!(handle.unsubscribe(id));
    assert!(!handle.unsubscribe(id));

    // With the sink gone the delivery is dropped, not misrouted.
    let entry = noop_entry(&channel);
    let _scope = ContextScope::enter(ctx);
    entry.invoke(ArgVec::new());

    let metrics = handle.metrics().clone();
    assert!(
        wait_until(Duration::from_secs(2), || metrics.get_dropped_count() == 1),
        "delivery was not dropped within the deadline"
    );
}
