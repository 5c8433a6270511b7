//! # Boomerang
//!
//! **Boomerang** is a deferred-invocation dispatch core for Rust, built on
//! the `may` coroutine runtime: throw a handler call, get an immediate
//! acknowledgement, and catch the result later on an out-of-band delivery
//! sink.
//!
//! ## Overview
//!
//! A routing layer normally invokes a handler synchronously and returns
//! whatever the handler produces. Boomerang intercepts that call: an
//! existing route registration is redirected to a uniform deferred entry
//! point, the original function plus its receiver are captured as an
//! immutable unit of work, and each invocation is executed on a worker
//! coroutine while the calling thread returns immediately. The eventual
//! result - success value or failure cause - is forwarded to a delivery
//! sink keyed by the correlation id of the call that spawned it.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`registration`]** - The infrastructure-owned route registration, its
//!   rewritable dispatch-target slot, and the by-value snapshot path
//! - **[`dispatcher`]** - Handler capture ([`HandlerDescriptor`],
//!   [`InvocationUnit`]) and the uniform entry point ([`DeferredEntry`])
//! - **[`substitution`]** - The one-shot privileged redirect of a
//!   registration to the deferred entry point
//! - **[`registry`]** - Route ownership; registration and substitution as
//!   one atomic step
//! - **[`delivery`]** - Worker coroutines executing captured calls and the
//!   sink registry results are forwarded through
//! - **[`context`]** - Call-scoped request context and the ambient accessor
//! - **[`ids`]** - ULID-backed correlation ids
//! - **[`runtime_config`]** - Environment-based runtime configuration
//!
//! ### Deferred Invocation Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Infra as Routing Infrastructure
//!     participant Reg as RouteRegistration
//!     participant Entry as DeferredEntry
//!     participant Delivery as DeliveryChannel<br/>(may coroutines)
//!     participant Sink as Delivery Sink
//!
//!     Note over Reg: register + substitute<br/>(atomic, before any snapshot)
//!     Infra->>Reg: snapshot()
//!     Reg-->>Infra: BoundTarget (deferred)
//!
//!     Infra->>Entry: call(args...)
//!     Entry->>Entry: capture ambient RequestContext
//!     Entry->>Delivery: send(ctx, work)
//!     Entry-->>Infra: Ack {correlation_id}
//!
//!     Note over Delivery: later, off the calling thread
//!     Delivery->>Delivery: execute captured function<br/>(panic recovery)
//!     Delivery->>Sink: Delivery {correlation_id, outcome}
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use boomerang::context::{ContextScope, RequestContext};
//! use boomerang::delivery::{DeliveryChannel, DeliveryConfig};
//! use boomerang::dispatcher::HandlerDescriptor;
//! use boomerang::registration::RouteMeta;
//! use boomerang::registry::AsyncRouteRegistry;
//! use http::Method;
//! use serde_json::{json, Value};
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! let channel = unsafe { DeliveryChannel::start(DeliveryConfig::from_env()) };
//! let mut registry = AsyncRouteRegistry::new(channel.handle());
//!
//! let registration = registry
//!     .register(
//!         RouteMeta::new("greet", Method::GET, "/greet/{name}"),
//!         HandlerDescriptor::from_fn1(Arc::new(Greeter), |_g: &Greeter, name: Value| {
//!             Ok(json!(format!("Hello, {}", name.as_str().unwrap_or("?"))))
//!         }),
//!     )
//!     .expect("register route");
//!
//! // The infrastructure wires its pipeline and services a call:
//! let ctx = RequestContext::new(Method::GET, "/greet/{name}");
//! let sink = channel.handle().subscribe(ctx.correlation_id);
//! let _scope = ContextScope::enter(ctx);
//! let ack = registration.snapshot().call(&[json!("Ada")]).expect("ack");
//! // ...returns immediately; the greeting arrives on the sink later.
//! let delivery = sink.recv().expect("delivery");
//! assert_eq!(delivery.outcome.unwrap(), json!("Hello, Ada"));
//! ```
//!
//! ## Runtime Considerations
//!
//! Boomerang uses the `may` coroutine runtime, not tokio or async-std:
//!
//! - Captured handler functions run in worker coroutines
//! - Stack size is configurable via the `BOOM_STACK_SIZE` environment
//!   variable, worker count via `BOOM_DELIVERY_WORKERS`
//! - Blocking operations inside handlers should use `may`'s facilities
//!
//! Once a unit of work is submitted there is no cancellation and no
//! timeout at this layer; any timeout policy belongs to the surrounding
//! executor or transport.

pub mod context;
pub mod delivery;
pub mod dispatcher;
pub mod ids;
pub mod registration;
pub mod registry;
pub mod runtime_config;
pub mod substitution;

pub use context::{ContextScope, RequestContext};
pub use delivery::{
    Delivery, DeliveryChannel, DeliveryConfig, DeliveryHandle, DeliveryMetrics, InvocationError,
    SinkReceiver, SinkSender,
};
pub use dispatcher::{Ack, ArgVec, DeferredEntry, HandlerDescriptor, InvocationUnit};
pub use ids::CorrelationId;
pub use registration::{
    BoundTarget, DispatchTarget, HandlerFn, Receiver, RouteMeta, RouteRegistration,
};
pub use registry::AsyncRouteRegistry;
pub use substitution::{substitute, SubstitutionError};
