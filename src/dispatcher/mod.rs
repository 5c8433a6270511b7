//! # Dispatcher Module
//!
//! The deferred dispatch core: captures a handler function as a reusable
//! unit of work and exposes the uniform entry point the routing
//! infrastructure invokes in its place.
//!
//! ## Overview
//!
//! Three pieces cooperate here:
//!
//! - [`HandlerDescriptor`] - an immutable capture of {receiver, function,
//!   arity}, one per registered route
//! - [`InvocationUnit`] - the descriptor paired with the delivery channel
//!   its results flow through
//! - [`DeferredEntry`] - the fixed-signature entry point substituted for
//!   the original handler; resolves the ambient request context, submits
//!   the work, and returns an [`Ack`] immediately
//!
//! ## Argument handling
//!
//! Arguments travel as an explicit ordered sequence ([`ArgVec`]) at every
//! layer and are expanded positionally at the final call site by the typed
//! `from_fn*` constructors. A sequence of N arguments always reaches the
//! target function as N separate parameters, in order - never as one
//! composite value.
//!
//! ## Invocation Flow
//!
//! 1. Infrastructure resolves a route and invokes its bound target
//! 2. Substitution has redirected that target to [`DeferredEntry::invoke`]
//! 3. The entry captures the ambient context synchronously and submits the
//!    invocation to the delivery channel
//! 4. The caller gets an [`Ack`] back without waiting
//! 5. A worker coroutine executes the captured function and the result is
//!    forwarded to the sink keyed by the captured context
//!
//! ## Error Handling
//!
//! Nothing escapes to the caller after the entry point returns. Arity
//! mismatches, handler errors, and panics all surface as failure
//! deliveries on the originating call's sink.

mod core;

pub use self::core::{
    Ack, ArgVec, DeferredEntry, HandlerDescriptor, InvocationUnit, MAX_INLINE_ARGS,
};
