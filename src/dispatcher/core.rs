//! Dispatcher core module - hot path for deferred dispatch.

use crate::context::{self, RequestContext};
use crate::delivery::DeliveryHandle;
use crate::ids::CorrelationId;
use crate::registration::{downcast_receiver, DispatchTarget, HandlerFn, Receiver, RouteMeta};
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum inline arguments before heap allocation.
/// Handler functions rarely take more than a handful of parameters.
pub const MAX_INLINE_ARGS: usize = 4;

/// Stack-allocated argument storage for the dispatch hot path.
///
/// Arguments travel as an explicit ordered sequence through every layer and
/// are expanded positionally at the final call site. The sequence is never
/// collapsed into a single composite argument.
pub type ArgVec = SmallVec<[Value; MAX_INLINE_ARGS]>;

/// Immutable capture of a target function and its receiver.
///
/// Created once when a route is registered for deferred execution, owned by
/// the route's [`InvocationUnit`], and dropped when the route is
/// unregistered. Exactly one descriptor exists per logical route; it holds
/// no per-call state and is safely shared across concurrent invocations.
pub struct HandlerDescriptor {
    receiver: Arc<Receiver>,
    callable: Arc<HandlerFn>,
    arity: usize,
}

impl HandlerDescriptor {
    pub fn new(receiver: Arc<Receiver>, callable: Arc<HandlerFn>, arity: usize) -> Self {
        Self {
            receiver,
            callable,
            arity,
        }
    }

    /// Capture a nullary handler function.
    pub fn from_fn0<R, F>(receiver: Arc<R>, f: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&R) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let callable: Arc<HandlerFn> = Arc::new(move |recv: &Receiver, args: &[Value]| {
            match args {
                [] => f(downcast_receiver::<R>(recv)?),
                _ => anyhow::bail!("expected no arguments, got {}", args.len()),
            }
        });
        Self::new(receiver, callable, 0)
    }

    /// Capture a unary handler function. The single argument is taken
    /// positionally from the sequence.
    pub fn from_fn1<R, F>(receiver: Arc<R>, f: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&R, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let callable: Arc<HandlerFn> = Arc::new(move |recv: &Receiver, args: &[Value]| {
            match args {
                [a] => f(downcast_receiver::<R>(recv)?, a.clone()),
                _ => anyhow::bail!("expected exactly 1 argument, got {}", args.len()),
            }
        });
        Self::new(receiver, callable, 1)
    }

    /// Capture a binary handler function. Arguments are taken positionally,
    /// each bound to its own parameter.
    pub fn from_fn2<R, F>(receiver: Arc<R>, f: F) -> Self
    where
        R: Any + Send + Sync,
        F: Fn(&R, Value, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let callable: Arc<HandlerFn> = Arc::new(move |recv: &Receiver, args: &[Value]| {
            match args {
                [a, b] => f(downcast_receiver::<R>(recv)?, a.clone(), b.clone()),
                _ => anyhow::bail!("expected exactly 2 arguments, got {}", args.len()),
            }
        });
        Self::new(receiver, callable, 2)
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// The dispatch target a registration for this handler is constructed
    /// with, before substitution redirects it.
    pub fn dispatch_target(&self) -> DispatchTarget {
        DispatchTarget {
            receiver: Arc::clone(&self.receiver),
            callable: Arc::clone(&self.callable),
            arity: Some(self.arity),
        }
    }

    /// Execute the captured function with an ordered argument sequence.
    ///
    /// Runs on a delivery worker, never on the calling thread. Arity is
    /// checked before the call; the sequence is then expanded positionally
    /// by the callable.
    pub fn call(&self, args: &[Value]) -> Result<Value, crate::delivery::InvocationError> {
        use crate::delivery::InvocationError;

        if args.len() != self.arity {
            return Err(InvocationError::ArgumentShape {
                expected: self.arity,
                actual: args.len(),
            });
        }
        (self.callable)(self.receiver.as_ref(), args).map_err(InvocationError::Handler)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// Immutable pairing of a handler descriptor with the delivery channel its
/// results flow through.
///
/// One unit exists per registered route, shared across all invocations of
/// that route. Arguments are passed per call, never stored here.
pub struct InvocationUnit {
    descriptor: Arc<HandlerDescriptor>,
    delivery: DeliveryHandle,
}

impl InvocationUnit {
    pub fn new(descriptor: Arc<HandlerDescriptor>, delivery: DeliveryHandle) -> Self {
        Self {
            descriptor,
            delivery,
        }
    }

    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    /// Submit one invocation of the captured function to the delivery
    /// channel. Does not block: the captured function runs later on a
    /// worker coroutine, and any failure it raises becomes a failure
    /// delivery rather than an error here.
    pub fn invoke(&self, ctx: RequestContext, args: ArgVec) {
        let descriptor = Arc::clone(&self.descriptor);
        self.delivery.send(ctx, move || descriptor.call(&args));
    }
}

/// Acknowledgement returned to the caller as soon as an invocation has been
/// submitted. Carries the correlation id the eventual delivery is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ack {
    /// Correlation id of the call the result will be delivered under
    pub correlation_id: CorrelationId,
}

/// The uniform entry point substituted for a route's original handler.
///
/// This is the only callable the routing infrastructure sees once
/// substitution has completed. It accepts a variable-length ordered
/// argument list, resolves the ambient request context, submits the real
/// work, and returns without waiting for it.
pub struct DeferredEntry {
    unit: Arc<InvocationUnit>,
    route: RouteMeta,
}

impl DeferredEntry {
    pub fn new(unit: Arc<InvocationUnit>, route: RouteMeta) -> Self {
        Self { unit, route }
    }

    pub fn route(&self) -> &RouteMeta {
        &self.route
    }

    /// Accept one inbound call and return immediately.
    ///
    /// The ambient context is captured synchronously, before control
    /// returns to the caller; request-scoped data may become invalid the
    /// moment this function returns. An invocation arriving with no scope
    /// installed runs under a detached context with a fresh correlation id.
    pub fn invoke(&self, args: ArgVec) -> Ack {
        let ctx = match context::current() {
            Some(ctx) => ctx,
            None => {
                warn!(
                    handler_name = %self.route.handler_name,
                    "No ambient request context - delivering under a detached context"
                );
                RequestContext::detached()
            }
        };
        let correlation_id = ctx.correlation_id;

        debug!(
            correlation_id = %correlation_id,
            handler_name = %self.route.handler_name,
            arg_count = args.len(),
            "Deferred invocation accepted"
        );

        self.unit.invoke(ctx, args);
        Ack { correlation_id }
    }
}

impl fmt::Debug for DeferredEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredEntry")
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}
