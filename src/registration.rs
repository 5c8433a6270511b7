//! # Route Registration Module
//!
//! The registration object owned by the calling (routing) infrastructure,
//! modeled as the narrow interface this crate consumes.
//!
//! ## Overview
//!
//! A [`RouteRegistration`] pairs a route's identity ([`RouteMeta`]) with its
//! dispatch target: the callable receiver and the function reference the
//! infrastructure invokes to service the route. The infrastructure treats
//! the target as fixed once the registration is constructed; the only
//! sanctioned write path after construction is the one-shot rebind used by
//! the substitution shim, which redirects the target to a deferred entry
//! point.
//!
//! ## Snapshot semantics
//!
//! When the infrastructure wires its invocation pipeline it copies the
//! target out of the registration by value ([`RouteRegistration::snapshot`])
//! into its own wrapper ([`BoundTarget`]). A snapshot taken before
//! substitution would make a later rewrite invisible - the wrapper keeps
//! dispatching to the original function. Registrations therefore track
//! whether a snapshot has been taken, and the rebind refuses to proceed
//! once one has.
//!
//! ## State machine
//!
//! `Unbound → Substituted`, terminal. Re-registration requires a fresh
//! registration and invocation unit.

use crate::substitution::SubstitutionError;
use arc_swap::ArcSwap;
use http::Method;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Type-erased callable receiver: the object a handler function is invoked on.
pub type Receiver = dyn Any + Send + Sync;

/// Type-erased handler function reference.
///
/// Arguments arrive as an ordered sequence and are expanded positionally by
/// the callable itself; the sequence is never passed on as one composite
/// value.
pub type HandlerFn = dyn Fn(&Receiver, &[Value]) -> anyhow::Result<Value> + Send + Sync;

pub(crate) fn downcast_receiver<R: Any>(recv: &Receiver) -> anyhow::Result<&R> {
    recv.downcast_ref::<R>().ok_or_else(|| {
        anyhow::anyhow!(
            "receiver is not a {}",
            std::any::type_name::<R>()
        )
    })
}

/// Identity of a registered route.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    /// Name of the handler that services this route
    pub handler_name: Arc<str>,
    /// Method of the inbound call pattern
    pub method: Method,
    /// Path pattern of the inbound call pattern
    pub path_pattern: Arc<str>,
}

impl RouteMeta {
    pub fn new(handler_name: &str, method: Method, path_pattern: &str) -> Self {
        Self {
            handler_name: Arc::from(handler_name),
            method,
            path_pattern: Arc::from(path_pattern),
        }
    }
}

/// The rewritable dispatch slot of a registration: receiver + callable.
///
/// `arity` is `Some(n)` for an ordinary handler expecting exactly `n`
/// arguments and `None` for a variadic target such as the deferred entry
/// point.
#[derive(Clone)]
pub struct DispatchTarget {
    /// The callable receiver the function is invoked on
    pub receiver: Arc<Receiver>,
    /// The function reference the infrastructure dispatches to
    pub callable: Arc<HandlerFn>,
    /// Expected argument count, or `None` for variadic targets
    pub arity: Option<usize>,
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTarget")
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

const UNBOUND: u8 = 0;
const SUBSTITUTED: u8 = 1;

/// A route registration owned by the calling infrastructure.
///
/// Constructed once per route; the target slot is read lock-free on the
/// dispatch path and rewritten at most once by the substitution shim.
pub struct RouteRegistration {
    meta: RouteMeta,
    target: ArcSwap<DispatchTarget>,
    state: AtomicU8,
    snapshotted: AtomicBool,
}

impl RouteRegistration {
    pub fn new(meta: RouteMeta, target: DispatchTarget) -> Self {
        Self {
            meta,
            target: ArcSwap::from_pointee(target),
            state: AtomicU8::new(UNBOUND),
            snapshotted: AtomicBool::new(false),
        }
    }

    pub fn meta(&self) -> &RouteMeta {
        &self.meta
    }

    pub fn is_substituted(&self) -> bool {
        self.state.load(Ordering::SeqCst) == SUBSTITUTED
    }

    /// Copy the current target by value, the way the infrastructure builds
    /// its own invocation wrapper when wiring the dispatch pipeline.
    ///
    /// May be called any number of times; every snapshot after substitution
    /// dispatches to the deferred entry point.
    pub fn snapshot(&self) -> BoundTarget {
        self.snapshotted.store(true, Ordering::SeqCst);
        BoundTarget {
            handler_name: Arc::clone(&self.meta.handler_name),
            target: self.target.load_full(),
        }
    }

    /// Privileged one-shot rewrite of the target slot. Only the
    /// substitution shim may call this.
    pub(crate) fn rebind(&self, target: DispatchTarget) -> Result<(), SubstitutionError> {
        if self.snapshotted.load(Ordering::SeqCst) {
            return Err(SubstitutionError::TargetCopied {
                handler: self.meta.handler_name.to_string(),
            });
        }
        self.state
            .compare_exchange(UNBOUND, SUBSTITUTED, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| SubstitutionError::AlreadySubstituted {
                handler: self.meta.handler_name.to_string(),
            })?;
        self.target.store(Arc::new(target));
        // A snapshot racing the store above copied the original target by
        // value; the rewrite would be invisible to it. Fail hard instead.
        if self.snapshotted.load(Ordering::SeqCst) {
            return Err(SubstitutionError::TargetCopied {
                handler: self.meta.handler_name.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for RouteRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistration")
            .field("meta", &self.meta)
            .field("substituted", &self.is_substituted())
            .finish()
    }
}

/// The infrastructure's by-value copy of a registration's target: the only
/// thing its normal dispatch path sees.
pub struct BoundTarget {
    handler_name: Arc<str>,
    target: Arc<DispatchTarget>,
}

impl BoundTarget {
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    /// Invoke the bound target with an ordered argument sequence, the way
    /// the infrastructure services an inbound call.
    pub fn call(&self, args: &[Value]) -> anyhow::Result<Value> {
        if let Some(arity) = self.target.arity {
            if args.len() != arity {
                anyhow::bail!(
                    "handler '{}' expects {} arguments, got {}",
                    self.handler_name,
                    arity,
                    args.len()
                );
            }
        }
        (self.target.callable)(self.target.receiver.as_ref(), args)
    }
}
