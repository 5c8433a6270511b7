//! # Substitution Module
//!
//! Redirects an existing route registration to the deferred entry point.
//!
//! ## Overview
//!
//! The routing infrastructure constructs a registration once per route and
//! treats its dispatch target as fixed. To defer a route's execution, the
//! target must be rewritten after construction so the infrastructure's
//! normal dispatch path reaches [`DeferredEntry::invoke`] instead of the
//! original function - without the caller knowing anything changed.
//!
//! This module is the single privileged write path for that rewrite. The
//! deferred entry is packaged as an ordinary variadic [`DispatchTarget`]
//! whose callable recovers the entry from the receiver slot, so the
//! infrastructure's receiver-plus-callable dispatch reaches it exactly the
//! way it reaches a real handler.
//!
//! ## Ordering constraint
//!
//! The rewrite must happen before the infrastructure snapshots the target
//! into its own invocation wrapper. A snapshot taken first would keep
//! dispatching to the original function and the substitution would be
//! invisible. [`substitute`] detects that case and fails hard; it never
//! proceeds silently. [`crate::registry::AsyncRouteRegistry::register`]
//! avoids the ordering problem entirely by substituting before the
//! registration is ever exposed.

use crate::dispatcher::{ArgVec, DeferredEntry};
use crate::registration::{downcast_receiver, DispatchTarget, HandlerFn, Receiver, RouteRegistration};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Failure to redirect a registration. Fatal to the registration: a route
/// left in this state must not be activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    /// The registration was already redirected; the transition is terminal
    /// and re-registration requires a fresh invocation unit.
    AlreadySubstituted {
        /// Handler name of the affected route
        handler: String,
    },
    /// The infrastructure already copied the target by value; a rewrite now
    /// would be invisible and the original function would keep executing.
    TargetCopied {
        /// Handler name of the affected route
        handler: String,
    },
}

impl fmt::Display for SubstitutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstitutionError::AlreadySubstituted { handler } => {
                write!(
                    f,
                    "substitution error: registration for handler '{handler}' is already \
                    redirected; register a fresh route instead"
                )
            }
            SubstitutionError::TargetCopied { handler } => {
                write!(
                    f,
                    "substitution error: the dispatch target of handler '{handler}' was \
                    already copied by the calling infrastructure; redirecting it now would \
                    have no effect"
                )
            }
        }
    }
}

impl std::error::Error for SubstitutionError {}

/// Redirect `registration` so its dispatch target is the deferred entry
/// point. One-shot: the registration transitions to its terminal
/// substituted state on success.
///
/// # Errors
///
/// Fails when the registration was already substituted or when the
/// infrastructure has already snapshotted the original target. Both are
/// setup-time errors that must abort activation of the route; swallowing
/// them would leave the original function executing synchronously.
pub fn substitute(
    registration: &RouteRegistration,
    entry: Arc<DeferredEntry>,
) -> Result<(), SubstitutionError> {
    let callable: Arc<HandlerFn> = Arc::new(move |recv: &Receiver, args: &[Value]| {
        let entry = downcast_receiver::<DeferredEntry>(recv)?;
        let ack = entry.invoke(args.iter().cloned().collect::<ArgVec>());
        Ok(serde_json::to_value(ack)?)
    });
    let target = DispatchTarget {
        receiver: entry,
        callable,
        arity: None,
    };
    registration.rebind(target)?;

    info!(
        handler_name = %registration.meta().handler_name,
        "Registration redirected to deferred entry point"
    );
    Ok(())
}
