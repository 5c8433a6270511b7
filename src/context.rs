//! # Request Context Module
//!
//! Call-scoped request context and the ambient accessor used to resolve it.
//!
//! ## Overview
//!
//! Every inbound call carries a [`RequestContext`]: a correlation id, the
//! method and path that matched, and the originating peer when known. The
//! calling infrastructure installs the context for the duration of one call
//! with a [`ContextScope`] guard; the deferred entry point reads it back
//! through [`current()`].
//!
//! ## Lifetime rules
//!
//! The context is valid only while the originating call is on the stack.
//! [`current()`] must therefore be consumed synchronously, before control
//! returns to the caller; the resolved value is then passed explicitly into
//! any deferred work. Never stash the accessor itself across calls.
//!
//! ## Usage
//!
//! ```rust
//! use boomerang::context::{self, ContextScope, RequestContext};
//! use http::Method;
//!
//! let ctx = RequestContext::new(Method::GET, "/pets/{id}");
//! let _scope = ContextScope::enter(ctx);
//! let resolved = context::current().expect("inside scope");
//! assert_eq!(resolved.path, "/pets/{id}");
//! ```

use crate::ids::CorrelationId;
use http::Method;
use std::cell::RefCell;

/// Data describing one in-flight inbound call.
///
/// Resolved from the ambient accessor at submission time and carried
/// explicitly into the delivery worker; the correlation id keys the sink
/// that receives the eventual result.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id minted for this call
    pub correlation_id: CorrelationId,
    /// Method of the matched route
    pub method: Method,
    /// Path (or path pattern) of the matched route
    pub path: String,
    /// Originating peer, when the transport knows it
    pub peer: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            method,
            path: path.into(),
            peer: None,
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }

    /// Context for an invocation that arrived with no ambient scope
    /// installed. Carries a fresh correlation id so the invocation is still
    /// observable; there is normally no sink registered under it.
    pub fn detached() -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            method: Method::GET,
            path: String::new(),
            peer: None,
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<RequestContext>> = const { RefCell::new(None) };
}

/// RAII guard installing a [`RequestContext`] as the ambient context for the
/// current thread. The previous context (if any) is restored on drop, so
/// scopes nest.
#[must_use = "the ambient context is uninstalled when the scope is dropped"]
pub struct ContextScope {
    prev: Option<RequestContext>,
}

impl ContextScope {
    pub fn enter(ctx: RequestContext) -> Self {
        let prev = CURRENT.with(|slot| slot.borrow_mut().replace(ctx));
        ContextScope { prev }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|slot| *slot.borrow_mut() = prev);
    }
}

/// Resolve the ambient context of the current call, if a scope is installed.
///
/// Returns a clone; the ambient slot itself stays owned by the scope guard.
pub fn current() -> Option<RequestContext> {
    CURRENT.with(|slot| slot.borrow().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_none_outside_a_scope() {
        assert!(current().is_none());
    }

    #[test]
    fn scope_installs_and_uninstalls() {
        let ctx = RequestContext::new(Method::POST, "/items");
        let id = ctx.correlation_id;
        {
            let _scope = ContextScope::enter(ctx);
            assert_eq!(current().unwrap().correlation_id, id);
        }
        assert!(current().is_none());
    }

    #[test]
    fn scopes_nest_and_restore() {
        let outer = RequestContext::new(Method::GET, "/outer");
        let outer_id = outer.correlation_id;
        let _outer_scope = ContextScope::enter(outer);

        let inner = RequestContext::new(Method::GET, "/inner");
        let inner_id = inner.correlation_id;
        {
            let _inner_scope = ContextScope::enter(inner);
            assert_eq!(current().unwrap().correlation_id, inner_id);
        }
        assert_eq!(current().unwrap().correlation_id, outer_id);
    }

    #[test]
    fn detached_contexts_get_fresh_ids() {
        assert_ne!(
            RequestContext::detached().correlation_id,
            RequestContext::detached().correlation_id
        );
    }
}
