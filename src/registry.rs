//! # Async Route Registry Module
//!
//! Owns the registrations of routes whose handlers execute deferred, and
//! packages registration and substitution into one atomic step.
//!
//! ## Overview
//!
//! [`AsyncRouteRegistry::register`] builds the whole chain for a route -
//! registration, handler descriptor, invocation unit, deferred entry - and
//! performs the substitution *before* the registration is stored or handed
//! back. The infrastructure can therefore never observe, or snapshot, a
//! registration that still points at the original function; the
//! copy-before-substitute ordering hazard cannot arise on this path.
//!
//! Registering a handler name twice replaces the previous route: the old
//! registration and its invocation unit are dropped, and a warning is
//! logged. Unregistering drops the route's descriptor; re-activation
//! requires a fresh registration.

use crate::delivery::DeliveryHandle;
use crate::dispatcher::{DeferredEntry, HandlerDescriptor, InvocationUnit};
use crate::registration::{RouteMeta, RouteRegistration};
use crate::substitution::{self, SubstitutionError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of routes redirected to deferred execution.
pub struct AsyncRouteRegistry {
    routes: HashMap<String, Arc<RouteRegistration>>,
    delivery: DeliveryHandle,
}

impl AsyncRouteRegistry {
    /// Create an empty registry whose routes deliver through `delivery`.
    pub fn new(delivery: DeliveryHandle) -> Self {
        Self {
            routes: HashMap::new(),
            delivery,
        }
    }

    /// Register a route for deferred execution.
    ///
    /// Substitution happens before the registration becomes visible, so the
    /// returned registration is already redirected: any snapshot the
    /// infrastructure takes dispatches to the deferred entry point.
    ///
    /// If a route with the same handler name already exists it is replaced
    /// and its invocation unit dropped.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`SubstitutionError`] if the redirect fails;
    /// in that case nothing is registered.
    pub fn register(
        &mut self,
        meta: RouteMeta,
        descriptor: HandlerDescriptor,
    ) -> Result<Arc<RouteRegistration>, SubstitutionError> {
        let handler_name = meta.handler_name.to_string();

        if let Some(old) = self.routes.remove(&handler_name) {
            drop(old);
            warn!(
                handler_name = %handler_name,
                total_routes = self.routes.len(),
                "Replaced existing deferred route - old invocation unit dropped"
            );
        }

        let descriptor = Arc::new(descriptor);
        let registration = Arc::new(RouteRegistration::new(
            meta.clone(),
            descriptor.dispatch_target(),
        ));
        let unit = Arc::new(InvocationUnit::new(
            Arc::clone(&descriptor),
            self.delivery.clone(),
        ));
        let entry = Arc::new(DeferredEntry::new(unit, meta));
        substitution::substitute(&registration, entry)?;

        info!(
            handler_name = %handler_name,
            total_routes = self.routes.len() + 1,
            "Deferred route registered"
        );
        self.routes.insert(handler_name, Arc::clone(&registration));
        Ok(registration)
    }

    /// Look up a registered route by handler name.
    #[must_use]
    pub fn get(&self, handler_name: &str) -> Option<&Arc<RouteRegistration>> {
        self.routes.get(handler_name)
    }

    /// Remove a route, dropping its registration and handler descriptor.
    /// Returns whether the route existed.
    pub fn unregister(&mut self, handler_name: &str) -> bool {
        let removed = self.routes.remove(handler_name).is_some();
        if removed {
            info!(
                handler_name = %handler_name,
                total_routes = self.routes.len(),
                "Deferred route unregistered"
            );
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
