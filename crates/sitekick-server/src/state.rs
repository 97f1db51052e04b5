use std::sync::Arc;

use sitekick_core::config::{Config, StripeConfig};
use sitekick_core::gate::NotificationGate;
use sitekick_core::reconcile::PaymentReconciler;
use sitekick_core::sender::NotificationSender;
use sitekick_core::store::Datastore;

use crate::auth::AdminAuth;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: NotificationGate,
    pub reconciler: PaymentReconciler,
    pub admin: AdminAuth,
    pub stripe: StripeConfig,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn Datastore>,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        let timeout = config.gate.store_timeout();
        Self {
            gate: NotificationGate::new(
                store.clone(),
                sender,
                config.branding.clone(),
                timeout,
            )
            .with_lease_timeout(config.lease_timeout()),
            reconciler: PaymentReconciler::new(store, timeout),
            admin: AdminAuth {
                token: config.admin.token.clone(),
            },
            stripe: config.stripe.clone(),
        }
    }
}
