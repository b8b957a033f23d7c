pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod request_id;
pub mod server;

use std::sync::Arc;

use pkg_controllers::{
    LoginOrchestrator, ProvisioningSettings, QuotaAdmission, RoleBindingReconciler,
    TenantProvisioner,
};
use pkg_metrics::MetricsRegistry;
use pkg_state::{Listers, ProjectLockRegistry, Registries, StateStore, StoreError};

use crate::rate_limit::LoginRateLimiter;

/// Shared application state injected into all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registries: Registries,
    pub listers: Listers,
    pub locks: ProjectLockRegistry,
    pub login: LoginOrchestrator,
    pub admission: QuotaAdmission,
    pub metrics: Arc<MetricsRegistry>,
    pub token: String,
    /// Per-client limit on the login route. `None` leaves it unlimited.
    pub login_limiter: Option<LoginRateLimiter>,
}

impl AppState {
    /// Wire registries, listers and the controllers over one store.
    pub async fn new(
        store: &StateStore,
        settings: ProvisioningSettings,
        token: String,
    ) -> Result<Self, StoreError> {
        let registries = Registries::new(store);
        let listers = Listers::start(store).await?;
        let locks = ProjectLockRegistry::new(settings.lock_ttl);
        let provisioner =
            TenantProvisioner::new(registries.clone(), listers.clone(), locks.clone(), settings);
        let reconciler = RoleBindingReconciler::new(registries.clone(), listers.clone());
        Ok(Self {
            login: LoginOrchestrator::new(listers.clone(), provisioner, reconciler),
            admission: QuotaAdmission::new(registries.clone(), locks.clone()),
            metrics: Arc::new(MetricsRegistry::with_tenancy_metrics()),
            registries,
            listers,
            locks,
            token,
            login_limiter: None,
        })
    }

    /// Limit logins to `per_second` per client address. Rates at or
    /// below zero leave logins unlimited.
    pub fn with_login_rate_limit(mut self, per_second: f64) -> Self {
        self.login_limiter = LoginRateLimiter::new(per_second);
        self
    }
}
