//! Tenant provisioning, role-binding reconciliation, quota admission and the
//! background project controller.

pub mod admission;
pub mod error;
pub mod login;
pub mod project;
pub mod provision;
pub mod rbac;
pub mod wait;

pub use admission::QuotaAdmission;
pub use error::{AdmissionError, ProvisionError, ReconcileWriteError, ResourceQuotaExceedError};
pub use login::{
    LoginError, LoginFailureStatus, LoginOrchestrator, LoginSummary, PartialLoginFailure,
    TenantLoginFailure,
};
pub use project::ProjectController;
pub use provision::{ProvisionedProject, ProvisioningSettings, TenantProvisioner};
pub use rbac::{ReconcileReport, RoleBindingReconciler};
pub use wait::{WaitOutcome, await_condition};
