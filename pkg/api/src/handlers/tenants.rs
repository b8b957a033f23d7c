use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pkg_controllers::{LoginError, LoginFailureStatus, LoginSummary, ReconcileReport};
use pkg_metrics::{
    BINDING_ERRORS, BINDINGS_CREATED, BINDINGS_DELETED, LOGIN_ATTEMPTS, LOGIN_FAILURES,
    MetricsRegistry, PROJECTS_CREATED, QUOTA_REJECTIONS,
};
use pkg_types::IdentityAssertion;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub succeeded: Vec<String>,
    pub projects_created: usize,
    pub bindings_created: usize,
    pub bindings_deleted: usize,
    pub binding_errors: usize,
}

impl From<&LoginSummary> for LoginResponse {
    fn from(summary: &LoginSummary) -> Self {
        Self {
            succeeded: summary.succeeded.clone(),
            projects_created: summary.projects_created,
            bindings_created: summary.report.created,
            bindings_deleted: summary.report.deleted,
            binding_errors: summary.report.errors.len(),
        }
    }
}

/// POST /api/v1/tenants/login
///
/// Provision and reconcile access for one tenant principal. Partial
/// failures answer 207 with the failed clusters.
pub async fn login(
    State(state): State<AppState>,
    Json(identity): Json<IdentityAssertion>,
) -> Result<Response, ApiError> {
    // dropping the request future cancels in-flight readiness polls
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    match state.login.login(&identity, &cancel).await {
        Ok(summary) => {
            record_summary(&state.metrics, &summary);
            state.metrics.counter_inc(LOGIN_ATTEMPTS, &[("outcome", "success")]);
            info!(
                "login for {} succeeded on {} clusters",
                identity.principal_id,
                summary.succeeded.len()
            );
            Ok((StatusCode::OK, Json(LoginResponse::from(&summary))).into_response())
        }
        Err(LoginError::Partial(partial)) => {
            record_summary(&state.metrics, &partial.summary);
            state.metrics.counter_inc(LOGIN_ATTEMPTS, &[("outcome", "partial")]);
            for failure in &partial.failures {
                let status = match failure.status {
                    LoginFailureStatus::InsufficientQuota => {
                        state.metrics.counter_inc(QUOTA_REJECTIONS, &[("source", "login")]);
                        "insufficient_quota"
                    }
                    LoginFailureStatus::OtherFailure => "other",
                };
                state.metrics.counter_inc(LOGIN_FAILURES, &[("status", status)]);
            }
            warn!(
                "login for {} failed on {} clusters",
                identity.principal_id,
                partial.failures.len()
            );
            Ok((StatusCode::MULTI_STATUS, Json(partial.failures)).into_response())
        }
        Err(LoginError::InvalidIdentity(msg)) => {
            state.metrics.counter_inc(LOGIN_ATTEMPTS, &[("outcome", "rejected")]);
            Err(ApiError::BadRequest(msg))
        }
    }
}

fn record_summary(metrics: &MetricsRegistry, summary: &LoginSummary) {
    metrics.counter_add(PROJECTS_CREATED, &[], summary.projects_created as u64);
    record_report(metrics, &summary.report);
}

fn record_report(metrics: &MetricsRegistry, report: &ReconcileReport) {
    metrics.counter_add(BINDINGS_CREATED, &[], report.created as u64);
    metrics.counter_add(BINDINGS_DELETED, &[], report.deleted as u64);
    for e in &report.errors {
        let scope = e.scope.to_string();
        metrics.counter_inc(BINDING_ERRORS, &[("scope", scope.as_str()), ("op", e.op)]);
    }
}
