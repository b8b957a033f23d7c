use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use pkg_controllers::{ProjectController, ProvisioningSettings};
use pkg_state::StateStore;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::AppState;
use crate::auth::auth_middleware;
use crate::handlers::{clusters, metrics, namespaces, projects, tenants};
use crate::rate_limit::login_rate_limit_middleware;
use crate::request_id::request_id_middleware;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// SlateDB directory. `None` keeps all state in memory.
    pub data_dir: Option<String>,
    pub token: String,
    pub settings: ProvisioningSettings,
    /// Logins allowed per second per client address. `None` disables the limit.
    pub login_rate_limit: Option<f64>,
}

/// Every route sits behind bearer authentication.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/tenants/login",
            post(tenants::login).layer(middleware::from_fn_with_state(
                state.clone(),
                login_rate_limit_middleware,
            )),
        )
        .route("/api/v1/projects/validate", post(projects::validate))
        .route("/api/v1/projects/{cluster}/{name}", put(projects::put_project))
        .route("/api/v1/clusters", get(clusters::list_clusters))
        .route("/api/v1/clusters/{name}", put(clusters::put_cluster))
        .route(
            "/api/v1/namespaces/{cluster}/{name}/move",
            post(namespaces::move_namespace),
        )
        .route("/metrics", get(metrics::render))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let store = match &config.data_dir {
        Some(dir) => StateStore::new(dir).await?,
        None => {
            warn!("Running with in-memory state; nothing survives a restart");
            StateStore::in_memory()
        }
    };
    let mut state = AppState::new(&store, config.settings, config.token).await?;
    if let Some(per_second) = config.login_rate_limit {
        state = state.with_login_rate_limit(per_second);
        match &state.login_limiter {
            Some(_) => info!("Login rate limit: {}/s per client", per_second),
            None => info!("Login rate limit disabled"),
        }
    }

    let shutdown = CancellationToken::new();
    let controller = ProjectController::new(state.registries.clone()).start(shutdown.clone());
    let sweeper = state.locks.start_sweeper(shutdown.clone());

    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    let signal = shutdown.clone();
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(controller, sweeper);
    store.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use pkg_quota::{ResourceKey, ResourceLimitSet};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const TOKEN: &str = "test-token";

    async fn test_state() -> AppState {
        let settings = ProvisioningSettings {
            tenant_quota: ResourceLimitSet::new().with(ResourceKey::LimitsCpu, "4"),
            ..Default::default()
        };
        AppState::new(&StateStore::in_memory(), settings, TOKEN.to_string())
            .await
            .unwrap()
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn cluster_body(key: &str, cpu: &str) -> Value {
        json!({
            "metadata": { "labels": { "tenancy.io/cluster-key": key } },
            "status": { "allocatable": { "cpu": cpu } }
        })
    }

    #[tokio::test]
    async fn rejects_missing_or_wrong_token() {
        let app = router(test_state().await);
        let response = app
            .clone()
            .oneshot(Request::get("/api/v1/clusters").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/metrics")
                    .header(header::AUTHORIZATION, "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn put_then_list_clusters() {
        let app = router(test_state().await);
        let response = app
            .clone()
            .oneshot(request("PUT", "/api/v1/clusters/c1", Some(cluster_body("east", "8"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("x-request-id"));

        let response = app
            .clone()
            .oneshot(request("PUT", "/api/v1/clusters/c1", Some(cluster_body("east", "16"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request("GET", "/api/v1/clusters", None))
            .await
            .unwrap();
        let clusters = json_body(response).await;
        assert_eq!(clusters.as_array().unwrap().len(), 1);
        assert_eq!(clusters[0]["metadata"]["name"], "c1");
        assert_eq!(clusters[0]["status"]["allocatable"]["cpu"], "16");
        assert_eq!(clusters[0]["metadata"]["resource_version"], 2);
    }

    #[tokio::test]
    async fn malformed_overcommit_label_is_unprocessable() {
        let app = router(test_state().await);
        let body = json!({
            "metadata": { "labels": { "quota.tenancy.io/cpu-overcommit": "lots" } }
        });
        let response = app
            .oneshot(request("PUT", "/api/v1/clusters/c1", Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn validate_reports_field_and_status() {
        let app = router(test_state().await);
        app.clone()
            .oneshot(request("PUT", "/api/v1/clusters/c1", Some(cluster_body("east", "8"))))
            .await
            .unwrap();

        let project = json!({
            "metadata": { "name": "p1", "scope": "c1" },
            "spec": {
                "display_name": "acme",
                "cluster_name": "c1",
                "resource_quota": { "limit": { "limitsCpu": "2" } }
            }
        });
        let response = app
            .clone()
            .oneshot(request("POST", "/api/v1/projects/validate", Some(project)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["field"], "namespaceDefaultResourceQuota");

        let project = json!({
            "metadata": { "name": "p1", "scope": "c1" },
            "spec": {
                "display_name": "acme",
                "cluster_name": "c1",
                "resource_quota": { "limit": { "limitsCpu": "2" } },
                "namespace_default_resource_quota": { "limit": { "limitsCpu": "1" } }
            }
        });
        let response = app
            .clone()
            .oneshot(request("POST", "/api/v1/projects/validate", Some(project)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let project = json!({
            "metadata": { "name": "p1", "scope": "nowhere" },
            "spec": {
                "display_name": "acme",
                "cluster_name": "nowhere",
                "resource_quota": { "limit": { "limitsCpu": "2" } },
                "namespace_default_resource_quota": { "limit": { "limitsCpu": "1" } }
            }
        });
        let response = app
            .oneshot(request("POST", "/api/v1/projects/validate", Some(project)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_login_is_multi_status() {
        let app = router(test_state().await);
        app.clone()
            .oneshot(request("PUT", "/api/v1/clusters/small", Some(cluster_body("key-a", "2"))))
            .await
            .unwrap();
        app.clone()
            .oneshot(request("PUT", "/api/v1/clusters/big", Some(cluster_body("key-b", "16"))))
            .await
            .unwrap();

        let identity = json!({
            "tenant_id": "t-1",
            "tenant_short_name": "acme",
            "principal_id": "u-1",
            "cluster_actions": {
                "key-a": ["tenant_admin"],
                "key-b": ["tenant_admin", "cluster_admin"]
            }
        });
        let response = app
            .clone()
            .oneshot(request("POST", "/api/v1/tenants/login", Some(identity)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let failures = json_body(response).await;
        assert_eq!(failures.as_array().unwrap().len(), 1);
        assert_eq!(failures[0]["id"], "small");
        assert_eq!(failures[0]["status"], 1);
        assert_eq!(failures[0]["message"], "limitsCpu=4");

        let response = app
            .oneshot(request("GET", "/metrics", None))
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tenancy_login_attempts_total{outcome=\"partial\"} 1"));
        assert!(text.contains(
            "tenancy_login_cluster_failures_total{status=\"insufficient_quota\"} 1"
        ));
        assert!(text.contains("tenancy_projects_created_total 1"));
    }

    #[tokio::test]
    async fn invalid_identity_is_bad_request() {
        let app = router(test_state().await);
        let identity = json!({
            "tenant_id": "t-1",
            "tenant_short_name": "not valid!",
            "principal_id": "u-1",
            "cluster_actions": { "key-a": ["tenant_admin"] }
        });
        let response = app
            .oneshot(request("POST", "/api/v1/tenants/login", Some(identity)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn move_unknown_namespace_is_not_found() {
        let app = router(test_state().await);
        let response = app
            .oneshot(request(
                "POST",
                "/api/v1/namespaces/c1/ghost/move",
                Some(json!({ "projectId": "c1:p1" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_project_admits_against_cluster_capacity() {
        let app = router(test_state().await);
        app.clone()
            .oneshot(request("PUT", "/api/v1/clusters/c1", Some(cluster_body("east", "8"))))
            .await
            .unwrap();

        let project = |cpu: &str| {
            json!({
                "metadata": {},
                "spec": {
                    "display_name": "acme",
                    "cluster_name": "ignored",
                    "resource_quota": { "limit": { "limitsCpu": cpu } },
                    "namespace_default_resource_quota": { "limit": { "limitsCpu": "1" } }
                }
            })
        };
        let response = app
            .clone()
            .oneshot(request("PUT", "/api/v1/projects/c1/p1", Some(project("6"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["metadata"]["name"], "p1");
        assert_eq!(body["spec"]["cluster_name"], "c1");
        assert_eq!(body["metadata"]["resource_version"], 1);

        let response = app
            .oneshot(request("PUT", "/api/v1/projects/c1/p2", Some(project("4"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test(start_paused = true)]
    async fn login_is_limited_per_client_address() {
        let app = router(test_state().await.with_login_rate_limit(1.0));
        let identity = json!({
            "tenant_id": "t-1",
            "tenant_short_name": "not valid!",
            "principal_id": "u-1",
            "cluster_actions": {}
        });
        let login = |ip: &'static str| {
            let mut req = request("POST", "/api/v1/tenants/login", Some(identity.clone()));
            req.headers_mut()
                .insert("x-forwarded-for", header::HeaderValue::from_static(ip));
            req
        };

        let response = app.clone().oneshot(login("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(login("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(response).await;
        assert_eq!(body["error"], "You have reached maximum request limit.");

        let response = app.clone().oneshot(login("10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        let response = app.oneshot(login("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
