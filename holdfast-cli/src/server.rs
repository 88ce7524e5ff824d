use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;

use holdfast_core::client::{ClientConfig, HoldfastClient};
use holdfast_core::infrastructure_in_memory::InMemoryAttributeStore;
use holdfast_core::types::{BucketAttributes, BucketRetentionPolicy, ObjectAttributes};
use holdfast_core::{HoldfastError, HoldfastResult, StoreError};

use crate::handlers::*;

/// Runtime settings collected from flags and environment
pub struct ServeOptions {
    pub host: String,
    pub port: u16,
    pub storage: String,
    pub config: ClientConfig,
    pub max_in_flight: usize,
}

#[derive(Clone)]
pub struct AppState {
    client: Arc<HoldfastClient>,
    storage: Arc<str>,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

pub async fn run(options: ServeOptions) -> std::io::Result<()> {
    let (client, storage) =
        create_client(&options.storage, options.config).map_err(std::io::Error::other)?;
    let state = AppState {
        client: Arc::new(client),
        storage: Arc::from(storage),
    };

    let app = Router::new()
        // Health is always open (no auth)
        .route("/health", get(health))
        .route("/buckets", post(create_bucket))
        .route(
            "/buckets/{bucket}/retention-policy",
            get(get_retention_policy)
                .put(set_retention_policy)
                .delete(remove_retention_policy),
        )
        .route("/buckets/{bucket}/retention-policy/lock", post(lock_retention_policy))
        .route(
            "/buckets/{bucket}/default-event-based-hold",
            get(get_default_event_based_hold).put(set_default_event_based_hold),
        )
        .route("/buckets/{bucket}/objects", post(create_object))
        // Object names with '/' are sent percent-encoded in one segment
        .route(
            "/buckets/{bucket}/objects/{object}",
            get(get_object_holds).put(overwrite_object).delete(delete_object),
        )
        .route(
            "/buckets/{bucket}/objects/{object}/event-based-hold",
            put(set_object_event_based_hold),
        )
        .route(
            "/buckets/{bucket}/objects/{object}/temporary-hold",
            put(set_object_temporary_hold),
        )
        .route("/buckets/{bucket}/objects/{object}/release-holds", post(release_all_holds))
        .route("/buckets/{bucket}/objects/{object}/move", post(move_object))
        .route("/buckets/{bucket}/objects/{object}/deletable", get(can_delete))
        .layer(middleware::from_fn(auth_middleware))
        .layer(ConcurrencyLimitLayer::new(options.max_in_flight.max(1)))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", options.host, options.port);

    if std::env::var("HOLDFAST_API_KEY").is_ok() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!("No HOLDFAST_API_KEY set, server is open (dev mode)");
    }

    tracing::info!(
        max_attempts = options.config.retry.max_attempts,
        call_timeout_ms = ?options.config.call_timeout_ms,
        max_in_flight = options.max_in_flight,
        "Holdfast server starting on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

// ─── Auth Middleware ────────────────────────────────────────────────────────

async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // No key configured: dev mode
    let expected_key = match std::env::var("HOLDFAST_API_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => return Ok(next.run(request).await),
    };

    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if token == expected_key {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Unauthorized request to {}", request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}

// ─── Error Mapping ──────────────────────────────────────────────────────────

pub fn status_for(error: &HoldfastError) -> StatusCode {
    match error {
        HoldfastError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        HoldfastError::PolicyLocked { .. } | HoldfastError::NoPolicySet { .. } => {
            StatusCode::CONFLICT
        }
        HoldfastError::DeletionDenied { .. } => StatusCode::FORBIDDEN,
        HoldfastError::Store(store) => match store {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            StoreError::AlreadyExists(_) | StoreError::Rejected(_) => StatusCode::CONFLICT,
            StoreError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn respond<T: Serialize>(success: StatusCode, result: HoldfastResult<T>) -> ApiResult<T> {
    match result {
        Ok(data) => (success, Json(ApiResponse::ok(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "Request failed");
            } else {
                tracing::debug!(error = %e, status = status.as_u16(), "Request refused");
            }
            (status, Json(ApiResponse::err(e.to_string())))
        }
    }
}

fn bad_request<T: Serialize>(message: String) -> ApiResult<T> {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::err(message)))
}

// ─── Handlers ───────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        storage: state.storage.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn create_bucket(
    State(state): State<AppState>,
    Json(req): Json<CreateBucketRequest>,
) -> ApiResult<BucketAttributes> {
    if let Err(e) = req.validate() {
        return bad_request(e);
    }
    let result = state.client.create_bucket(&req.name);
    if result.is_ok() {
        tracing::info!(bucket = %req.name, "Bucket created");
    }
    respond(StatusCode::CREATED, result)
}

async fn get_retention_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<RetentionPolicyResponse> {
    let result = state
        .client
        .get_retention_policy(&bucket)
        .map(|retention_policy| RetentionPolicyResponse {
            bucket,
            retention_policy,
        });
    respond(StatusCode::OK, result)
}

async fn set_retention_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<SetRetentionPolicyRequest>,
) -> ApiResult<BucketRetentionPolicy> {
    let result = state
        .client
        .set_retention_policy(&bucket, req.retention_period_secs);
    respond(StatusCode::OK, result)
}

async fn remove_retention_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<BucketAttributes> {
    respond(StatusCode::OK, state.client.remove_retention_policy(&bucket))
}

async fn lock_retention_policy(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<BucketRetentionPolicy> {
    respond(StatusCode::OK, state.client.lock_retention_policy(&bucket))
}

async fn get_default_event_based_hold(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> ApiResult<DefaultHoldResponse> {
    let result = state
        .client
        .get_default_event_based_hold(&bucket)
        .map(|default_event_based_hold| DefaultHoldResponse {
            bucket,
            default_event_based_hold,
        });
    respond(StatusCode::OK, result)
}

async fn set_default_event_based_hold(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<SetHoldRequest>,
) -> ApiResult<BucketAttributes> {
    let result = state
        .client
        .set_default_event_based_hold(&bucket, req.enabled);
    respond(StatusCode::OK, result)
}

async fn create_object(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Json(req): Json<CreateObjectRequest>,
) -> ApiResult<ObjectAttributes> {
    if let Err(e) = req.validate() {
        return bad_request(e);
    }
    respond(StatusCode::CREATED, state.client.create_object(&bucket, &req.name))
}

async fn get_object_holds(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ApiResult<ObjectAttributes> {
    respond(StatusCode::OK, state.client.get_object_holds(&bucket, &object))
}

async fn overwrite_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ApiResult<ObjectAttributes> {
    respond(StatusCode::OK, state.client.overwrite_object(&bucket, &object))
}

async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ApiResult<ObjectAttributes> {
    respond(StatusCode::OK, state.client.delete_object(&bucket, &object))
}

async fn set_object_event_based_hold(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    Json(req): Json<SetHoldRequest>,
) -> ApiResult<ObjectAttributes> {
    let result = state
        .client
        .set_object_event_based_hold(&bucket, &object, req.enabled);
    respond(StatusCode::OK, result)
}

async fn set_object_temporary_hold(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    Json(req): Json<SetHoldRequest>,
) -> ApiResult<ObjectAttributes> {
    let result = state
        .client
        .set_object_temporary_hold(&bucket, &object, req.enabled);
    respond(StatusCode::OK, result)
}

async fn release_all_holds(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ApiResult<ObjectAttributes> {
    respond(StatusCode::OK, state.client.release_all_holds(&bucket, &object))
}

async fn move_object(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
    Json(req): Json<MoveObjectRequest>,
) -> ApiResult<ObjectAttributes> {
    if let Err(e) = req.validate(&object) {
        return bad_request(e);
    }
    let result = state.client.move_object(&bucket, &object, &req.destination);
    respond(StatusCode::OK, result)
}

async fn can_delete(
    State(state): State<AppState>,
    Path((bucket, object)): Path<(String, String)>,
) -> ApiResult<DeletableResponse> {
    let result = state
        .client
        .can_delete(&bucket, &object)
        .map(|decision| DeletableResponse {
            bucket,
            object,
            decision,
        });
    respond(StatusCode::OK, result)
}

// ─── Storage Backend Selection ──────────────────────────────────────────────

/// Build the client for the requested backend. Returns the backend label
/// reported by `/health`. A backend that cannot be built is an error: the
/// server never silently swaps persistent storage for memory.
fn create_client(
    storage: &str,
    config: ClientConfig,
) -> Result<(HoldfastClient, &'static str), String> {
    if storage == "memory" {
        tracing::info!("Storage backend: in-memory (attributes will not persist)");
        let store = Arc::new(InMemoryAttributeStore::new());
        return Ok((HoldfastClient::with_store(store, config), "memory"));
    }

    if let Some(path) = storage.strip_prefix("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            let client = HoldfastClient::with_sqlite(path, config)
                .map_err(|e| format!("Failed to open SQLite at '{}': {}", path, e))?;
            tracing::info!("Storage backend: SQLite ({})", path);
            return Ok((client, "sqlite"));
        }
        #[cfg(not(feature = "sqlite"))]
        {
            let _ = path;
            return Err("SQLite storage requested but the `sqlite` feature is not enabled. \
                 Rebuild with: cargo build --features sqlite"
                .to_string());
        }
    }

    Err(format!(
        "Unknown storage backend: '{}'. Use 'memory' or 'sqlite:<path>'",
        storage
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_core::gate::DenyReason;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (HoldfastError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (
                HoldfastError::NoPolicySet { bucket: "b".into() },
                StatusCode::CONFLICT,
            ),
            (
                HoldfastError::DeletionDenied {
                    key: "b/o".into(),
                    reason: DenyReason::TemporaryHoldActive,
                },
                StatusCode::FORBIDDEN,
            ),
            (
                StoreError::NotFound("bucket b".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                StoreError::PreconditionFailed {
                    resource: "bucket b".into(),
                    field: "metageneration",
                    expected: 1,
                    actual: 2,
                }
                .into(),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                StoreError::DeadlineExceeded("bucket b".into()).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                StoreError::Backend("disk".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(status_for(&error), status, "{}", error);
        }
    }

    #[test]
    fn test_memory_backend_reports_memory() {
        let (client, label) = create_client("memory", ClientConfig::default()).unwrap();
        assert_eq!(label, "memory");
        assert!(client.create_bucket("scratch").is_ok());
    }

    #[test]
    fn test_unknown_storage_is_refused() {
        let err = create_client("redis://localhost", ClientConfig::default()).err().unwrap();
        assert!(err.contains("Unknown storage backend"));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_unopenable_sqlite_path_is_refused() {
        let storage = "sqlite:/nonexistent-holdfast-dir/nested/holdfast.db";
        let err = create_client(storage, ClientConfig::default()).err().unwrap();
        assert!(err.contains("Failed to open SQLite"));
    }

    #[tokio::test]
    async fn test_run_fails_instead_of_falling_back() {
        let options = ServeOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
            storage: "sqlite-typo:/tmp/holdfast.db".to_string(),
            config: ClientConfig::default(),
            max_in_flight: 1,
        };
        let err = run(options).await.unwrap_err();
        assert!(err.to_string().contains("Unknown storage backend"));
    }
}
