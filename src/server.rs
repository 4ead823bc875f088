//! HTTP surface for the `/db` resource.

use std::{
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
};

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
        HeaderName, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::ServiceError;
use crate::model::Entity;
use crate::params::{Caller, QueryParams};
use crate::reshape::{Collections, Receipt};
use crate::service::{authorize, Created, DbService};
use crate::store::GraphStore;

/// Header carrying the caller's role, set by the upstream gateway.
pub const ROLE_HEADER: &str = "x-user-role";
/// Header carrying the caller's identity, set by the upstream gateway.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Service shared by all request handlers.
pub type SharedService = Arc<DbService<Arc<dyn GraphStore>>>;

/// Runtime options used to boot the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Allowed CORS origins for browser clients.
    pub allow_origins: Vec<String>,
}

/// Errors that can occur while running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener or serving connections failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Starts the server and runs until Ctrl-C.
pub async fn serve(service: SharedService, options: ServerOptions) -> Result<(), ServerError> {
    install_tracing_subscriber();

    let app = build_router(service, &options.allow_origins);
    let addr = SocketAddr::from((options.host, options.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        allow_origins = ?options.allow_origins,
        "depgraph listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds the router for `/db` and `/health`.
pub fn build_router(service: SharedService, allow_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/db", get(find_handler).post(create_handler))
        .route(
            "/db/:id",
            get(get_handler)
                .put(update_handler)
                .patch(patch_handler)
                .delete(remove_handler),
        );

    if let Some(layer) = build_cors_layer(allow_origins) {
        router = router.layer(layer);
    }

    router.with_state(service).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let mut allowed = Vec::new();
    for origin in origins {
        let normalized = normalize_origin(origin);
        match normalized
            .as_deref()
            .and_then(|value| HeaderValue::from_str(value).ok())
        {
            Some(value) => allowed.push(value),
            None => {
                tracing::warn!(%origin, ?normalized, "ignoring invalid CORS origin");
            }
        }
    }

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                ACCEPT,
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static(ROLE_HEADER),
                HeaderName::from_static(IDENTITY_HEADER),
            ]),
    )
}

fn normalize_origin(origin: &str) -> Option<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_owned())
        };
        Ok(Caller {
            role: header(ROLE_HEADER).unwrap_or_default(),
            identity: header(IDENTITY_HEADER).filter(|id| !id.is_empty()),
        })
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn find_handler(
    State(service): State<SharedService>,
    Query(query): Query<QueryParams>,
) -> Result<Json<Collections>, ServiceError> {
    Ok(Json(service.find(&query).await?))
}

async fn get_handler(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    Query(query): Query<QueryParams>,
) -> Result<Json<Entity>, ServiceError> {
    Ok(Json(service.get(&id, &query).await?))
}

async fn create_handler(
    State(service): State<SharedService>,
    caller: Caller,
    Query(query): Query<QueryParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<Created>), ServiceError> {
    authorize(&caller)?;
    let created = service.create(&caller, parse_body(&body)?, &query).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_handler(
    State(service): State<SharedService>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<QueryParams>,
    body: Bytes,
) -> Result<Json<Entity>, ServiceError> {
    authorize(&caller)?;
    Ok(Json(
        service
            .update(&caller, &id, parse_body(&body)?, &query)
            .await?,
    ))
}

async fn patch_handler(
    State(service): State<SharedService>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<QueryParams>,
    body: Bytes,
) -> Result<Json<Entity>, ServiceError> {
    authorize(&caller)?;
    Ok(Json(
        service
            .patch(&caller, &id, parse_body(&body)?, &query)
            .await?,
    ))
}

async fn remove_handler(
    State(service): State<SharedService>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<QueryParams>,
) -> Result<Json<Receipt>, ServiceError> {
    Ok(Json(service.remove(&caller, &id, &query).await?))
}

fn parse_body(body: &Bytes) -> Result<Value, ServiceError> {
    serde_json::from_slice(body).map_err(|err| ServiceError::MalformedInput(err.to_string()))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    name: &'static str,
    message: String,
    code: u16,
    class_name: &'static str,
    data: Value,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(err = %self, "store call failed");
        }
        let body = ErrorPayload {
            name: self.name(),
            message: self.to_string(),
            code: status.as_u16(),
            class_name: class_name(&self),
            data: self.data(),
        };
        (status, Json(body)).into_response()
    }
}

fn class_name(err: &ServiceError) -> &'static str {
    match err.name() {
        "Forbidden" => "forbidden",
        "BadRequest" => "bad-request",
        _ => "bad-gateway",
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt().with_env_filter(filter).try_init();
    });
}
