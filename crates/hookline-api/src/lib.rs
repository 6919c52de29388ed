//! # Hookline HTTP Service
//!
//! HTTP surface for the webhook delivery core.
//!
//! This service provides:
//! - Event intake for producers
//! - Webhook subscription management scoped to the caller's tenant
//! - Delivery status queries and manual retries
//! - Admin endpoints driving the pending and failed delivery scans
//! - A health check endpoint
//!
//! The caller's tenant is read from the `X-Tenant-ID` header. Authentication
//! happens in front of this service.

pub mod config;
pub mod errors;
pub mod responses;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use hookline_core::{
    DeliveryId, Event, ParseError, TenantId, Timestamp, ValidationError, WebhookId,
    WebhookService,
};
use std::{str::FromStr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, instrument, warn};

pub use config::ServiceConfig;
pub use errors::{ApiError, ConfigError, ServiceError};

use responses::{
    BatchQuery, BatchResponse, CreateWebhookRequest, DeliveryResponse, EventAcceptedResponse,
    HealthResponse, ListResponse, PageQuery, PublishEventRequest, UpdateWebhookRequest,
    WebhookResponse, WorkerPoolStatus,
};

/// Header carrying the caller's tenant
pub const TENANT_HEADER: &str = "X-Tenant-ID";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub service: Arc<WebhookService>,
}

impl AppState {
    pub fn new(config: ServiceConfig, service: Arc<WebhookService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Tenant of the calling client, taken from [`TENANT_HEADER`]
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantId);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let invalid = || ApiError::InvalidTenant {
            header: TENANT_HEADER,
        };

        let value = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(invalid)?;

        TenantId::new(value.trim())
            .map(Tenant)
            .map_err(|_| invalid())
    }
}

fn parse_id<T>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = ParseError>,
{
    raw.parse::<T>().map_err(|e| {
        ApiError::from(ValidationError::InvalidFormat {
            field: field.to_string(),
            message: e.to_string(),
        })
    })
}

// ============================================================================
// Router
// ============================================================================

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    let event_routes = Router::new().route("/api/events", post(publish_event));

    let webhook_routes = Router::new()
        .route("/api/webhooks", post(create_webhook).get(list_webhooks))
        .route(
            "/api/webhooks/{webhook_id}",
            get(get_webhook).put(update_webhook).delete(delete_webhook),
        )
        .route(
            "/api/webhooks/{webhook_id}/deliveries",
            get(list_webhook_deliveries),
        );

    let delivery_routes = Router::new()
        .route("/api/deliveries/{delivery_id}", get(get_delivery))
        .route("/api/deliveries/{delivery_id}/retry", post(retry_delivery));

    let admin_routes = Router::new()
        .route(
            "/admin/deliveries/process-pending",
            post(process_pending_deliveries),
        )
        .route("/admin/deliveries/retry-failed", post(retry_failed_deliveries));

    let health_routes = Router::new().route("/health", get(handle_health_check));

    let router = Router::new()
        .merge(event_routes)
        .merge(webhook_routes)
        .merge(delivery_routes)
        .merge(admin_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
                .into_inner(),
        );

    let router = if state.config.server.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}

/// Start the HTTP server and run until SIGINT or SIGTERM
///
/// In-flight requests complete before this returns. Draining the delivery
/// worker pool is left to the caller, which owns the service.
pub async fn start_server(
    config: ServiceConfig,
    service: Arc<WebhookService>,
) -> Result<(), ServiceError> {
    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: addr.clone(),
            message: e.to_string(),
        })?;

    info!(address = %addr, "Starting HTTP server");

    let app = create_router(AppState::new(config, service));

    // Stop accepting connections on the signal, then let in-flight requests finish
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Event Handlers
// ============================================================================

/// Accept an event and schedule its deliveries
///
/// Responds once the event and its delivery records are persisted; the HTTP
/// attempts run in the background.
#[instrument(skip(state, body), fields(tenant_id = %tenant.0))]
pub async fn publish_event(
    State(state): State<AppState>,
    tenant: Tenant,
    body: Result<Json<PublishEventRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EventAcceptedResponse>), ApiError> {
    let Json(request) = body?;

    let payload = serde_json::to_vec(&request.payload)
        .map_err(|e| ApiError::invalid_request(format!("payload: {}", e)))?;

    let mut event = Event::new(request.event_type, tenant.0, payload);
    if let Some(id) = request.id {
        event = event.with_id(id);
    }

    let summary = state.service.process_event(event).await?;
    Ok((StatusCode::ACCEPTED, Json(summary.into())))
}

// ============================================================================
// Webhook Handlers
// ============================================================================

#[instrument(skip(state, body), fields(tenant_id = %tenant.0))]
pub async fn create_webhook(
    State(state): State<AppState>,
    tenant: Tenant,
    body: Result<Json<CreateWebhookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    let Json(request) = body?;
    let webhook = request.into_webhook(tenant.0.clone())?;

    let id = state.service.create_webhook(webhook).await?;
    let created = state.service.get_webhook(id, &tenant.0).await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

#[instrument(skip(state, query), fields(tenant_id = %tenant.0))]
pub async fn list_webhooks(
    State(state): State<AppState>,
    tenant: Tenant,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ListResponse<WebhookResponse>>, ApiError> {
    let Query(query) = query?;
    let page = state
        .service
        .list_webhooks(&tenant.0, query.to_page_request()?)
        .await?;

    Ok(Json(ListResponse::from_page(page)))
}

#[instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn get_webhook(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(webhook_id): Path<String>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let id: WebhookId = parse_id(&webhook_id, "webhook_id")?;
    let webhook = state.service.get_webhook(id, &tenant.0).await?;
    Ok(Json(webhook.into()))
}

#[instrument(skip(state, body), fields(tenant_id = %tenant.0))]
pub async fn update_webhook(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(webhook_id): Path<String>,
    body: Result<Json<UpdateWebhookRequest>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let id: WebhookId = parse_id(&webhook_id, "webhook_id")?;
    let Json(request) = body?;

    let updated = state
        .service
        .modify_webhook(id, &tenant.0, request.into_update()?)
        .await?;
    Ok(Json(updated.into()))
}

#[instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn delete_webhook(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(webhook_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: WebhookId = parse_id(&webhook_id, "webhook_id")?;
    state.service.delete_webhook(id, &tenant.0).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, query), fields(tenant_id = %tenant.0))]
pub async fn list_webhook_deliveries(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(webhook_id): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ListResponse<DeliveryResponse>>, ApiError> {
    let id: WebhookId = parse_id(&webhook_id, "webhook_id")?;
    let Query(query) = query?;

    let page = state
        .service
        .list_deliveries(id, &tenant.0, query.to_page_request()?)
        .await?;
    Ok(Json(ListResponse::from_page(page)))
}

// ============================================================================
// Delivery Handlers
// ============================================================================

#[instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn get_delivery(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(delivery_id): Path<String>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let id: DeliveryId = parse_id(&delivery_id, "delivery_id")?;
    let delivery = state.service.get_delivery_status(id, &tenant.0).await?;
    Ok(Json(delivery.into()))
}

/// Re-attempt a failed delivery now
///
/// A receiver failure during the attempt is reported as `502`; the delivery
/// record reflects the attempt either way.
#[instrument(skip(state), fields(tenant_id = %tenant.0))]
pub async fn retry_delivery(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(delivery_id): Path<String>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    let id: DeliveryId = parse_id(&delivery_id, "delivery_id")?;
    let delivery = state.service.retry_delivery(id, &tenant.0).await?;
    Ok(Json(delivery.into()))
}

// ============================================================================
// Admin Handlers
// ============================================================================

fn batch_size(state: &AppState, query: BatchQuery) -> Result<usize, ApiError> {
    match query.batch_size.unwrap_or(state.config.scheduler.batch_size) {
        0 => Err(ValidationError::InvalidFormat {
            field: "batch_size".to_string(),
            message: "must be greater than zero".to_string(),
        }
        .into()),
        size => Ok(size),
    }
}

#[instrument(skip(state, query))]
pub async fn process_pending_deliveries(
    State(state): State<AppState>,
    query: Result<Query<BatchQuery>, QueryRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Query(query) = query?;
    let batch_size = batch_size(&state, query)?;

    let processed = state.service.process_pending_deliveries(batch_size).await?;
    Ok(Json(BatchResponse {
        batch_size,
        processed,
    }))
}

#[instrument(skip(state, query))]
pub async fn retry_failed_deliveries(
    State(state): State<AppState>,
    query: Result<Query<BatchQuery>, QueryRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Query(query) = query?;
    let batch_size = batch_size(&state, query)?;

    let processed = state.service.retry_failed_deliveries(batch_size).await?;
    Ok(Json(BatchResponse {
        batch_size,
        processed,
    }))
}

// ============================================================================
// Health
// ============================================================================

/// Liveness check
pub async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let worker_pool = state
        .service
        .worker_pool_load()
        .map(|(active, queued)| WorkerPoolStatus { active, queued });

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Timestamp::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        worker_pool,
    })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
