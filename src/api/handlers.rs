//! API request handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::types::*;
use crate::manager::Manager;
use crate::resource::{NetworkResource, Veth};

pub type AppState = Arc<Manager<Veth>>;

// === Health ===

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Pool ===

pub async fn pool_stat(State(manager): State<AppState>) -> Json<StatResponse> {
    let stat = manager.pool().stat();
    Json(StatResponse {
        idle: stat.idle,
        inuse: stat.inuse,
        capacity: stat.capacity,
    })
}

pub async fn list_resources(
    State(manager): State<AppState>,
) -> Result<Json<Vec<BindingResponse>>, (StatusCode, Json<ApiError>)> {
    let bindings = manager.bindings().map_err(to_api_error)?;
    Ok(Json(
        bindings
            .into_iter()
            .map(|b| BindingResponse {
                resource_id: b.resource_id,
                sandbox_id: b.sandbox_id,
            })
            .collect(),
    ))
}

// === Acquire/Release ===

pub async fn acquire(
    State(manager): State<AppState>,
    Json(req): Json<AcquireRequest>,
) -> Result<Json<ResourceResponse>, (StatusCode, Json<ApiError>)> {
    let resource = manager
        .allocate(&req.sandbox_id, req.preferred.as_deref())
        .await
        .map_err(to_api_error)?;
    Ok(Json(veth_to_response(&resource)))
}

pub async fn release(
    State(manager): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiSuccess>, (StatusCode, Json<ApiError>)> {
    manager.release(&id).map_err(to_api_error)?;
    Ok(Json(ApiSuccess {
        message: format!("resource '{}' released", id),
    }))
}

// === GC ===

pub async fn garbage_collect(
    State(manager): State<AppState>,
) -> Result<Json<GcResponse>, (StatusCode, Json<ApiError>)> {
    let reclaimed = manager.garbage_collect().map_err(to_api_error)?;
    Ok(Json(GcResponse { reclaimed }))
}

// === Helpers ===

fn to_api_error(e: crate::Error) -> (StatusCode, Json<ApiError>) {
    let status = match &e {
        crate::Error::InvalidState(_) => StatusCode::CONFLICT,
        crate::Error::ResourceBusy(_) => StatusCode::CONFLICT,
        crate::Error::AcquireTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        crate::Error::PoolClosed => StatusCode::SERVICE_UNAVAILABLE,
        crate::Error::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ApiError {
            error: format!("{:?}", e)
                .split(['(', ' '])
                .next()
                .unwrap_or("Error")
                .to_string(),
            message: e.to_string(),
        }),
    )
}

fn veth_to_response(v: &Veth) -> ResourceResponse {
    ResourceResponse {
        id: v.resource_id().to_string(),
        resource_type: v.resource_type().to_string(),
        host_veth: v.host_veth.clone(),
        peer_veth: v.peer_veth.clone(),
        created_at: v.created_at.to_rfc3339(),
    }
}
