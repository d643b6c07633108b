//! API request/response types

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct AcquireRequest {
    pub sandbox_id: String,
    #[serde(default)]
    pub preferred: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub id: String,
    pub resource_type: String,
    pub host_veth: String,
    pub peer_veth: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatResponse {
    pub idle: usize,
    pub inuse: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BindingResponse {
    pub resource_id: String,
    pub sandbox_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GcResponse {
    pub reclaimed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiSuccess {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
