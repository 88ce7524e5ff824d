use serde::{Deserialize, Serialize};

use holdfast_core::gate::DeleteDecision;
use holdfast_core::types::{BucketRetentionPolicy, ObjectAttributes};

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateBucketRequest {
    pub name: String,
}

impl CreateBucketRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name is required".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct SetRetentionPolicyRequest {
    /// Signed so a negative period reaches the core and is rejected there
    pub retention_period_secs: i64,
}

#[derive(Deserialize)]
pub struct SetHoldRequest {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct CreateObjectRequest {
    pub name: String,
}

impl CreateObjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name is required".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct MoveObjectRequest {
    pub destination: String,
}

impl MoveObjectRequest {
    pub fn validate(&self, source: &str) -> Result<(), String> {
        if self.destination.is_empty() {
            return Err("destination is required".to_string());
        }
        if self.destination == source {
            return Err("destination must differ from the source object".to_string());
        }
        Ok(())
    }
}

/// Input to `holdfast check`: a snapshot evaluated without any store
#[derive(Deserialize)]
pub struct GateRequest {
    pub object: ObjectAttributes,
    #[serde(default)]
    pub policy: Option<BucketRetentionPolicy>,
    /// Defaults to the current wall-clock time
    #[serde(default)]
    pub now_ms: Option<u64>,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct RetentionPolicyResponse {
    pub bucket: String,
    pub retention_policy: Option<BucketRetentionPolicy>,
}

#[derive(Serialize)]
pub struct DefaultHoldResponse {
    pub bucket: String,
    pub default_event_based_hold: bool,
}

#[derive(Serialize)]
pub struct DeletableResponse {
    pub bucket: String,
    pub object: String,
    #[serde(flatten)]
    pub decision: DeleteDecision,
}

#[derive(Serialize)]
pub struct GateResponse {
    pub now_ms: u64,
    #[serde(flatten)]
    pub decision: DeleteDecision,
    pub retention_expiry_ms: Option<u64>,
}
