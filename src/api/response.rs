use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Denial, Operation, RuleSet};
use crate::service::Validation;
use crate::storage::BufferStatus;

/// Response from a validation request.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub request_id: Uuid,
    pub name: String,
    pub version: u32,
    pub operation: Operation,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Denial>,
    pub rules_evaluated: u32,
}

impl From<Validation> for ValidateResponse {
    fn from(validation: Validation) -> Self {
        ValidateResponse {
            request_id: validation.request_id,
            name: validation.name,
            version: validation.version,
            operation: validation.operation,
            allowed: validation.verdict.allowed,
            reason: validation.verdict.reason,
            rules_evaluated: validation.verdict.rules_evaluated,
        }
    }
}

/// Response from registering a rule-set slot. The derived storage
/// addresses are returned so clients can cross-check their own
/// derivation.
#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub creator: String,
    pub name: String,
    pub rule_set_address: String,
    pub buffer_address: String,
}

/// Response from a buffer chunk write.
#[derive(Debug, Serialize)]
pub struct WriteChunkResponse {
    pub len: u64,
    pub chunks_written: u32,
    /// crc32 of the accumulated bytes, zero-padded hex
    pub checksum: String,
}

impl From<BufferStatus> for WriteChunkResponse {
    fn from(status: BufferStatus) -> Self {
        WriteChunkResponse {
            len: status.len,
            chunks_written: status.chunks_written,
            checksum: format!("{:08x}", status.checksum),
        }
    }
}

/// Response from a successful finalize.
#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    pub version: u32,
}

/// A committed rule-set revision.
#[derive(Debug, Serialize)]
pub struct RevisionResponse {
    pub version: u32,
    pub rule_set: RuleSet,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub rule_sets: usize,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ErrorResponse::new(message, "BAD_REQUEST")
    }
}
