use serde::{Deserialize, Serialize};

use crate::domain::{Identity, Operation, Payload};

/// Request for a rule-set validation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// Creator identity owning the rule set (hex)
    pub creator: Identity,

    /// Rule set name
    pub name: String,

    /// Specific version; latest when omitted
    #[serde(default)]
    pub version: Option<u32>,

    /// Operation being authorized
    pub operation: Operation,

    /// Facts about the operation
    #[serde(default)]
    pub payload: Payload,
}

/// Request to register a rule-set slot.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Signing authority (must equal the creator)
    pub authority: Identity,

    /// Optional delegated authority for writes and commits
    #[serde(default)]
    pub delegate: Option<Identity>,
}

/// Request to write a chunk into the staging buffer.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteChunkRequest {
    /// Signing authority (creator or delegate)
    pub authority: Identity,

    /// Byte offset of this chunk
    pub offset: u64,

    /// Chunk contents, hex-encoded
    pub data: String,
}

impl WriteChunkRequest {
    /// Decode the hex chunk contents.
    pub fn data_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.data)
    }
}

/// Request to finalize or abandon a staging buffer.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorityRequest {
    /// Signing authority (creator or delegate)
    pub authority: Identity,
}
