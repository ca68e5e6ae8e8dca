use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Identity, RuleSet, RuleSetError};

/// Key of a rule-set slot: the owning creator plus the set name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSetRef {
    pub creator: Identity,
    pub name: String,
}

impl RuleSetRef {
    pub fn new(creator: Identity, name: impl Into<String>) -> Self {
        RuleSetRef {
            creator,
            name: name.into(),
        }
    }
}

impl fmt::Display for RuleSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.creator.short())
    }
}

/// A committed rule-set version. The `Arc` snapshot is immutable, so
/// readers holding it are unaffected by later commits.
#[derive(Debug, Clone)]
pub struct Revision {
    pub version: u32,
    pub rule_set: Arc<RuleSet>,
}

/// Observable state of a staging buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStatus {
    /// Current accumulated length in bytes
    pub len: u64,

    /// Number of chunk writes received
    pub chunks_written: u32,

    /// crc32 of the current contents, for client-side upload verification
    pub checksum: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors from store operations. Every variant is rejected before any
/// state change; there are no partial effects.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rule set {0} not found")]
    NotFound(RuleSetRef),

    #[error("version {version} of rule set {reference} not found")]
    VersionNotFound { reference: RuleSetRef, version: u32 },

    #[error("no staged buffer for {0}")]
    NoBuffer(RuleSetRef),

    #[error("a staged buffer for {0} is already active")]
    BufferActive(RuleSetRef),

    #[error("rule set {0} already exists")]
    AlreadyExists(RuleSetRef),

    #[error("identity {authority} is not authorized for {reference}")]
    NotAuthorized {
        authority: Box<Identity>,
        reference: RuleSetRef,
    },

    #[error("buffer write would exceed {max} bytes")]
    BufferTooLarge { max: usize },

    #[error("rule set bytes declare `{declared}` but target is `{target}`")]
    TargetMismatch { declared: String, target: String },

    #[error(transparent)]
    Invalid(#[from] RuleSetError),
}

impl StoreError {
    pub fn not_authorized(authority: &Identity, reference: &RuleSetRef) -> Self {
        StoreError::NotAuthorized {
            authority: Box::new(*authority),
            reference: reference.clone(),
        }
    }
}

/// Keyed store of rule-set slots, committed versions, and staging buffers.
///
/// Passed explicitly into every operation; there is no ambient global
/// state. Only the slot's creator or its delegated authority may mutate.
#[async_trait]
pub trait RuleSetStore: Send + Sync {
    /// Register a (creator, name) slot, optionally with a delegated
    /// authority. Fails if the slot exists or a staged buffer is active.
    async fn create(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
        delegate: Option<Identity>,
    ) -> Result<(), StoreError>;

    /// Write a chunk at `offset` into the staging buffer, creating the
    /// buffer on first write. Chunks may arrive in any order.
    async fn write_chunk(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
        offset: u64,
        bytes: &[u8],
    ) -> Result<BufferStatus, StoreError>;

    /// Commit the accumulated buffer as a new version, then discard the
    /// buffer. A buffer that fails validation survives for repair.
    async fn finalize(&self, authority: &Identity, reference: &RuleSetRef)
        -> Result<u32, StoreError>;

    /// Discard the staging buffer without committing.
    async fn abandon(&self, authority: &Identity, reference: &RuleSetRef) -> Result<(), StoreError>;

    /// Validate and commit serialized rule-set bytes directly, allocating
    /// the next version number. Creates the slot if absent.
    async fn commit(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
        bytes: &[u8],
    ) -> Result<u32, StoreError>;

    /// Fetch a committed revision; latest when `version` is None.
    async fn get(
        &self,
        reference: &RuleSetRef,
        version: Option<u32>,
    ) -> Result<Revision, StoreError>;

    /// Latest committed version number, if any.
    async fn latest_version(&self, reference: &RuleSetRef) -> Result<Option<u32>, StoreError>;

    /// Staging buffer state, if one is active.
    async fn buffer_status(&self, reference: &RuleSetRef)
        -> Result<Option<BufferStatus>, StoreError>;

    /// Number of slots with at least one committed version.
    async fn rule_set_count(&self) -> usize;

    /// Drop buffers idle longer than `ttl`; returns how many were
    /// reclaimed. Safe at any time: no committed state depends on an
    /// unfinalized buffer.
    async fn reclaim_stale(&self, ttl: Duration) -> usize;
}
