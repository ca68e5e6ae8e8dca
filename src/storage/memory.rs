use ahash::AHashMap;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{Identity, RuleSet};

use super::buffer::Buffer;
use super::traits::{BufferStatus, Revision, RuleSetRef, RuleSetStore, StoreError};

#[derive(Debug, Default)]
struct Slot {
    delegate: Option<Identity>,
    /// Committed versions, index 0 = version 1. Append-only.
    versions: Vec<Arc<RuleSet>>,
}

/// In-memory keyed store.
///
/// Locks are held only within a call and never across an await point;
/// readers receive `Arc` snapshots, so a commit is atomic relative to any
/// in-flight validation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<AHashMap<RuleSetRef, Slot>>,
    buffers: Mutex<AHashMap<RuleSetRef, Buffer>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// The slot's delegate, if the slot exists.
    fn delegate_of(&self, reference: &RuleSetRef) -> Option<Identity> {
        self.slots
            .read()
            .get(reference)
            .and_then(|slot| slot.delegate)
    }

    /// Creator or delegated authority only.
    fn authorize(&self, authority: &Identity, reference: &RuleSetRef) -> Result<(), StoreError> {
        if *authority == reference.creator || self.delegate_of(reference) == Some(*authority) {
            Ok(())
        } else {
            Err(StoreError::not_authorized(authority, reference))
        }
    }

    /// Validate bytes into a rule set bound to `reference`. No state is
    /// touched here; callers apply the result atomically.
    fn decode_for(reference: &RuleSetRef, bytes: &[u8]) -> Result<RuleSet, StoreError> {
        let rule_set = RuleSet::from_bytes(bytes)?;

        if rule_set.owner != reference.creator || rule_set.name != reference.name {
            let declared = RuleSetRef::new(rule_set.owner, rule_set.name.clone());
            return Err(StoreError::TargetMismatch {
                declared: declared.to_string(),
                target: reference.to_string(),
            });
        }

        Ok(rule_set)
    }
}

#[async_trait]
impl RuleSetStore for MemoryStore {
    async fn create(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
        delegate: Option<Identity>,
    ) -> Result<(), StoreError> {
        if *authority != reference.creator {
            return Err(StoreError::not_authorized(authority, reference));
        }
        if self.buffers.lock().contains_key(reference) {
            return Err(StoreError::BufferActive(reference.clone()));
        }

        let mut slots = self.slots.write();
        if slots.contains_key(reference) {
            return Err(StoreError::AlreadyExists(reference.clone()));
        }
        slots.insert(
            reference.clone(),
            Slot {
                delegate,
                versions: Vec::new(),
            },
        );

        info!(reference = %reference, "Rule set slot created");
        Ok(())
    }

    async fn write_chunk(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
        offset: u64,
        bytes: &[u8],
    ) -> Result<BufferStatus, StoreError> {
        self.authorize(authority, reference)?;

        let mut buffers = self.buffers.lock();
        let buffer = buffers.entry(reference.clone()).or_default();
        buffer.write(offset, bytes)?;

        debug!(
            reference = %reference,
            offset,
            len = bytes.len(),
            total = buffer.len(),
            "Buffer chunk written"
        );
        Ok(buffer.status())
    }

    async fn finalize(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
    ) -> Result<u32, StoreError> {
        self.authorize(authority, reference)?;

        // Snapshot the bytes without holding the buffer lock across the
        // commit; the buffer is only discarded once the commit succeeded,
        // so a failed finalize leaves it intact for repair or abandon.
        let bytes = {
            let buffers = self.buffers.lock();
            let buffer = buffers
                .get(reference)
                .ok_or_else(|| StoreError::NoBuffer(reference.clone()))?;
            buffer.bytes().to_vec()
        };

        let version = self.commit(authority, reference, &bytes).await?;
        self.buffers.lock().remove(reference);

        Ok(version)
    }

    async fn abandon(&self, authority: &Identity, reference: &RuleSetRef) -> Result<(), StoreError> {
        self.authorize(authority, reference)?;

        self.buffers
            .lock()
            .remove(reference)
            .ok_or_else(|| StoreError::NoBuffer(reference.clone()))?;

        info!(reference = %reference, "Buffer abandoned");
        Ok(())
    }

    async fn commit(
        &self,
        authority: &Identity,
        reference: &RuleSetRef,
        bytes: &[u8],
    ) -> Result<u32, StoreError> {
        self.authorize(authority, reference)?;

        // Full validation before any state change.
        let rule_set = Self::decode_for(reference, bytes)?;

        let mut slots = self.slots.write();
        let slot = slots.entry(reference.clone()).or_default();
        slot.versions.push(Arc::new(rule_set));
        let version = slot.versions.len() as u32;

        info!(reference = %reference, version, "Rule set committed");
        Ok(version)
    }

    async fn get(
        &self,
        reference: &RuleSetRef,
        version: Option<u32>,
    ) -> Result<Revision, StoreError> {
        let slots = self.slots.read();
        let slot = slots
            .get(reference)
            .filter(|slot| !slot.versions.is_empty())
            .ok_or_else(|| StoreError::NotFound(reference.clone()))?;

        match version {
            None => {
                let version = slot.versions.len() as u32;
                Ok(Revision {
                    version,
                    rule_set: slot.versions[slot.versions.len() - 1].clone(),
                })
            }
            Some(v) => {
                let rule_set = v
                    .checked_sub(1)
                    .and_then(|i| slot.versions.get(i as usize))
                    .ok_or(StoreError::VersionNotFound {
                        reference: reference.clone(),
                        version: v,
                    })?;
                Ok(Revision {
                    version: v,
                    rule_set: rule_set.clone(),
                })
            }
        }
    }

    async fn latest_version(&self, reference: &RuleSetRef) -> Result<Option<u32>, StoreError> {
        let slots = self.slots.read();
        Ok(slots
            .get(reference)
            .map(|slot| slot.versions.len() as u32)
            .filter(|v| *v > 0))
    }

    async fn buffer_status(
        &self,
        reference: &RuleSetRef,
    ) -> Result<Option<BufferStatus>, StoreError> {
        Ok(self.buffers.lock().get(reference).map(Buffer::status))
    }

    async fn rule_set_count(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| !slot.versions.is_empty())
            .count()
    }

    async fn reclaim_stale(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut buffers = self.buffers.lock();
        let before = buffers.len();
        buffers.retain(|reference, buffer| {
            let stale = buffer.is_stale(now, ttl);
            if stale {
                info!(reference = %reference, len = buffer.len(), "Reclaiming stale buffer");
            }
            !stale
        });
        before - buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Operation, PayloadKey};
    use crate::rules::{CompareOp, Rule};

    fn creator() -> Identity {
        Identity::new([1u8; 32])
    }

    fn reference() -> RuleSetRef {
        RuleSetRef::new(creator(), "transfer-policy")
    }

    fn sample_rule_set() -> RuleSet {
        let mut rule_set = RuleSet::new("transfer-policy", creator());
        rule_set.add(
            Operation::Transfer,
            Rule::Amount {
                field: PayloadKey::AMOUNT,
                operator: CompareOp::LtEq,
                amount: 1000,
            },
        );
        rule_set
    }

    #[tokio::test]
    async fn test_commit_and_get() {
        let store = MemoryStore::new();
        let bytes = sample_rule_set().to_bytes().unwrap();

        let version = store.commit(&creator(), &reference(), &bytes).await.unwrap();
        assert_eq!(version, 1);

        let revision = store.get(&reference(), None).await.unwrap();
        assert_eq!(revision.version, 1);
        assert_eq!(*revision.rule_set, sample_rule_set());
    }

    #[tokio::test]
    async fn test_versions_are_append_only() {
        let store = MemoryStore::new();
        let first = sample_rule_set();

        let mut second = sample_rule_set();
        second.add(Operation::Burn, Rule::Pass);

        store
            .commit(&creator(), &reference(), &first.to_bytes().unwrap())
            .await
            .unwrap();
        let v2 = store
            .commit(&creator(), &reference(), &second.to_bytes().unwrap())
            .await
            .unwrap();
        assert_eq!(v2, 2);

        // Prior version remains queryable and unchanged.
        let old = store.get(&reference(), Some(1)).await.unwrap();
        assert_eq!(*old.rule_set, first);

        let latest = store.get(&reference(), None).await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(*latest.rule_set, second);
    }

    #[tokio::test]
    async fn test_missing_versions() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get(&reference(), None).await,
            Err(StoreError::NotFound(_))
        ));

        store
            .commit(&creator(), &reference(), &sample_rule_set().to_bytes().unwrap())
            .await
            .unwrap();

        assert!(matches!(
            store.get(&reference(), Some(0)).await,
            Err(StoreError::VersionNotFound { version: 0, .. })
        ));
        assert!(matches!(
            store.get(&reference(), Some(2)).await,
            Err(StoreError::VersionNotFound { version: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_commit_is_atomic() {
        let store = MemoryStore::new();
        store
            .commit(&creator(), &reference(), &sample_rule_set().to_bytes().unwrap())
            .await
            .unwrap();

        let result = store.commit(&creator(), &reference(), b"not json").await;
        assert!(matches!(result, Err(StoreError::Invalid(_))));

        // Prior state fully intact.
        let revision = store.get(&reference(), None).await.unwrap();
        assert_eq!(revision.version, 1);
        assert_eq!(store.latest_version(&reference()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_commit_rejects_mismatched_target() {
        let store = MemoryStore::new();
        let other = RuleSetRef::new(creator(), "other-name");

        let result = store
            .commit(&creator(), &other, &sample_rule_set().to_bytes().unwrap())
            .await;
        assert!(matches!(result, Err(StoreError::TargetMismatch { .. })));
        assert!(matches!(
            store.get(&other, None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_chunked_upload_equals_contiguous_write() {
        let bytes = sample_rule_set().to_bytes().unwrap();
        let split = 256.min(bytes.len() / 2);

        // Chunked path.
        let chunked = MemoryStore::new();
        chunked
            .write_chunk(&creator(), &reference(), 0, &bytes[..split])
            .await
            .unwrap();
        chunked
            .write_chunk(&creator(), &reference(), split as u64, &bytes[split..])
            .await
            .unwrap();
        let v_chunked = chunked.finalize(&creator(), &reference()).await.unwrap();

        // Contiguous path.
        let direct = MemoryStore::new();
        let v_direct = direct.commit(&creator(), &reference(), &bytes).await.unwrap();

        assert_eq!(v_chunked, v_direct);
        let a = chunked.get(&reference(), None).await.unwrap();
        let b = direct.get(&reference(), None).await.unwrap();
        assert_eq!(a.rule_set, b.rule_set);

        // Buffer consumed by the successful finalize.
        assert!(chunked.buffer_status(&reference()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_finalize_preserves_buffer_and_versions() {
        let store = MemoryStore::new();
        store
            .commit(&creator(), &reference(), &sample_rule_set().to_bytes().unwrap())
            .await
            .unwrap();

        store
            .write_chunk(&creator(), &reference(), 0, b"garbage")
            .await
            .unwrap();
        assert!(store.finalize(&creator(), &reference()).await.is_err());

        // Buffer survives for repair; committed state untouched.
        assert!(store.buffer_status(&reference()).await.unwrap().is_some());
        assert_eq!(store.latest_version(&reference()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_abandon_discards_buffer() {
        let store = MemoryStore::new();
        store
            .write_chunk(&creator(), &reference(), 0, b"partial")
            .await
            .unwrap();

        store.abandon(&creator(), &reference()).await.unwrap();
        assert!(store.buffer_status(&reference()).await.unwrap().is_none());

        assert!(matches!(
            store.finalize(&creator(), &reference()).await,
            Err(StoreError::NoBuffer(_))
        ));
        assert!(matches!(
            store.abandon(&creator(), &reference()).await,
            Err(StoreError::NoBuffer(_))
        ));
    }

    #[tokio::test]
    async fn test_create_semantics() {
        let store = MemoryStore::new();
        store.create(&creator(), &reference(), None).await.unwrap();

        assert!(matches!(
            store.create(&creator(), &reference(), None).await,
            Err(StoreError::AlreadyExists(_))
        ));

        // An active buffer for the key blocks create.
        let other = RuleSetRef::new(creator(), "other");
        store
            .write_chunk(&creator(), &other, 0, b"x")
            .await
            .unwrap();
        assert!(matches!(
            store.create(&creator(), &other, None).await,
            Err(StoreError::BufferActive(_))
        ));
    }

    #[tokio::test]
    async fn test_authorization() {
        let store = MemoryStore::new();
        let stranger = Identity::new([7u8; 32]);
        let delegate = Identity::new([8u8; 32]);

        store
            .create(&creator(), &reference(), Some(delegate))
            .await
            .unwrap();

        assert!(matches!(
            store.write_chunk(&stranger, &reference(), 0, b"x").await,
            Err(StoreError::NotAuthorized { .. })
        ));
        assert!(matches!(
            store
                .commit(&stranger, &reference(), &sample_rule_set().to_bytes().unwrap())
                .await,
            Err(StoreError::NotAuthorized { .. })
        ));

        // The delegated authority may write and finalize.
        let bytes = sample_rule_set().to_bytes().unwrap();
        store
            .write_chunk(&delegate, &reference(), 0, &bytes)
            .await
            .unwrap();
        let version = store.finalize(&delegate, &reference()).await.unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn test_old_revision_survives_new_commit() {
        let store = MemoryStore::new();
        store
            .commit(&creator(), &reference(), &sample_rule_set().to_bytes().unwrap())
            .await
            .unwrap();

        // Simulates an in-flight validation pinning the old version.
        let pinned = store.get(&reference(), None).await.unwrap();

        let mut updated = sample_rule_set();
        updated.add(Operation::Migrate, Rule::Pass);
        store
            .commit(&creator(), &reference(), &updated.to_bytes().unwrap())
            .await
            .unwrap();

        assert_eq!(pinned.version, 1);
        assert!(pinned.rule_set.rule_for(Operation::Migrate).is_none());
    }

    #[tokio::test]
    async fn test_reclaim_stale() {
        let store = MemoryStore::new();
        store
            .write_chunk(&creator(), &reference(), 0, b"x")
            .await
            .unwrap();

        // Fresh buffer survives a generous ttl.
        assert_eq!(store.reclaim_stale(Duration::seconds(3600)).await, 0);
        assert!(store.buffer_status(&reference()).await.unwrap().is_some());

        // Negative ttl forces staleness without waiting.
        assert_eq!(store.reclaim_stale(Duration::seconds(-1)).await, 1);
        assert!(store.buffer_status(&reference()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rule_set_count() {
        let store = MemoryStore::new();
        assert_eq!(store.rule_set_count().await, 0);

        // A created-but-empty slot does not count.
        store.create(&creator(), &reference(), None).await.unwrap();
        assert_eq!(store.rule_set_count().await, 0);

        store
            .commit(&creator(), &reference(), &sample_rule_set().to_bytes().unwrap())
            .await
            .unwrap();
        assert_eq!(store.rule_set_count().await, 1);
    }
}
