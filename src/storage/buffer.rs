use chrono::{DateTime, Duration, Utc};

use super::traits::{BufferStatus, StoreError};

/// Maximum accumulated buffer size.
pub const MAX_BUFFER_LEN: usize = 1 << 20;

/// Transient staging area for a chunked rule-set upload.
///
/// Chunks land at explicit offsets; gaps are zero-filled. Contiguity is
/// not proven here; commit-time structural validation rejects truncated
/// or gapped uploads, so the buffer only enforces the size cap.
#[derive(Debug, Clone)]
pub struct Buffer {
    bytes: Vec<u8>,
    chunks_written: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Buffer {
    pub fn new() -> Self {
        let now = Utc::now();
        Buffer {
            bytes: Vec::new(),
            chunks_written: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Write `data` at `offset`, growing the buffer as needed.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), StoreError> {
        let offset = usize::try_from(offset)
            .ok()
            .filter(|o| *o <= MAX_BUFFER_LEN)
            .ok_or(StoreError::BufferTooLarge {
                max: MAX_BUFFER_LEN,
            })?;
        let end = offset
            .checked_add(data.len())
            .filter(|e| *e <= MAX_BUFFER_LEN)
            .ok_or(StoreError::BufferTooLarge {
                max: MAX_BUFFER_LEN,
            })?;

        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[offset..end].copy_from_slice(data);

        self.chunks_written += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.bytes)
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            len: self.bytes.len() as u64,
            chunks_written: self.chunks_written,
            checksum: self.checksum(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Idle longer than `ttl` relative to `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.updated_at > ttl
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}
