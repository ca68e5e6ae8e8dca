use thiserror::Error;

/// Errors from decoding wire bytes. All are structural: nothing is
/// applied when decoding fails.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("unknown instruction discriminator {0}")]
    UnknownDiscriminator(u8),

    #[error("unknown operation tag {0}")]
    UnknownOperation(u8),

    #[error("unknown payload value tag {0}")]
    UnknownValueTag(u8),

    #[error("duplicate payload key {0}")]
    DuplicateKey(u8),

    #[error("payload nesting exceeds maximum depth {0}")]
    NestingTooDeep(u32),

    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    #[error("declared length {0} exceeds remaining input")]
    LengthOutOfBounds(u64),

    #[error("{0} trailing bytes after instruction")]
    TrailingBytes(usize),
}

/// Byte-sink for the wire format: little-endian integers, u32
/// length-prefixed strings and byte-sequences.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        WireWriter::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        WireWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed byte sequence.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed utf-8 string.
    pub fn put_str(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Cursor over wire bytes with position-aware errors.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::UnexpectedEof(self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32, WireError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn u64(&mut self) -> Result<u64, WireError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn raw(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.take(len)
    }

    /// Length-prefixed byte sequence. The declared length is bounds-checked
    /// against remaining input before any allocation.
    pub fn bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let len = self.u32()? as usize;
        if len > self.remaining() {
            return Err(WireError::LengthOutOfBounds(len as u64));
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Length-prefixed utf-8 string.
    pub fn str(&mut self) -> Result<String, WireError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Reject trailing garbage after a complete decode.
    pub fn expect_end(&self) -> Result<(), WireError> {
        if self.remaining() > 0 {
            return Err(WireError::TrailingBytes(self.remaining()));
        }
        Ok(())
    }
}
