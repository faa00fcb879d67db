//! Append-only byte writer for the wire format.
//!
//! All integers are fixed-width little-endian. Variable-length data is
//! length-prefixed; the prefix width (8/16/32 bit) is chosen per field by
//! the caller to bound the worst case while minimizing overhead.

/// Append-only writer over a growable byte buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    /// Raw bytes without a length prefix (fixed-length fields)
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// String with an 8-bit length prefix (short names, keys, tags)
    pub fn put_str8(&mut self, value: &str) {
        self.put_u8(value.len() as u8);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// String with a 16-bit length prefix (attribute values, URLs)
    pub fn put_str16(&mut self, value: &str) {
        self.put_u16(value.len() as u16);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// String with a 32-bit length prefix (text node content)
    pub fn put_str32(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Byte buffer with a 32-bit length prefix (network bodies)
    pub fn put_buf32(&mut self, value: &[u8]) {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
    }

    /// Nullable field: `[presence:u8][value?]`
    pub fn put_opt<T, F>(&mut self, value: Option<&T>, mut write: F)
    where
        F: FnMut(&mut Self, &T),
    {
        match value {
            Some(v) => {
                self.put_u8(1);
                write(self, v);
            }
            None => self.put_u8(0),
        }
    }
}
