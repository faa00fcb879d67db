//! Cursor-style byte reader for the wire format.
//!
//! Decoding trusts that the buffer was written by the matching codec
//! version; the reader only fails when the buffer runs out, a string is
//! not UTF-8, or a tag/presence byte is outside its domain.

use crate::error::CodecError;

/// Forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TooShort {
                needed: n - self.remaining(),
                offset: self.pos,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_f64(&mut self) -> Result<f64, CodecError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.get_u8()? != 0)
    }

    /// Raw bytes without a length prefix (fixed-length fields)
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    fn get_str(&mut self, len: usize) -> Result<String, CodecError> {
        let start = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidString(start))
    }

    pub fn get_str8(&mut self) -> Result<String, CodecError> {
        let len = self.get_u8()? as usize;
        self.get_str(len)
    }

    pub fn get_str16(&mut self) -> Result<String, CodecError> {
        let len = self.get_u16()? as usize;
        self.get_str(len)
    }

    pub fn get_str32(&mut self) -> Result<String, CodecError> {
        let len = self.get_u32()? as usize;
        self.get_str(len)
    }

    pub fn get_buf32(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// Nullable field: `[presence:u8][value?]`
    pub fn get_opt<T, F>(&mut self, mut read: F) -> Result<Option<T>, CodecError>
    where
        F: FnMut(&mut Self) -> Result<T, CodecError>,
    {
        let offset = self.pos;
        match self.get_u8()? {
            0 => Ok(None),
            1 => Ok(Some(read(self)?)),
            value => Err(CodecError::InvalidPresence { value, offset }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_past_end() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(r.get_u8().unwrap(), 1);
        let err = r.get_u32().unwrap_err();
        assert_eq!(err, CodecError::TooShort { needed: 3, offset: 1 });
    }

    #[test]
    fn test_str_roundtrip() {
        let mut w = super::super::writer::ByteWriter::new();
        w.put_str16("héllo");
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.get_str16().unwrap(), "héllo");
        assert!(r.is_empty());
    }

    #[test]
    fn test_invalid_utf8() {
        // length prefix 2, then an invalid UTF-8 sequence
        let mut r = ByteReader::new(&[2, 0xFF, 0xFE]);
        assert_eq!(r.get_str8().unwrap_err(), CodecError::InvalidString(1));
    }

    #[test]
    fn test_invalid_presence() {
        let mut r = ByteReader::new(&[9]);
        let err = r.get_opt(|r| r.get_u8()).unwrap_err();
        assert_eq!(err, CodecError::InvalidPresence { value: 9, offset: 0 });
    }
}
