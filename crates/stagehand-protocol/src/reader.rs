//! Bounds-checked big-endian reads over a packet group.

use bytes::{Buf, Bytes};

use crate::ProtocolError;

/// A cursor over the unread part of a packet group.
///
/// Every read checks the remaining length first, so parsers never panic on
/// short input. Cloning is cheap: [`Bytes`] is reference counted.
#[derive(Debug, Clone)]
pub struct FrameReader {
    buf: Bytes,
}

impl FrameReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns the unread bytes without consuming them.
    pub fn peek_remaining(&self) -> &[u8] {
        &self.buf
    }

    fn ensure(&self, needed: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < needed {
            return Err(ProtocolError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    /// Splits off the next `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ProtocolError> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }

    /// Reads `len` bytes as text, cut at the first NUL.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Stage and semaphore
    /// IDs are compared as strings, and a lossy ID simply won't match.
    pub fn read_string(&mut self, len: usize) -> Result<String, ProtocolError> {
        let raw = self.read_bytes(len)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Reads a u8 length prefix followed by that many bytes of text.
    pub fn read_pascal_string(&mut self) -> Result<String, ProtocolError> {
        let len = usize::from(self.read_u8()?);
        self.read_string(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &'static [u8]) -> FrameReader {
        FrameReader::new(Bytes::from_static(bytes))
    }

    #[test]
    fn test_read_u16_is_big_endian() {
        let mut r = reader(&[0x12, 0x34]);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_read_u32_short_input_returns_truncated() {
        let mut r = reader(&[0x00, 0x01]);
        assert_eq!(
            r.read_u32(),
            Err(ProtocolError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_read_pascal_string_cuts_at_nul() {
        let mut r = reader(&[4, b'h', b'u', b'b', 0, 0xFF]);
        assert_eq!(r.read_pascal_string().unwrap(), "hub");
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_read_pascal_string_length_past_end_returns_truncated() {
        let mut r = reader(&[9, b'a']);
        assert!(matches!(
            r.read_pascal_string(),
            Err(ProtocolError::Truncated { needed: 9, .. })
        ));
    }

    #[test]
    fn test_read_f32_decodes_ieee_bits() {
        let mut r = reader(&[0x3F, 0x80, 0x00, 0x00]);
        assert_eq!(r.read_f32().unwrap(), 1.0);
    }

    #[test]
    fn test_skip_past_end_returns_truncated() {
        let mut r = reader(&[1]);
        assert!(r.skip(2).is_err());
        // A failed read leaves the cursor where it was.
        assert_eq!(r.remaining(), 1);
    }
}
