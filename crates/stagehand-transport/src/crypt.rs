//! The 14-byte frame header, key rotation, and the reader/writer halves.
//!
//! Wire layout of one frame (all fields big-endian):
//!
//! ```text
//! offset  size  field
//!      0     1  pf0                        ((len >> 12) & 0xF3) | 3
//!      1     1  key_rot_delta              0 = keep the current key
//!      2     2  packet_num
//!      4     2  data_size                  body length in bytes
//!      6     2  prev_packet_combined_check
//!      8     2  check0
//!     10     2  check1
//!     12     2  check2
//!     14     n  body (encrypted)
//! ```

use std::io;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    Cipher, END_TERMINATOR, PacketReader, PacketWriter, TransportError,
};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 14;

/// Both directions start from this key.
pub const INITIAL_KEY: u32 = 995_117;

/// The server always rotates its send key by this delta.
pub const SEND_KEY_ROT_DELTA: u8 = 3;

/// Advances a rolling key: `key = delta * (key + 1)`, wrapping at 32 bits.
pub fn rotate_key(key: u32, delta: u8) -> u32 {
    u32::from(delta).wrapping_mul(key.wrapping_add(1))
}

// ---------------------------------------------------------------------------
// CryptHeader
// ---------------------------------------------------------------------------

/// The fixed header that precedes every encrypted body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CryptHeader {
    pub pf0: u8,
    pub key_rot_delta: u8,
    pub packet_num: u16,
    pub data_size: u16,
    pub prev_packet_combined_check: u16,
    pub check0: u16,
    pub check1: u16,
    pub check2: u16,
}

impl CryptHeader {
    /// Computes the `pf0` byte for a body of `len` bytes.
    pub fn pf0_for_len(len: usize) -> u8 {
        (((len >> 12) & 0xF3) | 3) as u8
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.pf0);
        buf.put_u8(self.key_rot_delta);
        buf.put_u16(self.packet_num);
        buf.put_u16(self.data_size);
        buf.put_u16(self.prev_packet_combined_check);
        buf.put_u16(self.check0);
        buf.put_u16(self.check1);
        buf.put_u16(self.check2);
    }

    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let mut buf = &raw[..];
        Self {
            pf0: buf.get_u8(),
            key_rot_delta: buf.get_u8(),
            packet_num: buf.get_u16(),
            data_size: buf.get_u16(),
            prev_packet_combined_check: buf.get_u16(),
            check0: buf.get_u16(),
            check1: buf.get_u16(),
            check2: buf.get_u16(),
        }
    }

    fn checks(&self) -> [u16; 3] {
        [self.check0, self.check1, self.check2]
    }
}

// ---------------------------------------------------------------------------
// CryptReader
// ---------------------------------------------------------------------------

/// Reads framed, encrypted packet groups from any async byte stream.
pub struct CryptReader<R, C> {
    inner: R,
    cipher: Arc<C>,
    key: u32,
}

impl<R, C> CryptReader<R, C>
where
    R: AsyncRead + Unpin + Send + 'static,
    C: Cipher,
{
    pub fn new(inner: R, cipher: Arc<C>) -> Self {
        Self {
            inner,
            cipher,
            key: INITIAL_KEY,
        }
    }
}

impl<R, C> PacketReader for CryptReader<R, C>
where
    R: AsyncRead + Unpin + Send + 'static,
    C: Cipher,
{
    async fn read_packet_group(
        &mut self,
    ) -> Result<Option<Bytes>, TransportError> {
        let mut raw = [0u8; HEADER_LEN];
        match self.inner.read_exact(&mut raw).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(TransportError::ReceiveFailed(e)),
        }
        let header = CryptHeader::decode(&raw);

        let mut body = vec![0u8; usize::from(header.data_size)];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(TransportError::ReceiveFailed)?;

        if header.key_rot_delta != 0 {
            self.key = rotate_key(self.key, header.key_rot_delta);
        }

        let (plain, checks) = self.cipher.decrypt(&body, self.key);
        if checks.header_checks() != header.checks() {
            tracing::warn!(
                packet_num = header.packet_num,
                "decrypted body does not match header checks"
            );
            return Err(TransportError::ChecksumMismatch {
                packet_num: header.packet_num,
                expected: header.checks(),
                actual: checks.header_checks(),
            });
        }

        Ok(Some(Bytes::from(plain)))
    }
}

// ---------------------------------------------------------------------------
// CryptWriter
// ---------------------------------------------------------------------------

/// Writes framed, encrypted packet groups to any async byte stream.
///
/// Tracks the outbound packet counter and the previous combined check,
/// both of which go into the next header.
pub struct CryptWriter<W, C> {
    inner: W,
    cipher: Arc<C>,
    key: u32,
    sent_packets: u16,
    prev_combined_check: u16,
}

impl<W, C> CryptWriter<W, C>
where
    W: AsyncWrite + Unpin + Send + 'static,
    C: Cipher,
{
    pub fn new(inner: W, cipher: Arc<C>) -> Self {
        Self {
            inner,
            cipher,
            key: INITIAL_KEY,
            sent_packets: 0,
            prev_combined_check: 0,
        }
    }

    /// Number of frames written so far.
    pub fn sent_packets(&self) -> u16 {
        self.sent_packets
    }
}

impl<W, C> PacketWriter for CryptWriter<W, C>
where
    W: AsyncWrite + Unpin + Send + 'static,
    C: Cipher,
{
    async fn send_packet_group(
        &mut self,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut group = BytesMut::with_capacity(data.len() + 2);
        group.extend_from_slice(data);
        group.extend_from_slice(&END_TERMINATOR);

        if group.len() > usize::from(u16::MAX) {
            return Err(TransportError::PacketTooLarge(group.len()));
        }

        self.key = rotate_key(self.key, SEND_KEY_ROT_DELTA);
        let (cipher_text, checks) = self.cipher.encrypt(&group, self.key);
        let len = cipher_text.len();
        if len > usize::from(u16::MAX) {
            return Err(TransportError::PacketTooLarge(len));
        }

        let header = CryptHeader {
            pf0: CryptHeader::pf0_for_len(len),
            key_rot_delta: SEND_KEY_ROT_DELTA,
            packet_num: self.sent_packets,
            data_size: len as u16,
            prev_packet_combined_check: self.prev_combined_check,
            check0: checks.check0,
            check1: checks.check1,
            check2: checks.check2,
        };

        let mut frame = BytesMut::with_capacity(HEADER_LEN + len);
        header.encode(&mut frame);
        frame.extend_from_slice(&cipher_text);

        self.inner
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)?;
        self.inner.flush().await.map_err(TransportError::SendFailed)?;

        self.sent_packets = self.sent_packets.wrapping_add(1);
        self.prev_combined_check = checks.combined;
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullCipher;

    fn pair() -> (
        CryptWriter<tokio::io::DuplexStream, NullCipher>,
        CryptReader<tokio::io::DuplexStream, NullCipher>,
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let cipher = Arc::new(NullCipher);
        (
            CryptWriter::new(a, Arc::clone(&cipher)),
            CryptReader::new(b, cipher),
        )
    }

    // =====================================================================
    // Header and key rotation
    // =====================================================================

    #[test]
    fn test_rotate_key_from_initial_key() {
        assert_eq!(rotate_key(INITIAL_KEY, 3), 3 * (INITIAL_KEY + 1));
    }

    #[test]
    fn test_rotate_key_wraps_instead_of_overflowing() {
        assert_eq!(rotate_key(u32::MAX, 3), 0);
        assert_eq!(rotate_key(u32::MAX - 1, 2), 0);
    }

    #[test]
    fn test_pf0_for_len_small_body_is_three() {
        assert_eq!(CryptHeader::pf0_for_len(10), 3);
    }

    #[test]
    fn test_pf0_for_len_masks_size_bits() {
        // 0x4000 >> 12 = 4, & 0xF3 = 0 → 3
        assert_eq!(CryptHeader::pf0_for_len(0x4000), 3);
        // 0x1000 >> 12 = 1 → 1 | 3 = 3
        assert_eq!(CryptHeader::pf0_for_len(0x1000), 3);
        // 0x8000 >> 12 = 8 → 8 | 3 = 0x0B
        assert_eq!(CryptHeader::pf0_for_len(0x8000), 0x0B);
    }

    #[test]
    fn test_header_encode_is_big_endian() {
        let header = CryptHeader {
            pf0: 3,
            key_rot_delta: 3,
            packet_num: 0x0102,
            data_size: 0x0304,
            prev_packet_combined_check: 0x0506,
            check0: 0x0708,
            check1: 0x090A,
            check2: 0x0B0C,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[3, 3, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
        );

        let raw: [u8; HEADER_LEN] = buf[..].try_into().unwrap();
        assert_eq!(CryptHeader::decode(&raw), header);
    }

    // =====================================================================
    // Reader / writer over an in-memory stream
    // =====================================================================

    #[tokio::test]
    async fn test_send_packet_group_appends_end_terminator() {
        let (mut writer, mut reader) = pair();

        writer.send_packet_group(&[0x00, 0x17, 0xAA]).await.unwrap();
        let group = reader.read_packet_group().await.unwrap().unwrap();

        assert_eq!(&group[..], &[0x00, 0x17, 0xAA, 0x00, 0x10]);
    }

    #[tokio::test]
    async fn test_send_packet_group_empty_payload_is_just_terminator() {
        let (mut writer, mut reader) = pair();

        writer.send_packet_group(&[]).await.unwrap();
        let group = reader.read_packet_group().await.unwrap().unwrap();

        assert_eq!(&group[..], &END_TERMINATOR);
    }

    #[tokio::test]
    async fn test_send_packet_group_counts_packets() {
        let (mut writer, mut reader) = pair();

        for _ in 0..3 {
            writer.send_packet_group(&[1]).await.unwrap();
            reader.read_packet_group().await.unwrap().unwrap();
        }

        assert_eq!(writer.sent_packets(), 3);
    }

    #[tokio::test]
    async fn test_send_packet_group_rejects_oversized_group() {
        let (mut writer, _reader) = pair();
        let big = vec![0u8; usize::from(u16::MAX)];

        let result = writer.send_packet_group(&big).await;

        assert!(matches!(result, Err(TransportError::PacketTooLarge(_))));
    }

    #[tokio::test]
    async fn test_read_packet_group_clean_eof_returns_none() {
        let (writer, mut reader) = pair();
        drop(writer);

        let result = reader.read_packet_group().await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_packet_group_bad_checks_returns_mismatch() {
        let (mut raw, b) = tokio::io::duplex(1024);
        let mut reader = CryptReader::new(b, Arc::new(NullCipher));

        let header = CryptHeader {
            pf0: 3,
            key_rot_delta: 3,
            packet_num: 9,
            data_size: 2,
            check0: 0xDEAD,
            ..Default::default()
        };
        let mut frame = BytesMut::new();
        header.encode(&mut frame);
        frame.extend_from_slice(&[0x00, 0x10]);
        raw.write_all(&frame).await.unwrap();

        let result = reader.read_packet_group().await;

        assert!(matches!(
            result,
            Err(TransportError::ChecksumMismatch { packet_num: 9, .. })
        ));
    }
}
