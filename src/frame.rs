//! Frame layout used by the stress harness.
//!
//! Each record on the byte stream is an 8-byte little-endian header
//! followed by the payload. The header carries a sync word (for
//! resynchronization after garbage), the payload length and an additive
//! checksum over the payload bytes.

/// Sync word marking the start of a header; `55 aa` on the wire.
pub const SYNC_WORD: u16 = 0xaa55;

/// Wire form of [`SYNC_WORD`].
pub const SYNC_BYTES: [u8; 2] = SYNC_WORD.to_le_bytes();

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 8;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub len: u16,
    /// Additive checksum of the payload.
    pub checksum: u32,
}

impl FrameHeader {
    /// Header describing `payload`. The caller keeps payloads within
    /// `u16::MAX` bytes; the harness config enforces that bound.
    pub fn for_payload(payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= u16::MAX as usize);
        Self {
            len: payload.len() as u16,
            checksum: checksum(payload),
        }
    }

    /// Encode into wire form: sync, len, checksum, all little-endian.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..2].copy_from_slice(&SYNC_BYTES);
        out[2..4].copy_from_slice(&self.len.to_le_bytes());
        out[4..].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }

    /// Decode a wire header, returning `None` if the sync word is absent.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Option<Self> {
        if u16::from_le_bytes([bytes[0], bytes[1]]) != SYNC_WORD {
            return None;
        }
        Some(Self {
            len: u16::from_le_bytes([bytes[2], bytes[3]]),
            checksum: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Additive checksum: wrapping byte sum of the payload.
pub fn checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

/// Offset of the first sync byte pair in `window`, if any.
pub fn scan_sync(window: &[u8]) -> Option<usize> {
    window.windows(2).position(|pair| pair == SYNC_BYTES)
}

/// Append a complete frame (header then payload) to `out`.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&FrameHeader::for_payload(payload).encode());
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_known_values() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        assert_eq!(checksum(&[0xff; 4]), 4 * 0xff);
    }

    #[test]
    fn header_round_trip() {
        let payload = b"some payload bytes";
        let header = FrameHeader::for_payload(payload);
        let decoded = FrameHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.len as usize, payload.len());
        assert_eq!(decoded.checksum, checksum(payload));
    }

    #[test]
    fn decode_rejects_missing_sync() {
        let mut bytes = FrameHeader::for_payload(b"x").encode();
        bytes[0] ^= 0x01;
        assert_eq!(FrameHeader::decode(&bytes), None);
    }

    #[test]
    fn sync_scan_finds_first_pair() {
        let mut stream = vec![0u8, 1, 2];
        stream.extend_from_slice(&SYNC_BYTES);
        stream.extend_from_slice(&[9, 9]);
        stream.extend_from_slice(&SYNC_BYTES);
        assert_eq!(scan_sync(&stream), Some(3));
        assert_eq!(scan_sync(&stream[4..]), Some(3));
        assert_eq!(scan_sync(&[0u8, 1, 2, 3]), None);
        // Lone first sync byte at the end of a window is not a match.
        assert_eq!(scan_sync(&[1, 2, SYNC_BYTES[0]]), None);
    }

    #[test]
    fn frame_encoding_prefixes_header() {
        let payload = vec![7u8; 32];
        let mut frame = Vec::new();
        encode_frame(&payload, &mut frame);
        assert_eq!(frame.len(), HEADER_LEN + payload.len());
        assert_eq!(&frame[..2], &SYNC_BYTES);
        let header = FrameHeader::decode(frame[..HEADER_LEN].try_into().unwrap()).unwrap();
        assert_eq!(header.len as usize, payload.len());
        assert_eq!(&frame[HEADER_LEN..], &payload[..]);
    }
}
