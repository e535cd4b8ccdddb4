//! Command record codec
//!
//! The payload of a command-carrying datagram (bytes 12..) is a chain of
//! back-to-back records:
//!
//! ```text
//! ┌────────────┬──────────┬────────────┬──────────────────┐
//! │ length u16 │ reserved │ 4-char tag │ payload          │
//! │ bytes 0..2 │ 2..4     │ bytes 4..8 │ bytes 8..length  │
//! └────────────┴──────────┴────────────┴──────────────────┘
//! ```
//!
//! The length field covers the whole record, header included. Records pack
//! until the datagram end; a record whose declared length does not fit the
//! remaining bytes poisons the rest of the chain (the datagram is abandoned
//! from that point, the session stays up).

use super::header::{pack_flags_len, FLAG_ACK_REQUEST, HEADER_LEN, MAX_DATAGRAM_LEN};

/// Fixed record header size: length + reserved + tag.
pub const RECORD_HEADER_LEN: usize = 8;

/// One decoded record: the 4-character tag and its payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub tag: [u8; 4],
    pub payload: &'a [u8],
}

impl Record<'_> {
    /// Tag as text, for diagnostics and the unknown-command event.
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// A malformed record, reported with the offset it was found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordError {
    /// Offset of the bad record within the command region.
    pub offset: usize,
    /// Declared record length that failed validation.
    pub declared_len: u16,
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bad record length {} at offset {}",
            self.declared_len, self.offset
        )
    }
}

/// Bounded iterator over the record chain of one datagram.
///
/// Yields `Ok(record)` for each well-formed record and a single
/// `Err(RecordError)` before stopping if the chain is inconsistent.
pub struct RecordWalker<'a> {
    buf: &'a [u8],
    pos: usize,
    poisoned: bool,
}

impl<'a> RecordWalker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            poisoned: false,
        }
    }
}

impl<'a> Iterator for RecordWalker<'a> {
    type Item = Result<Record<'a>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned || self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        if rest.len() < RECORD_HEADER_LEN {
            self.poisoned = true;
            return Some(Err(RecordError {
                offset: self.pos,
                declared_len: rest.len() as u16,
            }));
        }
        let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
        if len < RECORD_HEADER_LEN || len > rest.len() {
            self.poisoned = true;
            return Some(Err(RecordError {
                offset: self.pos,
                declared_len: len as u16,
            }));
        }
        let record = Record {
            tag: [rest[4], rest[5], rest[6], rest[7]],
            payload: &rest[RECORD_HEADER_LEN..len],
        };
        self.pos += len;
        Some(Ok(record))
    }
}

/// Encode a complete outbound command datagram.
///
/// The datagram carries exactly one record; its total length is
/// `20 + payload.len()` and it requests an acknowledgement, so `packet_id`
/// must be a fresh local packet id.
pub fn encode_command_datagram(
    session_id: u16,
    packet_id: u16,
    tag: &[u8; 4],
    payload: &[u8],
) -> Vec<u8> {
    let total = HEADER_LEN + RECORD_HEADER_LEN + payload.len();
    debug_assert!(total <= MAX_DATAGRAM_LEN);

    let mut b = vec![0u8; total];
    b[0..2].copy_from_slice(&pack_flags_len(FLAG_ACK_REQUEST, total));
    b[2..4].copy_from_slice(&session_id.to_be_bytes());
    b[10..12].copy_from_slice(&packet_id.to_be_bytes());

    let record_len = (RECORD_HEADER_LEN + payload.len()) as u16;
    b[12..14].copy_from_slice(&record_len.to_be_bytes());
    b[16..20].copy_from_slice(tag);
    b[20..].copy_from_slice(payload);
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_cut_datagram() {
        // Cut on ME 0 with session 0x0123 and packet id 8.
        let b = encode_command_datagram(0x0123, 0x0008, b"DCut", &[0, 0, 0, 0]);
        assert_eq!(b.len(), 24);
        assert_eq!(
            &b[..16],
            &[
                0x08, 0x18, 0x01, 0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00,
                0x0c, 0x00, 0x00
            ]
        );
        assert_eq!(&b[16..], b"DCut\x00\x00\x00\x00");
    }

    #[test]
    fn walk_single_record() {
        let buf = [
            0x00, 0x0c, 0x00, 0x00, b'P', b'r', b'g', b'I', 0x00, 0x00, 0x00, 0x05,
        ];
        let mut walker = RecordWalker::new(&buf);
        let r = walker.next().unwrap().unwrap();
        assert_eq!(&r.tag, b"PrgI");
        assert_eq!(r.payload, &[0x00, 0x00, 0x00, 0x05]);
        assert!(walker.next().is_none());
    }

    #[test]
    fn walk_back_to_back_records() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x00, 0x0a, 0x00, 0x00]);
        buf.extend_from_slice(b"TrSS");
        buf.extend_from_slice(&[0x00, 0x02]);
        buf.extend_from_slice(&[0x00, 0x0c, 0x00, 0x00]);
        buf.extend_from_slice(b"PrvI");
        buf.extend_from_slice(&[0x01, 0x00, 0x00, 0x07]);

        let records: Vec<_> = RecordWalker::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0].tag, b"TrSS");
        assert_eq!(records[1].payload, &[0x01, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn walk_stops_on_bad_length() {
        // Second record declares more bytes than remain.
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x00, 0x0a, 0x00, 0x00]);
        buf.extend_from_slice(b"TrSS");
        buf.extend_from_slice(&[0x00, 0x02]);
        buf.extend_from_slice(&[0x00, 0xff, 0x00, 0x00]);
        buf.extend_from_slice(b"PrvI");
        buf.extend_from_slice(&[0x01, 0x00]);

        let mut walker = RecordWalker::new(&buf);
        assert!(walker.next().unwrap().is_ok());
        let err = walker.next().unwrap().unwrap_err();
        assert_eq!(err.offset, 10);
        assert_eq!(err.declared_len, 0xff);
        assert!(walker.next().is_none());
    }

    #[test]
    fn walk_rejects_undersized_length() {
        // A record length below the record header size would loop forever.
        let buf = [0x00, 0x04, 0x00, 0x00, b'_', b'v', b'e', b'r', 0, 0, 0, 0];
        let mut walker = RecordWalker::new(&buf);
        assert!(walker.next().unwrap().is_err());
        assert!(walker.next().is_none());
    }

    #[test]
    fn walk_empty_region() {
        assert!(RecordWalker::new(&[]).next().is_none());
    }
}
