//! Datagram header codec
//!
//! Every protocol datagram starts with a 12-byte big-endian header:
//!
//! ```text
//! ┌─────────────────┬────────────┬────────────┬──────────┬────────────┐
//! │ flags(5)|len(11)│ session id │ ack id     │ reserved │ packet id  │
//! │ bytes 0..2      │ bytes 2..4 │ bytes 4..6 │ 6..10    │ bytes 10..12│
//! └─────────────────┴────────────┴────────────┴──────────┴────────────┘
//! ```
//!
//! The high 5 bits of byte 0 carry the flag bits; the low 3 bits combine
//! with byte 1 to form the total datagram length (header included). The
//! packet id field is only meaningful when `FLAG_ACK_REQUEST` is set, and
//! the ack id field only in ack datagrams.

/// Header length; also the minimum valid datagram length.
pub const HEADER_LEN: usize = 12;

/// Maximum encodable datagram length (11-bit length field).
pub const MAX_DATAGRAM_LEN: usize = 0x07ff;

/// Receiver must reply with an ack referring to this datagram's packet id.
pub const FLAG_ACK_REQUEST: u8 = 0x01;
/// Handshake datagram.
pub const FLAG_HELLO: u8 = 0x02;
/// Retransmission of a datagram the receiver may have already seen.
pub const FLAG_RESEND: u8 = 0x04;
/// Request for retransmission.
pub const FLAG_REQUEST_NEXT_AFTER: u8 = 0x08;
/// Datagram is itself an acknowledgement.
pub const FLAG_ACK: u8 = 0x10;

/// Decoded datagram header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u8,
    /// Total datagram length declared on the wire, header included.
    pub length: u16,
    pub session_id: u16,
    /// Remote packet id this datagram acknowledges (ack datagrams only).
    pub ack_id: u16,
    /// Sender's packet id (only meaningful with `FLAG_ACK_REQUEST`).
    pub packet_id: u16,
}

impl Header {
    /// Parse the header of a received datagram.
    ///
    /// Returns `None` for a malformed datagram: shorter than the header, or
    /// a declared length that disagrees with the actual datagram size. Such
    /// datagrams are dropped by the session layer without closing anything.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        let length = u16::from(data[0] & 0x07) << 8 | u16::from(data[1]);
        if usize::from(length) != data.len() {
            return None;
        }
        Some(Self {
            flags: data[0] >> 3,
            length,
            session_id: u16::from_be_bytes([data[2], data[3]]),
            ack_id: u16::from_be_bytes([data[4], data[5]]),
            packet_id: u16::from_be_bytes([data[10], data[11]]),
        })
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Pack flag bits and a total datagram length into header bytes 0..2.
pub fn pack_flags_len(flags: u8, len: usize) -> [u8; 2] {
    debug_assert!(len <= MAX_DATAGRAM_LEN);
    [(flags << 3) | ((len >> 8) as u8 & 0x07), (len & 0xff) as u8]
}

/// Build the 20-byte hello datagram that begins the handshake.
///
/// The session id field is zero on a fresh connect; the device assigns the
/// real id in its reply.
pub fn hello_datagram(session_id: u16) -> [u8; 20] {
    let mut b = [
        0x10, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x26, 0x00, 0x00, 0x01, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    b[2..4].copy_from_slice(&session_id.to_be_bytes());
    b
}

/// Build a 12-byte ack datagram acknowledging `remote_packet_id`.
///
/// A fresh buffer is allocated per ack; the session id is stamped at build
/// time so that acks produced around the moment of id adoption carry the
/// current value.
pub fn ack_datagram(session_id: u16, remote_packet_id: u16) -> [u8; 12] {
    let mut b = [0u8; 12];
    b[0..2].copy_from_slice(&pack_flags_len(FLAG_ACK, HEADER_LEN));
    b[2..4].copy_from_slice(&session_id.to_be_bytes());
    b[4..6].copy_from_slice(&remote_packet_id.to_be_bytes());
    b
}
