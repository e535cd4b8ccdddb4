//! Session state machine
//!
//! The protocol machine that turns an unreliable datagram stream into a
//! reliable session: handshake, session-id adoption, per-side packet id
//! bookkeeping, duplicate/resend suppression, and ack generation. It is
//! pure (no sockets, no threads), which is what makes the whole protocol
//! layer testable with literal byte sequences.
//!
//! # Lifecycle
//!
//! ```text
//! ┌────────┐ begin_connect ┌────────────┐  Ack flag   ┌───────────┐
//! │ Closed │ ─────────────▶│ Connecting │ ───────────▶│ Connected │
//! └────────┘   (hello)     └────────────┘             └───────────┘
//!      ▲                         │                          │
//!      └─────────────────────────┴── close() / transport ───┘
//! ```
//!
//! While Connecting or Connected, every ack-requesting datagram adopts the
//! session id it carries and is acknowledged immediately; its command
//! region is handed to the dispatcher afterwards. A retransmitted datagram
//! whose packet id is still in the recent-id window is dropped without an
//! ack so the dispatcher never sees it twice.

use std::collections::VecDeque;

use crate::protocol::commands::ControlCommand;
use crate::protocol::encode_command_datagram;
use crate::protocol::header::{
    ack_datagram, hello_datagram, Header, FLAG_ACK, FLAG_ACK_REQUEST, FLAG_HELLO, FLAG_RESEND,
    HEADER_LEN,
};
use crate::types::ConnState;

/// How many recent remote packet ids are kept for resend suppression.
const RECENT_ID_WINDOW: usize = 20;

/// What the session machine wants done with one inbound datagram.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Inbound<'a> {
    /// Ack datagrams to transmit, in order, before any dispatching.
    pub acks: Vec<[u8; 12]>,
    /// Command region to hand to the dispatcher.
    pub commands: Option<&'a [u8]>,
    /// The handshake completed with this datagram.
    pub connected: bool,
}

/// Connection state machine for one device session.
#[derive(Debug, Default)]
pub struct Session {
    conn_state: ConnState,
    session_id: u16,
    local_packet_id: u16,
    recent_remote_ids: VecDeque<u16>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conn_state(&self) -> ConnState {
        self.conn_state
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn local_packet_id(&self) -> u16 {
        self.local_packet_id
    }

    /// Reset the session and produce the hello datagram that opens the
    /// handshake. The hello carries session id zero; the device assigns
    /// the real id in its reply.
    pub fn begin_connect(&mut self) -> [u8; 20] {
        self.reset();
        self.conn_state = ConnState::Connecting;
        hello_datagram(self.session_id)
    }

    /// Process one inbound datagram.
    ///
    /// Returns `None` when the datagram is dropped whole: malformed, or
    /// arriving on a closed session. Otherwise the returned [`Inbound`]
    /// lists the acks to send and the command region to dispatch.
    pub fn handle_datagram<'a>(&mut self, data: &'a [u8]) -> Option<Inbound<'a>> {
        if self.conn_state == ConnState::Closed {
            return None;
        }
        let Some(header) = Header::parse(data) else {
            log::debug!("malformed datagram ({} bytes), dropping", data.len());
            return None;
        };

        let mut out = Inbound::default();

        // Adopt the session id before building any ack, so acks produced
        // around the adoption moment already carry the right value.
        if header.has_flag(FLAG_ACK_REQUEST) {
            self.session_id = header.session_id;
        }

        if header.has_flag(FLAG_HELLO) {
            out.acks.push(ack_datagram(self.session_id, 0));
        }

        if header.has_flag(FLAG_ACK) && self.conn_state != ConnState::Connected {
            self.conn_state = ConnState::Connected;
            out.connected = true;
        }

        if header.has_flag(FLAG_ACK_REQUEST) {
            let remote_id = header.packet_id;

            if header.has_flag(FLAG_RESEND) && self.recent_remote_ids.contains(&remote_id) {
                log::debug!("resend of packet {:#06x} already seen, dropping", remote_id);
                return Some(out);
            }

            self.recent_remote_ids.push_back(remote_id);
            if self.recent_remote_ids.len() > RECENT_ID_WINDOW {
                self.recent_remote_ids.pop_front();
            }

            out.acks.push(ack_datagram(self.session_id, remote_id));
            if data.len() > HEADER_LEN {
                out.commands = Some(&data[HEADER_LEN..]);
            }
        }

        Some(out)
    }

    /// Wrap a control command in a datagram with a fresh local packet id.
    ///
    /// Returns `None` before the handshake completes; the command is
    /// silently dropped in that case.
    pub fn next_command_datagram(&mut self, command: &ControlCommand) -> Option<Vec<u8>> {
        if self.conn_state != ConnState::Connected {
            return None;
        }
        self.local_packet_id = self.local_packet_id.wrapping_add(1);
        Some(encode_command_datagram(
            self.session_id,
            self.local_packet_id,
            &command.tag,
            &command.payload,
        ))
    }

    /// Close the session and reset all protocol state.
    pub fn close(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.conn_state = ConnState::Closed;
        self.session_id = 0;
        self.local_packet_id = 0;
        self.recent_remote_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::commands;

    /// Build an ack-requesting datagram with the given extras.
    fn ack_request(flags: u8, session_id: u16, packet_id: u16, payload: &[u8]) -> Vec<u8> {
        let len = HEADER_LEN + payload.len();
        let mut b = vec![0u8; len];
        b[0] = ((FLAG_ACK_REQUEST | flags) << 3) | ((len >> 8) as u8 & 0x07);
        b[1] = (len & 0xff) as u8;
        b[2..4].copy_from_slice(&session_id.to_be_bytes());
        b[10..12].copy_from_slice(&packet_id.to_be_bytes());
        b[12..].copy_from_slice(payload);
        b
    }

    fn connected_session(session_id: u16) -> Session {
        let mut s = Session::new();
        s.begin_connect();
        s.handle_datagram(&ack_request(FLAG_ACK, session_id, 0, &[]))
            .unwrap();
        assert_eq!(s.conn_state(), ConnState::Connected);
        s
    }

    #[test]
    fn begin_connect_emits_hello_literal() {
        let mut s = Session::new();
        let hello = s.begin_connect();
        assert_eq!(
            hello,
            [
                0x10, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x26, 0x00, 0x00, 0x01,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00
            ]
        );
        assert_eq!(s.conn_state(), ConnState::Connecting);
    }

    #[test]
    fn handshake_adopts_session_id_and_acks() {
        let mut s = Session::new();
        s.begin_connect();

        // Device assigns session id 0x0123; first ack-requesting datagram
        // has packet id 0.
        let datagram = ack_request(0, 0x0123, 0, &[]);
        let out = s.handle_datagram(&datagram).unwrap();
        assert_eq!(s.session_id(), 0x0123);
        assert_eq!(
            out.acks,
            vec![[0x80, 0x0c, 0x01, 0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]]
        );
        assert!(!out.connected);

        // The device's first Ack concludes the handshake.
        let datagram = ack_request(FLAG_ACK, 0x0123, 1, &[]);
        let out = s.handle_datagram(&datagram).unwrap();
        assert!(out.connected);
        assert_eq!(
            out.acks,
            vec![[0x80, 0x0c, 0x01, 0x23, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]]
        );
    }

    #[test]
    fn hello_flag_is_answered_with_zero_ack() {
        let mut s = Session::new();
        s.begin_connect();
        let hello = [
            0x10, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let out = s.handle_datagram(&hello).unwrap();
        assert_eq!(out.acks, vec![ack_datagram(0, 0)]);
        assert!(out.commands.is_none());
    }

    #[test]
    fn non_ack_request_datagrams_leave_ids_untouched() {
        let mut s = connected_session(0x0123);
        let before = (s.session_id(), s.local_packet_id());

        // An ack with a different session id and a packet id set: neither
        // field may move without the AckRequest flag.
        let mut ack_only = [0u8; 12];
        ack_only[0] = FLAG_ACK << 3;
        ack_only[1] = 12;
        ack_only[2..4].copy_from_slice(&0x9999u16.to_be_bytes());
        ack_only[10..12].copy_from_slice(&0x0042u16.to_be_bytes());
        let out = s.handle_datagram(&ack_only).unwrap();

        assert!(out.acks.is_empty());
        assert_eq!((s.session_id(), s.local_packet_id()), before);
    }

    #[test]
    fn connected_fires_only_once() {
        let mut s = Session::new();
        s.begin_connect();
        let datagram = ack_request(FLAG_ACK, 0x0123, 1, &[]);
        let first = s.handle_datagram(&datagram).unwrap();
        let datagram = ack_request(FLAG_ACK, 0x0123, 2, &[]);
        let second = s.handle_datagram(&datagram).unwrap();
        assert!(first.connected);
        assert!(!second.connected);
    }

    #[test]
    fn resend_of_recent_id_is_dropped() {
        let mut s = connected_session(0x0123);
        let payload = [
            0x00, 0x0c, 0x00, 0x00, b'P', b'r', b'g', b'I', 0x00, 0x00, 0x00, 0x05,
        ];

        let datagram = ack_request(0, 0x0123, 0x0042, &payload);
        let first = s.handle_datagram(&datagram).unwrap();
        assert_eq!(first.acks.len(), 1);
        assert!(first.commands.is_some());

        let datagram = ack_request(FLAG_RESEND, 0x0123, 0x0042, &payload);
        let resend = s.handle_datagram(&datagram).unwrap();
        assert!(resend.acks.is_empty());
        assert!(resend.commands.is_none());
    }

    #[test]
    fn repeat_id_without_resend_flag_is_processed() {
        let mut s = connected_session(0x0123);
        let datagram = ack_request(0, 0x0123, 0x0042, &[]);
        let out = s.handle_datagram(&datagram).unwrap();
        assert_eq!(out.acks.len(), 1);
        let datagram = ack_request(0, 0x0123, 0x0042, &[]);
        let out = s.handle_datagram(&datagram).unwrap();
        assert_eq!(out.acks.len(), 1);
    }

    #[test]
    fn recent_id_window_evicts_oldest() {
        let mut s = connected_session(0x0123);
        for id in 1..=(RECENT_ID_WINDOW as u16 + 1) {
            s.handle_datagram(&ack_request(0, 0x0123, id, &[])).unwrap();
        }
        // Id 2 is still in the window.
        let datagram = ack_request(FLAG_RESEND, 0x0123, 2, &[]);
        let out = s.handle_datagram(&datagram).unwrap();
        assert!(out.acks.is_empty());

        // Id 1 has been evicted, so its resend is treated as new traffic.
        let datagram = ack_request(FLAG_RESEND, 0x0123, 1, &[]);
        let out = s.handle_datagram(&datagram).unwrap();
        assert_eq!(out.acks.len(), 1);
    }

    #[test]
    fn command_region_is_exposed_after_acks() {
        let mut s = connected_session(0x0123);
        let payload = [
            0x00, 0x0a, 0x00, 0x00, b'T', b'r', b'S', b'S', 0x00, 0x02,
        ];
        let datagram = ack_request(0, 0x0123, 3, &payload);
        let out = s.handle_datagram(&datagram).unwrap();
        assert_eq!(out.commands, Some(&payload[..]));
    }

    #[test]
    fn send_before_connected_is_dropped() {
        let mut s = Session::new();
        assert!(s.next_command_datagram(&commands::cut(0)).is_none());
        s.begin_connect();
        assert!(s.next_command_datagram(&commands::cut(0)).is_none());
        assert_eq!(s.local_packet_id(), 0);
    }

    #[test]
    fn command_datagram_pre_increments_packet_id() {
        let mut s = connected_session(0x0123);
        for _ in 0..7 {
            s.next_command_datagram(&commands::cut(0)).unwrap();
        }
        assert_eq!(s.local_packet_id(), 0x0007);

        let datagram = s.next_command_datagram(&commands::cut(0)).unwrap();
        assert_eq!(datagram.len(), 24);
        assert_eq!(
            &datagram[..16],
            &[
                0x08, 0x18, 0x01, 0x23, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00,
                0x0c, 0x00, 0x00
            ]
        );
        assert_eq!(&datagram[16..], b"DCut\x00\x00\x00\x00");
    }

    #[test]
    fn local_packet_id_wraps() {
        let mut s = connected_session(0x0123);
        s.local_packet_id = u16::MAX;
        s.next_command_datagram(&commands::cut(0)).unwrap();
        assert_eq!(s.local_packet_id(), 0);
    }

    #[test]
    fn close_resets_everything() {
        let mut s = connected_session(0x0123);
        s.handle_datagram(&ack_request(0, 0x0123, 9, &[])).unwrap();
        s.close();
        assert_eq!(s.conn_state(), ConnState::Closed);
        assert_eq!(s.session_id(), 0);
        assert_eq!(s.local_packet_id(), 0);
        assert!(s.recent_remote_ids.is_empty());

        // A datagram arriving after close is ignored outright.
        assert!(s.handle_datagram(&ack_request(0, 0x0123, 10, &[])).is_none());
    }

    #[test]
    fn malformed_datagram_is_dropped() {
        let mut s = connected_session(0x0123);
        assert!(s.handle_datagram(&[0x80, 0x0c]).is_none());
        // Declared length disagrees with the datagram size.
        let mut bad = ack_request(0, 0x0123, 11, &[]);
        bad.push(0x00);
        assert!(s.handle_datagram(&bad).is_none());
        assert_eq!(s.conn_state(), ConnState::Connected);
    }
}
