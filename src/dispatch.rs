//! Command dispatcher
//!
//! Walks the record chain of one datagram and applies each record to the
//! mirrored state, emitting one [`StateEvent`] per decoded record. Tags
//! outside the decoded set are forwarded verbatim as
//! [`StateEvent::UnknownCommand`].
//!
//! # Failure policy
//!
//! - A record whose declared length or fields do not fit abandons the rest
//!   of the datagram's chain with a debug log. The session stays up.
//! - A record whose bus/keyer/aux index falls outside the topology-derived
//!   bounds is dropped alone; the chain continues.

use crate::events::StateEvent;
use crate::protocol::{Record, RecordWalker};
use crate::state::SwitcherState;
use crate::types::{
    DownstreamKeyer, Macro, MacroRunStatus, Tally, Topology, Transition, TransitionPosition,
};

/// Apply every record in a datagram's command region.
///
/// Returns the change events in on-wire order.
pub fn apply_records(state: &mut SwitcherState, region: &[u8]) -> Vec<StateEvent> {
    let mut events = Vec::new();
    for item in RecordWalker::new(region) {
        match item {
            Ok(record) => match decode_record(state, &record) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(()) => {
                    log::debug!(
                        "malformed {} record ({} payload bytes), abandoning datagram",
                        record.tag_str(),
                        record.payload.len()
                    );
                    break;
                }
            },
            Err(e) => {
                log::debug!("{}, abandoning datagram", e);
                break;
            }
        }
    }
    events
}

/// Decode one record and mutate the state.
///
/// `Ok(None)` means the record was dropped (index out of bounds);
/// `Err(())` means a field ran past the record end.
fn decode_record(state: &mut SwitcherState, record: &Record<'_>) -> Result<Option<StateEvent>, ()> {
    let p = record.payload;
    let event = match &record.tag {
        b"_ver" => {
            let major = u16_at(p, 0)?;
            let minor = u16_at(p, 2)?;
            state.protocol_version = (major, minor);
            StateEvent::ProtocolVersionChanged { major, minor }
        }

        b"_pin" => {
            let product_id = nul_string(field(p, 0, 44)?);
            state.product_id = product_id.clone();
            StateEvent::ProductIdChanged { product_id }
        }

        b"Warn" => {
            let message = nul_string(field(p, 0, 44)?);
            StateEvent::Warning { message }
        }

        b"_top" => {
            let counts = field(p, 0, 8)?;
            let topology = Topology {
                mes: counts[0],
                sources: counts[1],
                color_generators: counts[2],
                auxs: counts[3],
                // Older firmware under-reports the two always-present DSKs.
                downstream_keyers: counts[4] | 0x02,
                stingers: counts[5],
                dves: counts[6],
                supersources: counts[7],
            };
            state.apply_topology(topology);
            StateEvent::TopologyChanged { topology }
        }

        b"InPr" => {
            let id = u16_at(p, 0)?;
            let long_name = nul_string(field(p, 2, 20)?);
            let short_name = nul_string(field(p, 22, 4)?);
            let port_type = byte_at(p, 32)?;
            let source = crate::types::Source {
                id,
                long_name,
                short_name,
                port_type,
            };
            state.put_input(source.clone());
            StateEvent::InputPropertyChanged { source }
        }

        b"MPrp" => {
            let id = u16::from(byte_at(p, 1)?);
            let is_used = byte_at(p, 2)? & 0x01 != 0;
            let name_len = usize::from(u16_at(p, 4)?);
            let desc_len = usize::from(u16_at(p, 6)?);
            let name = nul_string(field(p, 8, name_len)?);
            let description = nul_string(field(p, 8 + name_len, desc_len)?);
            let properties = Macro {
                is_used,
                name,
                description,
            };
            state.macros.insert(id, properties.clone());
            StateEvent::MacroPropertyChanged { id, properties }
        }

        b"MRPr" => {
            let flags = byte_at(p, 0)?;
            let status = MacroRunStatus {
                is_running: flags & 0x01 != 0,
                is_waiting: flags & 0x02 != 0,
                is_looping: byte_at(p, 1)? & 0x01 != 0,
            };
            let id = u16_at(p, 2)?;
            state.macro_run_status.insert(id, status);
            StateEvent::MacroRunStatusChanged { id, status }
        }

        b"PrgI" => {
            let me = byte_at(p, 0)?;
            let source = state.source(u16_at(p, 2)?);
            if !state.set_program(me, source.clone()) {
                return Ok(None);
            }
            StateEvent::ProgramChanged { me, source }
        }

        b"PrvI" => {
            let me = byte_at(p, 0)?;
            let source = state.source(u16_at(p, 2)?);
            if !state.set_preview(me, source.clone()) {
                return Ok(None);
            }
            StateEvent::PreviewChanged { me, source }
        }

        b"TrSS" => {
            let me = byte_at(p, 0)?;
            let transition = Transition {
                style: byte_at(p, 1)?,
            };
            if !state.set_transition(me, transition) {
                return Ok(None);
            }
            StateEvent::TransitionChanged { me, transition }
        }

        b"TrPs" => {
            let me = byte_at(p, 0)?;
            let position = TransitionPosition {
                in_transition: byte_at(p, 1)? & 0x01 != 0,
                frames_remaining: byte_at(p, 2)?,
                position: u16_at(p, 4)?,
            };
            if !state.set_transition_position(me, position) {
                return Ok(None);
            }
            StateEvent::TransitionPositionChanged { me, position }
        }

        b"DskS" => {
            let index = byte_at(p, 0)?;
            let keyer = DownstreamKeyer {
                on_air: byte_at(p, 1)? & 0x01 != 0,
                in_transition: byte_at(p, 2)? & 0x01 != 0,
                is_auto_transitioning: byte_at(p, 3)? & 0x01 != 0,
                frames_remaining: byte_at(p, 4)?,
            };
            if !state.set_downstream_keyer(index, keyer) {
                return Ok(None);
            }
            StateEvent::DskChanged { index, keyer }
        }

        b"AuxS" => {
            let index = byte_at(p, 0)?;
            let source = state.source(u16_at(p, 2)?);
            if !state.set_aux_routing(index, source.clone()) {
                return Ok(None);
            }
            StateEvent::AuxChanged { index, source }
        }

        b"TlIn" => {
            let count = usize::from(u16_at(p, 0)?);
            let flags = field(p, 2, count)?;
            let tallies: Vec<Tally> = flags.iter().map(|&f| Tally::from_flags(f)).collect();
            state.tally_by_index = tallies.clone();
            StateEvent::TallyByIndexChanged { tallies }
        }

        b"TlSr" => {
            let count = usize::from(u16_at(p, 0)?);
            let entries = field(p, 2, count * 3)?;
            let tallies: Vec<(u16, Tally)> = entries
                .chunks_exact(3)
                .map(|c| (u16::from_be_bytes([c[0], c[1]]), Tally::from_flags(c[2])))
                .collect();
            for &(id, tally) in &tallies {
                state.tally_by_source.insert(id, tally);
            }
            StateEvent::TallyBySourceChanged { tallies }
        }

        _ => StateEvent::UnknownCommand {
            tag: record.tag_str(),
            bytes: p.to_vec(),
        },
    };
    Ok(Some(event))
}

fn byte_at(p: &[u8], off: usize) -> Result<u8, ()> {
    p.get(off).copied().ok_or(())
}

fn u16_at(p: &[u8], off: usize) -> Result<u16, ()> {
    let b = p.get(off..off + 2).ok_or(())?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn field(p: &[u8], off: usize, len: usize) -> Result<&[u8], ()> {
    p.get(off..off + len).ok_or(())
}

/// Best-effort string from a fixed-width field: bytes after the first NUL
/// are truncated, anything non-UTF-8 is replaced.
fn nul_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
