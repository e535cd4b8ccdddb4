//! Core data types mirroring the switcher's reported state.
//!
//! Everything here is plain data: populated by the dispatcher from decoded
//! command records, read by applications through [`crate::state::SwitcherState`]
//! snapshots. None of these types touch the wire or the socket.

/// Port type the switcher assigns to auxiliary outputs in the input catalog.
pub const AUX_PORT_TYPE: u8 = 129;

/// First input id of the auxiliary output range. An input catalog entry with
/// id `AUX_SOURCE_ID_BASE + n` describes aux output `n`.
pub const AUX_SOURCE_ID_BASE: u16 = 8001;

/// Connection lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    #[default]
    Closed,
    Connecting,
    Connected,
}

/// One entry of the input catalog.
///
/// Names are reported by the device as fixed-width NUL-padded ASCII fields
/// (20 bytes long name, 4 bytes short name); they are stored here with the
/// padding stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Source {
    pub id: u16,
    pub long_name: String,
    pub short_name: String,
    pub port_type: u8,
}

impl Source {
    /// Placeholder for an input id that has no catalog entry yet.
    ///
    /// Bus records can reference inputs before their `InPr` arrives during
    /// the initial sync; the assignment is still committed with empty names.
    pub fn placeholder(id: u16) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Device topology counts, reported once per session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Topology {
    pub mes: u8,
    pub sources: u8,
    pub color_generators: u8,
    pub auxs: u8,
    pub downstream_keyers: u8,
    pub stingers: u8,
    pub dves: u8,
    pub supersources: u8,
}

/// Transition settings of one mix/effects bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    pub style: u8,
}

/// Live transition progress of one mix/effects bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPosition {
    pub in_transition: bool,
    pub frames_remaining: u8,
    /// Position in hundredths of a percent, 0..=10000.
    pub position: u16,
}

impl TransitionPosition {
    /// Position as a percentage, 0.0..=100.0.
    pub fn percent(&self) -> f32 {
        self.position as f32 / 100.0
    }
}

/// State of one downstream keyer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownstreamKeyer {
    pub on_air: bool,
    pub in_transition: bool,
    pub is_auto_transitioning: bool,
    pub frames_remaining: u8,
}

/// Stored macro slot properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Macro {
    pub is_used: bool,
    pub name: String,
    pub description: String,
}

/// Run status of a macro, reported independently of its properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacroRunStatus {
    pub is_running: bool,
    pub is_waiting: bool,
    pub is_looping: bool,
}

/// Program/preview on-air indicator state for one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub program: bool,
    pub preview: bool,
}

impl Tally {
    /// Decode from the wire flag byte (bit 0 = program, bit 1 = preview).
    pub fn from_flags(flags: u8) -> Self {
        Self {
            program: flags & 0x01 != 0,
            preview: flags & 0x02 != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_flag_decoding() {
        assert_eq!(
            Tally::from_flags(0x03),
            Tally {
                program: true,
                preview: true
            }
        );
        assert_eq!(
            Tally::from_flags(0x01),
            Tally {
                program: true,
                preview: false
            }
        );
        assert_eq!(
            Tally::from_flags(0x02),
            Tally {
                program: false,
                preview: true
            }
        );
        assert_eq!(Tally::from_flags(0x00), Tally::default());
    }

    #[test]
    fn transition_position_percent() {
        let p = TransitionPosition {
            in_transition: true,
            frames_remaining: 10,
            position: 5000,
        };
        assert_eq!(p.percent(), 50.0);
    }
}
