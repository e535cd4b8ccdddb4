//! Change events emitted by the session thread.

use crate::types::{
    DownstreamKeyer, Macro, MacroRunStatus, Source, Tally, Topology, Transition,
    TransitionPosition,
};

/// One state change, delivered in arrival order on the event channel.
///
/// This single sum type is the whole notification surface: every decoded
/// command record maps to exactly one variant, and connection lifecycle
/// changes arrive on the same channel so consumers see one ordered stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
    /// Handshake completed; control commands are accepted from now on.
    Connected,
    /// Session ended, by request or transport failure.
    Closed,
    ProtocolVersionChanged { major: u16, minor: u16 },
    ProductIdChanged { product_id: String },
    Warning { message: String },
    TopologyChanged { topology: Topology },
    InputPropertyChanged { source: Source },
    ProgramChanged { me: u8, source: Source },
    PreviewChanged { me: u8, source: Source },
    TransitionChanged { me: u8, transition: Transition },
    TransitionPositionChanged { me: u8, position: TransitionPosition },
    DskChanged { index: u8, keyer: DownstreamKeyer },
    AuxChanged { index: u8, source: Source },
    MacroPropertyChanged { id: u16, properties: Macro },
    MacroRunStatusChanged { id: u16, status: MacroRunStatus },
    TallyByIndexChanged { tallies: Vec<Tally> },
    TallyBySourceChanged { tallies: Vec<(u16, Tally)> },
    /// A record with a tag the dispatcher does not decode, forwarded
    /// verbatim.
    UnknownCommand { tag: String, bytes: Vec<u8> },
}
