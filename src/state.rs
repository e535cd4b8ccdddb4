//! Mirrored switcher state
//!
//! A [`SwitcherState`] mirrors everything the device has reported for the
//! current session. It is pure in-memory data: the session thread is the
//! only writer (via the dispatcher), and other threads read snapshots
//! through the shared `Arc<Mutex<SwitcherState>>` handed out by the client.
//!
//! The per-ME and per-keyer vectors are sized exactly once per session when
//! the topology record arrives. Writes through an index outside those
//! bounds are dropped with a debug log rather than panicking; the device
//! sends topology before any bus state, so in practice this only fires on
//! corrupt traffic.

use std::collections::HashMap;

use crate::types::{
    DownstreamKeyer, Macro, MacroRunStatus, Source, Tally, Topology, Transition,
    TransitionPosition, AUX_SOURCE_ID_BASE,
};

/// Everything the device has reported for the current session.
#[derive(Debug, Clone, Default)]
pub struct SwitcherState {
    /// Protocol version from `_ver` (major, minor).
    pub protocol_version: (u16, u16),
    /// Product name from `_pin`.
    pub product_id: String,
    pub topology: Topology,

    /// Input catalog, keyed by input id. Grows monotonically; entries may
    /// be replaced but never removed.
    pub inputs: HashMap<u16, Source>,

    /// Program bus selection, one slot per ME.
    pub program: Vec<Source>,
    /// Preview bus selection, one slot per ME.
    pub preview: Vec<Source>,
    pub transition: Vec<Transition>,
    pub transition_position: Vec<TransitionPosition>,
    pub downstream_keyers: Vec<DownstreamKeyer>,

    /// Catalog of auxiliary outputs, keyed by aux index.
    pub aux_outputs: HashMap<u16, Source>,
    /// Input currently routed to each aux output, keyed by aux index.
    pub aux_routing: HashMap<u16, Source>,

    pub macros: HashMap<u16, Macro>,
    pub macro_run_status: HashMap<u16, MacroRunStatus>,

    pub tally_by_index: Vec<Tally>,
    pub tally_by_source: HashMap<u16, Tally>,
}

impl SwitcherState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the topology and size every topology-derived collection.
    ///
    /// Existing bus state is reset; the device reports topology exactly
    /// once per session, before any bus records.
    pub fn apply_topology(&mut self, topology: Topology) {
        let mes = usize::from(topology.mes);
        self.topology = topology;
        self.program = vec![Source::default(); mes];
        self.preview = vec![Source::default(); mes];
        self.transition = vec![Transition::default(); mes];
        self.transition_position = vec![TransitionPosition::default(); mes];
        self.downstream_keyers =
            vec![DownstreamKeyer::default(); usize::from(topology.downstream_keyers)];
    }

    /// Look up an input by id, or a placeholder if it is not yet cataloged.
    pub fn source(&self, id: u16) -> Source {
        self.inputs
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Source::placeholder(id))
    }

    /// Add or replace an input catalog entry. Aux outputs are additionally
    /// indexed into the aux catalog under their aux number.
    pub fn put_input(&mut self, source: Source) {
        if let Some(aux) = source.aux_index() {
            self.aux_outputs.insert(aux, source.clone());
        }
        self.inputs.insert(source.id, source);
    }

    pub fn set_program(&mut self, me: u8, source: Source) -> bool {
        Self::set_slot(&mut self.program, me, source, "program")
    }

    pub fn set_preview(&mut self, me: u8, source: Source) -> bool {
        Self::set_slot(&mut self.preview, me, source, "preview")
    }

    pub fn set_transition(&mut self, me: u8, transition: Transition) -> bool {
        Self::set_slot(&mut self.transition, me, transition, "transition")
    }

    pub fn set_transition_position(&mut self, me: u8, position: TransitionPosition) -> bool {
        Self::set_slot(
            &mut self.transition_position,
            me,
            position,
            "transition position",
        )
    }

    pub fn set_downstream_keyer(&mut self, index: u8, keyer: DownstreamKeyer) -> bool {
        Self::set_slot(&mut self.downstream_keyers, index, keyer, "downstream keyer")
    }

    /// Record the input routed to an aux output. Fails if the index is
    /// outside the topology's aux count.
    pub fn set_aux_routing(&mut self, index: u8, source: Source) -> bool {
        if index >= self.topology.auxs {
            log::debug!(
                "aux index {} out of range ({} aux outputs)",
                index,
                self.topology.auxs
            );
            return false;
        }
        self.aux_routing.insert(u16::from(index), source);
        true
    }

    fn set_slot<T>(slots: &mut [T], index: u8, value: T, what: &str) -> bool {
        match slots.get_mut(usize::from(index)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => {
                log::debug!("{} index {} out of range ({} slots)", what, index, slots.len());
                false
            }
        }
    }
}

impl Source {
    /// Aux output number if this catalog entry describes an aux output.
    pub fn aux_index(&self) -> Option<u16> {
        if self.port_type == crate::types::AUX_PORT_TYPE && self.id >= AUX_SOURCE_ID_BASE {
            Some(self.id - AUX_SOURCE_ID_BASE)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(mes: u8, dsks: u8) -> Topology {
        Topology {
            mes,
            downstream_keyers: dsks,
            ..Topology::default()
        }
    }

    #[test]
    fn topology_sizes_collections() {
        let mut state = SwitcherState::new();
        state.apply_topology(topology(2, 3));
        assert_eq!(state.program.len(), 2);
        assert_eq!(state.preview.len(), 2);
        assert_eq!(state.transition.len(), 2);
        assert_eq!(state.transition_position.len(), 2);
        assert_eq!(state.downstream_keyers.len(), 3);
    }

    #[test]
    fn unknown_source_is_placeholder() {
        let state = SwitcherState::new();
        let s = state.source(5);
        assert_eq!(s.id, 5);
        assert!(s.long_name.is_empty());
        assert!(s.short_name.is_empty());
    }

    #[test]
    fn out_of_range_writes_are_dropped() {
        let mut state = SwitcherState::new();
        state.apply_topology(topology(1, 2));
        assert!(state.set_program(0, Source::placeholder(1)));
        assert!(!state.set_program(1, Source::placeholder(1)));
        assert!(!state.set_downstream_keyer(2, DownstreamKeyer::default()));
        assert!(!state.set_aux_routing(0, Source::placeholder(8001)));
    }

    #[test]
    fn aux_inputs_are_cataloged() {
        let mut state = SwitcherState::new();
        state.put_input(Source {
            id: 8002,
            long_name: "Auxiliary 2".into(),
            short_name: "AUX2".into(),
            port_type: crate::types::AUX_PORT_TYPE,
        });
        assert_eq!(state.aux_outputs.get(&1).map(|s| s.id), Some(8002));
        assert!(state.inputs.contains_key(&8002));
    }

    #[test]
    fn camera_inputs_are_not_aux_cataloged() {
        let mut state = SwitcherState::new();
        state.put_input(Source {
            id: 1,
            long_name: "Camera 1".into(),
            short_name: "CAM1".into(),
            port_type: 0,
        });
        assert!(state.aux_outputs.is_empty());
    }
}
