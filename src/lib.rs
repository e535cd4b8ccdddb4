//! atem-io - Client library for the ATEM switcher UDP control protocol
//!
//! This library connects to a broadcast video mixer, performs the UDP
//! handshake, maintains the reliable-delivery session, mirrors the device
//! state reported by the command stream (topology, inputs, buses,
//! transitions, keyers, auxiliaries, macros, tallies), and sends typed
//! control commands back.
//!
//! ## Usage
//!
//! ```no_run
//! use atem_io::{AtemClient, ClientOptions, StateEvent};
//!
//! let client = AtemClient::connect("192.168.10.240", 9910, ClientOptions::default())?;
//! for event in client.events() {
//!     match event {
//!         StateEvent::Connected => client.cut(0),
//!         StateEvent::ProgramChanged { me, source } => {
//!             println!("ME {} program: {}", me, source.long_name);
//!         }
//!         _ => {}
//!     }
//! }
//! # Ok::<(), atem_io::Error>(())
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use client::AtemClient;
pub use config::{ClientOptions, Config};
pub use error::{Error, Result};
pub use events::StateEvent;
pub use state::SwitcherState;
pub use types::{ConnState, Source, Topology};
