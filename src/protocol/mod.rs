//! Wire protocol: datagram header, command records, control builders.

pub mod command;
pub mod commands;
pub mod header;

pub use command::{encode_command_datagram, Record, RecordError, RecordWalker};
pub use commands::ControlCommand;
pub use header::{ack_datagram, hello_datagram, Header};
