//! UDP client driver
//!
//! This module owns the UDP endpoint and runs the session against it.
//!
//! # Thread Model
//!
//! Three named threads cooperate around the socket:
//!
//! 1. **Reader** (`atem-reader`): blocks on `recv` with a poll timeout
//!    (default 1 s) so a close request can preempt a blocked read, and
//!    publishes each datagram to the inbound channel.
//!
//! 2. **Session** (`atem-session`): consumes inbound datagrams and caller
//!    control requests, runs the session machine and the dispatcher, and is
//!    the only writer to the session state and the mirrored switcher state.
//!    Acks are queued before the triggering datagram's commands are
//!    dispatched, so acknowledgement never waits on decoding.
//!
//! 3. **Writer** (`atem-writer`): drains the outbound channel and calls
//!    `send`.
//!
//! Control commands from any application thread are enqueued onto the
//! request channel; they never touch the socket or the session state
//! directly, which keeps all packet id accounting on the session thread.
//!
//! # Lifecycle
//!
//! `connect` opens the endpoint (retrying on failure with a fixed delay),
//! spawns the threads, and sends the hello datagram. The handshake
//! completes asynchronously; wait for [`StateEvent::Connected`] on the
//! event channel before issuing commands. `close` (also run on drop) stops
//! all three threads and emits [`StateEvent::Closed`]. A transport error
//! mid-session closes the same way; reconnecting is the caller's decision.

use crate::config::ClientOptions;
use crate::dispatch::apply_records;
use crate::error::{Error, Result};
use crate::events::StateEvent;
use crate::protocol::commands::{self, ControlCommand};
use crate::session::Session;
use crate::state::SwitcherState;
use crossbeam_channel::{bounded, select, unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Receive buffer size; any protocol datagram fits well under this.
const RECV_BUFFER_LEN: usize = 4096;

/// How long the session and writer threads sleep between shutdown checks
/// when their channels are idle.
const IDLE_TICK: Duration = Duration::from_millis(200);

/// Client for one switcher, usable from any thread.
///
/// Dropping the client closes the session.
pub struct AtemClient {
    requests: Sender<ControlCommand>,
    events: Receiver<StateEvent>,
    state: Arc<Mutex<SwitcherState>>,
    shutdown: Arc<AtomicBool>,
    reader_handle: Option<JoinHandle<()>>,
    session_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl AtemClient {
    /// Open the endpoint and start the session.
    ///
    /// Open failures are retried every `retry_delay_secs` until
    /// `max_connect_attempts` is exhausted (indefinitely when unset).
    /// Returns as soon as the endpoint is open; the handshake completes in
    /// the background and is announced with [`StateEvent::Connected`].
    pub fn connect(ip: &str, port: u16, options: ClientOptions) -> Result<Self> {
        options.validate()?;

        log::info!("Connecting to {}:{}", ip, port);
        let socket = open_endpoint(ip, port, &options)?;

        let (inbound_tx, inbound_rx) = bounded::<Vec<u8>>(64);
        let (outbound_tx, outbound_rx) = bounded::<Vec<u8>>(64);
        let (request_tx, request_rx) = bounded::<ControlCommand>(32);
        let (event_tx, event_rx) = unbounded::<StateEvent>();

        let state = Arc::new(Mutex::new(SwitcherState::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let debug_datagrams = options.debug_datagrams;

        let reader_socket = socket.try_clone()?;
        let reader_shutdown = Arc::clone(&shutdown);
        let reader_handle = thread::Builder::new()
            .name("atem-reader".to_string())
            .spawn(move || {
                reader_loop(reader_socket, reader_shutdown, inbound_tx, debug_datagrams);
            })
            .map_err(Error::Io)?;

        let writer_shutdown = Arc::clone(&shutdown);
        let writer_handle = thread::Builder::new()
            .name("atem-writer".to_string())
            .spawn(move || {
                writer_loop(socket, writer_shutdown, outbound_rx, debug_datagrams);
            })
            .map_err(Error::Io)?;

        let session_state = Arc::clone(&state);
        let session_shutdown = Arc::clone(&shutdown);
        let session_handle = thread::Builder::new()
            .name("atem-session".to_string())
            .spawn(move || {
                session_loop(
                    session_shutdown,
                    inbound_rx,
                    request_rx,
                    outbound_tx,
                    event_tx,
                    session_state,
                );
            })
            .map_err(Error::Io)?;

        Ok(Self {
            requests: request_tx,
            events: event_rx,
            state,
            shutdown,
            reader_handle: Some(reader_handle),
            session_handle: Some(session_handle),
            writer_handle: Some(writer_handle),
        })
    }

    /// Receiver for the ordered stream of state change events.
    pub fn events(&self) -> Receiver<StateEvent> {
        self.events.clone()
    }

    /// Snapshot of the mirrored switcher state.
    pub fn state(&self) -> Result<SwitcherState> {
        self.state
            .lock()
            .map(|s| s.clone())
            .map_err(|_| Error::MutexPoisoned)
    }

    /// Enqueue a raw control command.
    ///
    /// Dropped silently when the handshake has not completed or the client
    /// is closed; the protocol offers no delivery feedback either way.
    pub fn send_command(&self, command: ControlCommand) {
        if self.requests.send(command).is_err() {
            log::debug!("client closed, dropping command");
        }
    }

    /// Perform a cut on the given ME.
    pub fn cut(&self, me: u8) {
        self.send_command(commands::cut(me));
    }

    /// Perform an auto transition on the given ME.
    pub fn auto(&self, me: u8) {
        self.send_command(commands::auto(me));
    }

    /// Route an input onto the program bus.
    pub fn change_program_input(&self, me: u8, source: u16) {
        self.send_command(commands::program_input(me, source));
    }

    /// Route an input onto the preview bus.
    pub fn change_preview_input(&self, me: u8, source: u16) {
        self.send_command(commands::preview_input(me, source));
    }

    /// Change the transition style and/or next-transition layer bits.
    pub fn change_transition(&self, me: u8, style: Option<u8>, next: Option<u8>) {
        self.send_command(commands::transition(me, style, next));
    }

    /// Move the manual transition slider, 0..=10000 hundredths of a percent.
    pub fn change_transition_position(&self, me: u8, position: u16) {
        self.send_command(commands::transition_position(me, position));
    }

    /// Set an upstream keyer on or off air.
    pub fn change_keyer_on_air(&self, me: u8, keyer: u8, on_air: bool) {
        self.send_command(commands::keyer_on_air(me, keyer, on_air));
    }

    /// Route an input to an auxiliary output.
    pub fn change_aux_source(&self, index: u8, source: u16) {
        self.send_command(commands::aux_source(index, source));
    }

    /// Run the auto transition of a downstream keyer.
    pub fn downstream_keyer_auto(&self, keyer: u8) {
        self.send_command(commands::dsk_auto(keyer));
    }

    /// Tie a downstream keyer to the next transition.
    pub fn change_downstream_keyer_tie(&self, keyer: u8, tie: bool) {
        self.send_command(commands::dsk_tie(keyer, tie));
    }

    /// Set the transition rate of a downstream keyer, in frames.
    pub fn change_downstream_keyer_rate(&self, keyer: u8, rate: u8) {
        self.send_command(commands::dsk_rate(keyer, rate));
    }

    /// Set a downstream keyer on or off air.
    pub fn change_downstream_keyer_on_air(&self, keyer: u8, on_air: bool) {
        self.send_command(commands::dsk_on_air(keyer, on_air));
    }

    /// Change super source box parameters (raw 24-byte block).
    pub fn change_supersource_box(&self, params: [u8; 24]) {
        self.send_command(commands::supersource_box(params));
    }

    /// Close the session and stop all threads.
    ///
    /// Idempotent; also joins the threads after a transport failure has
    /// already torn the session down.
    pub fn close(&mut self) -> Result<()> {
        if !self.shutdown.swap(true, Ordering::Relaxed) {
            log::info!("Closing session...");
        }

        if let Some(handle) = self.session_handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        if let Some(handle) = self.reader_handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }
        if let Some(handle) = self.writer_handle.take() {
            handle.join().map_err(|_| Error::ThreadPanic)?;
        }

        log::info!("Session closed");
        Ok(())
    }
}

impl Drop for AtemClient {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Open and connect the UDP endpoint, retrying per the options.
fn open_endpoint(ip: &str, port: u16, options: &ClientOptions) -> Result<UdpSocket> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match try_open(ip, port, options.read_timeout_ms) {
            Ok(socket) => return Ok(socket),
            Err(e) => {
                if let Some(max) = options.max_connect_attempts {
                    if attempt >= max {
                        log::error!("Giving up on {}:{} after {} attempts", ip, port, attempt);
                        return Err(e);
                    }
                }
                log::warn!(
                    "Failed to open endpoint for {}:{}: {}; retrying in {}s",
                    ip,
                    port,
                    e,
                    options.retry_delay_secs
                );
                thread::sleep(Duration::from_secs(options.retry_delay_secs));
            }
        }
    }
}

fn try_open(ip: &str, port: u16, read_timeout_ms: u64) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.connect((ip, port))?;
    socket.set_read_timeout(Some(Duration::from_millis(read_timeout_ms)))?;
    Ok(socket)
}

/// Reader loop - publishes received datagrams to the inbound channel.
fn reader_loop(
    socket: UdpSocket,
    shutdown: Arc<AtomicBool>,
    inbound: Sender<Vec<u8>>,
    debug_datagrams: bool,
) {
    let mut buf = [0u8; RECV_BUFFER_LEN];

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(len) => {
                if debug_datagrams {
                    log::debug!("<< {:02x?}", &buf[..len]);
                }
                if inbound.send(buf[..len].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                log::error!("Receive error: {}", e);
                shutdown.store(true, Ordering::Relaxed);
                break;
            }
        }
    }

    log::debug!("Reader thread exiting");
}

/// Writer loop - drains the outbound channel into the socket.
fn writer_loop(
    socket: UdpSocket,
    shutdown: Arc<AtomicBool>,
    outbound: Receiver<Vec<u8>>,
    debug_datagrams: bool,
) {
    loop {
        match outbound.recv_timeout(IDLE_TICK) {
            Ok(datagram) => {
                if debug_datagrams {
                    log::debug!(">> {:02x?}", &datagram[..]);
                }
                if let Err(e) = socket.send(&datagram) {
                    log::error!("Send error: {}", e);
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::debug!("Writer thread exiting");
}

/// Session loop - the sole mutator of session and switcher state.
fn session_loop(
    shutdown: Arc<AtomicBool>,
    inbound: Receiver<Vec<u8>>,
    requests: Receiver<ControlCommand>,
    outbound: Sender<Vec<u8>>,
    events: Sender<StateEvent>,
    state: Arc<Mutex<SwitcherState>>,
) {
    let mut session = Session::new();

    let hello = session.begin_connect();
    if outbound.send(hello.to_vec()).is_err() {
        return;
    }

    'outer: while !shutdown.load(Ordering::Relaxed) {
        select! {
            recv(inbound) -> msg => {
                let Ok(datagram) = msg else { break };
                let Some(out) = session.handle_datagram(&datagram) else { continue };

                for ack in &out.acks {
                    if outbound.send(ack.to_vec()).is_err() {
                        break 'outer;
                    }
                }

                if out.connected {
                    log::info!("Session established (id {:#06x})", session.session_id());
                    let _ = events.send(StateEvent::Connected);
                }

                if let Some(region) = out.commands {
                    let changes = {
                        let Ok(mut state) = state.lock() else {
                            log::error!("State mutex poisoned, closing session");
                            break;
                        };
                        apply_records(&mut state, region)
                    };
                    for event in changes {
                        let _ = events.send(event);
                    }
                }
            }
            recv(requests) -> req => {
                let Ok(command) = req else { break };
                match session.next_command_datagram(&command) {
                    Some(datagram) => {
                        if outbound.send(datagram).is_err() {
                            break;
                        }
                    }
                    None => {
                        log::debug!(
                            "Not connected, dropping {} command",
                            String::from_utf8_lossy(&command.tag)
                        );
                    }
                }
            }
            default(IDLE_TICK) => {}
        }
    }

    session.close();
    shutdown.store(true, Ordering::Relaxed);
    let _ = events.send(StateEvent::Closed);
    log::debug!("Session thread exiting");
}
