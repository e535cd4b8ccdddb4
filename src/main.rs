//! atem-monitor - console monitor for ATEM switchers
//!
//! Connects to a device, then logs every state change the device reports.
//! With `--debug`, raw datagrams are dumped in both directions.

use atem_io::config::{ClientOptions, Config, DEFAULT_PORT};
use atem_io::error::{Error, Result};
use atem_io::{AtemClient, StateEvent};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "atem-monitor", about = "Console monitor for ATEM switchers")]
struct Args {
    /// Device IP address
    #[arg(long)]
    ip: Option<String>,

    /// Device UDP control port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Dump raw datagrams in both directions
    #[arg(long)]
    debug: bool,

    /// Optional TOML configuration file (flags override it)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let (ip, port, mut options) = match &args.config {
        Some(path) => {
            log::info!("Using config: {}", path.display());
            let config = Config::load(path)?;
            (
                args.ip.clone().unwrap_or(config.device.ip),
                config.device.port,
                config.client,
            )
        }
        None => {
            let ip = args.ip.clone().ok_or_else(|| {
                Error::Config("no device address: pass --ip or --config".to_string())
            })?;
            (ip, args.port, ClientOptions::default())
        }
    };
    if args.debug {
        options.debug_datagrams = true;
    }

    let mut client = AtemClient::connect(&ip, port, options)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    let events = client.events();
    while running.load(Ordering::Relaxed) {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => log_event(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    client.close()?;
    Ok(())
}

fn log_event(event: &StateEvent) {
    match event {
        StateEvent::Connected => log::info!("connected."),
        StateEvent::Closed => log::info!("session closed"),
        StateEvent::ProtocolVersionChanged { major, minor } => {
            log::info!("protocol version {}.{}", major, minor)
        }
        StateEvent::ProductIdChanged { product_id } => log::info!("product: {}", product_id),
        StateEvent::Warning { message } => log::warn!("got warning {}", message),
        StateEvent::TopologyChanged { topology } => log::info!(
            "topology: {} ME, {} sources, {} aux, {} dsk",
            topology.mes,
            topology.sources,
            topology.auxs,
            topology.downstream_keyers
        ),
        StateEvent::InputPropertyChanged { source } => log::info!(
            "changed input property {} {} {}",
            source.id,
            source.long_name,
            source.short_name
        ),
        StateEvent::ProgramChanged { me, source } => log::info!(
            "changed program input {} {} {}",
            me,
            source.id,
            source.long_name
        ),
        StateEvent::PreviewChanged { me, source } => log::info!(
            "changed preview input {} {} {}",
            me,
            source.id,
            source.long_name
        ),
        StateEvent::TransitionChanged { me, transition } => {
            log::info!("changed transition {} style {}", me, transition.style)
        }
        StateEvent::TransitionPositionChanged { me, position } => log::info!(
            "changed transition position {} {} {} {:.2}%",
            me,
            position.in_transition,
            position.frames_remaining,
            position.percent()
        ),
        StateEvent::DskChanged { index, keyer } => log::info!(
            "changed downstream keyer {} {} {} {}",
            index,
            keyer.on_air,
            keyer.in_transition,
            keyer.frames_remaining
        ),
        StateEvent::AuxChanged { index, source } => {
            log::info!("changed aux {} source {}", index, source.id)
        }
        StateEvent::MacroPropertyChanged { id, properties } => {
            if properties.is_used {
                log::info!(
                    "changed macro property {} {} {}",
                    id,
                    properties.name,
                    properties.description
                );
            }
        }
        StateEvent::MacroRunStatusChanged { id, status } => log::info!(
            "changed macro run status {} {} {} {}",
            id,
            status.is_running,
            status.is_waiting,
            status.is_looping
        ),
        StateEvent::TallyByIndexChanged { tallies } => {
            log::info!("changed tally by index {:?}", tallies)
        }
        StateEvent::TallyBySourceChanged { tallies } => {
            log::info!("changed tally by source {:?}", tallies)
        }
        StateEvent::UnknownCommand { tag, bytes } => {
            log::trace!("got command {} ({} bytes)", tag, bytes.len())
        }
    }
}
