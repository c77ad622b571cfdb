// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `sbn-router`: loads a peer table and a settings file, brings up the configured transport,
//! and runs the bridge until told to stop.

mod config;

use clap::Parser;
use config::RouterSettings;
use sbn::engine::{CommandChannel, Engine, OperatorCommand, PeerConnection};
use sbn::event::LogEventSink;
use sbn::local_bus::InMemoryBus;
use sbn::peer_table::PeerTable;
use sbn::remap::{DefaultPolicy, RemapTable};
use sbn::transport::udp::UdpTransport;
use sbn::transport::Transport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bridge per-processor publish-subscribe buses into one logical network bus.
#[derive(Parser, Debug)]
#[command(name = "sbn-router", version, about)]
struct Cli {
    /// Path to the peer/host table (line-oriented, comma-separated).
    #[arg(long, value_name = "FILE")]
    peer_table: PathBuf,

    /// Path to the TOML settings file.
    #[arg(long, value_name = "FILE")]
    settings: PathBuf,

    /// Log level for the tracing subscriber (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// How often the scheduler loop ticks, in milliseconds.
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    // bridge the `log` crate's records (emitted by the sbn library) into tracing subscribers.
    tracing_log::LogTracer::init().expect("LogTracer should only be installed once");
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = run(&cli) {
        tracing::error!("sbn-router exiting: {err}");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] config::RouterConfigError),
    #[error("failed to read peer table {path}: {source}")]
    PeerTableRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Engine(#[from] sbn::Error),
}

fn run(cli: &Cli) -> Result<(), RunError> {
    let settings = RouterSettings::from_file(&cli.settings)?;

    let table_text = std::fs::read_to_string(&cli.peer_table).map_err(|source| RunError::PeerTableRead {
        path: cli.peer_table.display().to_string(),
        source,
    })?;
    let table = PeerTable::load(&table_text, settings.local_spacecraft_id, settings.local_processor_id);
    tracing::info!(
        hosts = table.hosts.len(),
        peers = table.peers.len(),
        "peer table loaded"
    );

    let mut transport = UdpTransport::new();
    let host_row = sbn::config::ConfigRow {
        row_index: 0,
        fields: table
            .hosts
            .first()
            .map(|h| h.raw_fields.clone())
            .unwrap_or_default(),
    };
    let (mut host_block, host_validity) = transport.load_entry(&host_row)?;
    if host_validity == sbn::transport::Validity::Invalid {
        return Err(RunError::Engine(sbn::Error::Fatal(
            "local host entry is invalid or missing from the peer table".to_string(),
        )));
    }
    transport.init_host(&mut host_block)?;

    let mut engine = Engine::new(
        settings.local_processor_id,
        settings.time_width(),
        host_block,
        Duration::from_millis(cli.tick_ms),
    );

    for peer_record in &table.peers {
        let row = sbn::config::ConfigRow {
            row_index: 0,
            fields: peer_record.raw_fields.clone(),
        };
        let (mut peer_block, validity) = transport.load_entry(&row)?;
        if validity == sbn::transport::Validity::Invalid {
            tracing::warn!(peer = %peer_record.name, "dropping peer with invalid transport entry");
            continue;
        }
        transport.init_peer(&mut peer_block)?;

        let remap = RemapTable::build(Vec::new(), DefaultPolicy::PassThrough);
        engine.add_peer(PeerConnection::new(
            peer_record.clone(),
            peer_block,
            remap,
            settings.intervals.to_intervals(),
        ));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .expect("failed to install Ctrl-C handler");
    }

    let commands = CommandChannel::new(16);
    let mut bus = InMemoryBus::new();
    let mut sink = LogEventSink;
    let tick_interval = Duration::from_millis(cli.tick_ms);

    tracing::info!("sbn-router session starting");
    while !shutdown.load(Ordering::SeqCst) {
        for command in commands.drain() {
            if command == OperatorCommand::Shutdown {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            engine.handle_command(command, &mut transport)?;
        }
        engine.run_once(tick_interval, &mut transport, &mut bus, &mut sink)?;
        std::thread::sleep(tick_interval);
    }
    tracing::info!("sbn-router session stopped");

    Ok(())
}
