//! Syrent - headless frontend for the Syrent torrent client
//!
//! Started with torrent files while another instance is running, the files
//! are handed to that instance and the process exits. Otherwise this process
//! hosts the engine and reads commands from stdin.

mod console;
mod foreground;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use syrent_core::{
    find_running_instance, init_database, Dispatcher, EngineService, ProbeOutcome,
    SessionEngine, Settings, SettingsDb,
};

use foreground::Foreground;

/// Syrent torrent client
#[derive(Parser, Debug)]
#[command(name = "syrent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Show debug messages
    #[arg(long)]
    debug: bool,

    /// First port of the local control port range
    #[arg(long)]
    port: Option<u16>,

    /// Directory for the state database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Torrent files to open
    filenames: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("syrent: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut base = Settings::default();
    if let Some(data_dir) = args.data_dir {
        base.data_dir = data_dir;
    }

    let db = init_database(&base).context("Failed to open the state database")?;
    let mut settings = SettingsDb::load(&db, base).context("Failed to load settings")?;
    if let Some(port) = args.port {
        let width = settings
            .control_port_last
            .saturating_sub(settings.control_port_first);
        settings.control_port_first = port;
        settings.control_port_last = port.saturating_add(width);
    }

    let cwd = std::env::current_dir().context("Failed to resolve the working directory")?;
    let paths: Vec<PathBuf> = args.filenames.iter().map(|p| cwd.join(p)).collect();

    if !paths.is_empty() && find_running_instance(&paths, &settings) == ProbeOutcome::Forwarded {
        log::info!("Handed {} file(s) to the running instance", paths.len());
        return Ok(());
    }

    log::info!("Starting Syrent v{}", env!("CARGO_PKG_VERSION"));

    let (ui_tx, ui_rx) = async_channel::unbounded();
    let engine = Arc::new(SessionEngine::new(
        db.clone(),
        syrent_core::Notifier::new(ui_tx.clone()),
    ));
    let service =
        EngineService::start(engine, &settings, ui_tx).context("Failed to start the engine")?;

    let dispatcher = Dispatcher::new(service.handle());
    let mut foreground = Foreground::new(dispatcher, db, settings);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create the foreground runtime")?;
    runtime.block_on(foreground.run(ui_rx, paths));
    // A blocked stdin read would keep the runtime alive on drop
    runtime.shutdown_background();

    service.stop().context("Engine loop failed")?;
    log::info!("Syrent stopped");
    Ok(())
}
