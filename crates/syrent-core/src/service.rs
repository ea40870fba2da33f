//! Engine service - owns the engine loop thread and bridges it with the UI
//!
//! The engine runs on a dedicated thread driving a single-threaded tokio
//! runtime. The foreground talks to it only through two queues: commands in
//! (see [`Dispatcher`](crate::dispatcher::Dispatcher)) and [`UiMessage`]s out.

use crate::control::ControlServer;
use crate::dispatcher::ActionOutcome;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{ActionKind, Settings, TorrentDescriptor, TorrentId, TorrentState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Commands sent from the UI to the engine loop
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Pause(TorrentId),
    Resume(TorrentId),
    Remove(TorrentId),
    Add(Box<TorrentDescriptor>),
}

impl EngineCommand {
    pub fn kind(&self) -> ActionKind {
        match self {
            EngineCommand::Pause(_) => ActionKind::Pause,
            EngineCommand::Resume(_) => ActionKind::Resume,
            EngineCommand::Remove(_) => ActionKind::Remove,
            EngineCommand::Add(_) => ActionKind::Add,
        }
    }

    pub fn target(&self) -> &TorrentId {
        match self {
            EngineCommand::Pause(id) | EngineCommand::Resume(id) | EngineCommand::Remove(id) => id,
            EngineCommand::Add(descriptor) => &descriptor.id,
        }
    }
}

/// Messages sent from the engine loop to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    /// Startup finished, commands are being processed
    EngineReady,
    TorrentAdded(TorrentState),
    TorrentChanged(TorrentState),
    TorrentRemoved(TorrentId),
    /// Files to offer for adding (another instance or drag and drop)
    TorrentsSuggested(Vec<PathBuf>),
    /// Non-fatal error to show to the user
    Error { description: String, message: String },
}

/// Sending half of the UI message channel
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: async_channel::Sender<UiMessage>,
}

impl Notifier {
    pub fn new(sender: async_channel::Sender<UiMessage>) -> Self {
        Self { sender }
    }

    /// Queue a message for the foreground. Never blocks; returns false once
    /// the foreground has gone away.
    pub fn notify(&self, msg: UiMessage) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Dropping UI message: {}", e);
                false
            }
        }
    }

    pub fn error(&self, description: impl Into<String>, err: &Error) -> bool {
        self.notify(UiMessage::Error {
            description: description.into(),
            message: err.to_string(),
        })
    }
}

/// A command together with the channel its outcome is reported on
pub(crate) struct QueuedCommand {
    pub(crate) command: EngineCommand,
    pub(crate) reply: async_channel::Sender<Result<ActionOutcome>>,
}

/// Cloneable handle for queueing commands onto the engine loop
#[derive(Clone)]
pub struct LoopHandle {
    commands: async_channel::Sender<QueuedCommand>,
    control_addr: SocketAddr,
}

impl LoopHandle {
    pub(crate) fn enqueue(&self, queued: QueuedCommand) -> Result<()> {
        self.commands
            .try_send(queued)
            .map_err(|_| Error::EngineStopped)
    }

    /// Whether the loop has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Address the coordination listener is bound to
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }
}

struct LoopThread {
    shutdown: async_channel::Sender<()>,
    thread: JoinHandle<Result<()>>,
}

/// Lifecycle manager of the engine loop thread
pub struct EngineService {
    handle: LoopHandle,
    thread: Mutex<Option<LoopThread>>,
}

impl EngineService {
    /// Start the engine loop on a dedicated thread.
    ///
    /// Returns once the engine and the coordination listener are up. A failure
    /// to start either one is returned here and the thread is gone.
    pub fn start(
        engine: Arc<dyn Engine>,
        settings: &Settings,
        ui_sender: async_channel::Sender<UiMessage>,
    ) -> Result<Self> {
        let (ready_tx, ready_rx) = async_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = async_channel::bounded::<()>(1);
        let (cmd_tx, cmd_rx) = async_channel::unbounded::<QueuedCommand>();

        let settings = settings.clone();
        let notifier = Notifier::new(ui_sender);

        let thread = std::thread::Builder::new()
            .name("syrent-engine".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| Error::Fatal(format!("failed to create runtime: {}", e)))?;

                runtime.block_on(run_loop(
                    engine,
                    settings,
                    notifier,
                    cmd_rx,
                    shutdown_rx,
                    ready_tx,
                ))
            })?;

        match ready_rx.recv_blocking() {
            Ok(control_addr) => Ok(Self {
                handle: LoopHandle {
                    commands: cmd_tx,
                    control_addr,
                },
                thread: Mutex::new(Some(LoopThread {
                    shutdown: shutdown_tx,
                    thread,
                })),
            }),
            Err(_) => Err(join_loop_thread(thread)
                .err()
                .unwrap_or_else(|| Error::Fatal("engine thread exited during startup".to_string()))),
        }
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Whether the loop thread has exited (after `stop` or a fatal error)
    pub fn is_finished(&self) -> bool {
        match self.thread.lock() {
            Ok(guard) => guard.as_ref().map_or(true, |t| t.thread.is_finished()),
            Err(_) => true,
        }
    }

    /// Shut the loop down and wait for its thread to exit.
    ///
    /// Only the first call performs the shutdown; concurrent callers wait for
    /// it to complete. Returns the error that ended the loop, if any.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self
            .thread
            .lock()
            .map_err(|e| Error::Fatal(format!("engine service poisoned: {}", e)))?;

        let Some(LoopThread { shutdown, thread }) = guard.take() else {
            return Ok(());
        };

        log::info!("Stopping engine service");
        shutdown.close();
        join_loop_thread(thread)
    }
}

impl Drop for EngineService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Engine loop ended with an error: {}", e);
        }
    }
}

fn join_loop_thread(thread: JoinHandle<Result<()>>) -> Result<()> {
    thread
        .join()
        .map_err(|_| Error::Fatal("engine thread panicked".to_string()))?
}

async fn run_loop(
    engine: Arc<dyn Engine>,
    settings: Settings,
    notifier: Notifier,
    commands: async_channel::Receiver<QueuedCommand>,
    shutdown: async_channel::Receiver<()>,
    ready: async_channel::Sender<SocketAddr>,
) -> Result<()> {
    engine.start().await?;

    // The listener only comes up once the engine can take its payloads
    let server = match ControlServer::start(settings.control_ports(), notifier.clone()).await {
        Ok(server) => server,
        Err(e) => {
            if let Err(stop_err) = engine.stop().await {
                log::warn!("Failed to stop engine after startup error: {}", stop_err);
            }
            return Err(e);
        }
    };

    if let Err(e) = engine.load_state().await {
        log::warn!("Failed to load program state: {}", e);
        notifier.error("Failed to load program state", &e);
    }

    let dumps = tokio::spawn(invoke_state_dumps(
        engine.clone(),
        settings.state_dump_interval(),
    ));

    let _ = ready.send(server.local_addr()).await;
    notifier.notify(UiMessage::EngineReady);
    log::info!("Engine loop running");

    let result = process_commands(engine.as_ref(), &notifier, &commands, &shutdown).await;

    log::info!("Engine loop shutting down");
    commands.close();
    // Dropping the reply senders resolves the tickets to `EngineStopped`
    let mut dropped = 0;
    while commands.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        log::debug!("Dropped {} queued command(s)", dropped);
    }

    server.stop().await;
    dumps.abort();
    let _ = dumps.await;

    // State of an engine that failed fatally is not trusted
    if result.is_ok() {
        if let Err(e) = engine.dump_state().await {
            log::warn!("Final state dump failed: {}", e);
        }
    }
    engine.stop().await?;

    result
}

async fn process_commands(
    engine: &dyn Engine,
    notifier: &Notifier,
    commands: &async_channel::Receiver<QueuedCommand>,
    shutdown: &async_channel::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                return Ok(());
            }

            queued = commands.recv() => {
                match queued {
                    Ok(queued) => execute_command(engine, notifier, queued).await?,
                    Err(_) => {
                        log::warn!("Command channel closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Run one command and report its outcome. Only fatal engine errors escape.
async fn execute_command(
    engine: &dyn Engine,
    notifier: &Notifier,
    queued: QueuedCommand,
) -> Result<()> {
    let QueuedCommand { command, reply } = queued;
    let kind = command.kind();
    let target = command.target().clone();

    let result = match command {
        EngineCommand::Pause(id) => engine.pause(&id).await,
        EngineCommand::Resume(id) => engine.resume(&id).await,
        EngineCommand::Remove(id) => engine.remove(&id).await,
        EngineCommand::Add(descriptor) => engine.add(*descriptor).await,
    };

    let outcome = match result {
        Ok(()) => Ok(ActionOutcome::Applied),
        Err(e) if e.is_recoverable() => {
            log::debug!("Ignoring {} of {}: {}", kind, target, e);
            Ok(ActionOutcome::Ignored)
        }
        Err(Error::Fatal(message)) => {
            log::error!("Fatal engine error during {} of {}: {}", kind, target, message);
            let _ = reply.try_send(Err(Error::Fatal(message.clone())));
            return Err(Error::Fatal(message));
        }
        Err(e) => {
            log::warn!("Failed to {} torrent {}: {}", kind, target, e);
            notifier.error(format!("Failed to {} torrent", kind), &e);
            Err(e)
        }
    };

    let _ = reply.try_send(outcome);
    Ok(())
}

async fn invoke_state_dumps(engine: Arc<dyn Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately and state was just loaded
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(e) = engine.dump_state().await {
            log::warn!("Failed to dump state: {}", e);
        }
    }
}
