//! Single-instance coordination
//!
//! The running instance listens on a loopback port. A new process started
//! with torrent files first tries to reach that listener; if it can, it hands
//! the files over and exits instead of starting a second engine.
//!
//! Wire format: one JSON request line from the client, one JSON reply line
//! from the server, then the connection is closed.

use crate::error::{Error, Result};
use crate::service::{Notifier, UiMessage};
use crate::types::Settings;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const IO_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlRequest {
    SuggestTorrents { paths: Vec<PathBuf> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
}

/// Coordination listener, runs as a task on the engine loop
pub struct ControlServer {
    addr: SocketAddr,
    shutdown: async_channel::Sender<()>,
    task: JoinHandle<()>,
}

impl ControlServer {
    /// Bind the first free port of `ports` and start accepting requests
    pub async fn start(ports: RangeInclusive<u16>, notifier: Notifier) -> Result<Self> {
        let listener = bind_first_free(ports).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = async_channel::bounded(1);

        let task = tokio::spawn(accept_loop(listener, notifier, shutdown_rx));
        log::info!("Control server listening on {}", addr);

        Ok(Self {
            addr,
            shutdown: shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for the listener task to finish
    pub async fn stop(self) {
        self.shutdown.close();
        if let Err(e) = self.task.await {
            log::warn!("Control server task failed: {}", e);
        }
        log::info!("Control server stopped");
    }
}

async fn bind_first_free(ports: RangeInclusive<u16>) -> Result<TcpListener> {
    let range = format!("{}-{}", ports.start(), ports.end());
    let mut last_error = None;
    for port in ports {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                log::debug!("Control port {} unavailable: {}", port, e);
                last_error = Some(e);
            }
        }
    }
    Err(Error::Control(match last_error {
        Some(e) => format!("no free control port in {}: {}", range, e),
        None => format!("empty control port range {}", range),
    }))
}

async fn accept_loop(
    listener: TcpListener,
    notifier: Notifier,
    shutdown: async_channel::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => break,

            accepted = listener.accept() => match accepted {
                // One request at a time: the next connection waits in the backlog
                Ok((stream, peer)) => {
                    if let Err(e) = serve_connection(stream, &notifier).await {
                        log::warn!("Control connection from {} failed: {}", peer, e);
                    }
                }
                Err(e) => log::warn!("Failed to accept control connection: {}", e),
            },
        }
    }
}

async fn serve_connection(mut stream: TcpStream, notifier: &Notifier) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut lines = BufReader::new(reader.take(MAX_REQUEST_BYTES)).lines();

    let line = timeout(IO_TIMEOUT, lines.next_line())
        .await
        .map_err(|_| Error::Control("timed out waiting for a request".to_string()))??;

    // A bare connect without a request is a liveness probe
    let Some(line) = line else {
        return Ok(());
    };

    let ok = match serde_json::from_str::<ControlRequest>(&line) {
        Ok(ControlRequest::SuggestTorrents { paths }) => {
            log::info!("Another instance suggested {} torrent(s)", paths.len());
            notifier.notify(UiMessage::TorrentsSuggested(paths))
        }
        Err(e) => {
            log::warn!("Malformed control request: {}", e);
            false
        }
    };

    let mut reply = serde_json::to_string(&ControlReply { ok })?;
    reply.push('\n');
    timeout(IO_TIMEOUT, writer.write_all(reply.as_bytes()))
        .await
        .map_err(|_| Error::Control("timed out sending the reply".to_string()))??;
    writer.shutdown().await?;
    Ok(())
}

/// Client side of the coordination protocol
pub struct ControlClient {
    stream: TcpStream,
    io_timeout: Duration,
}

impl ControlClient {
    /// `connect_timeout` also bounds the request write and the reply read
    pub async fn connect(addr: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Control(format!("timed out connecting to {}", addr)))??;
        Ok(Self {
            stream,
            io_timeout: connect_timeout,
        })
    }

    /// Send one request and wait for the acknowledgment
    pub async fn execute(mut self, request: &ControlRequest) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let (reader, mut writer) = self.stream.split();
        timeout(self.io_timeout, writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| Error::Control("timed out sending the request".to_string()))??;

        let mut lines = BufReader::new(reader.take(MAX_REQUEST_BYTES)).lines();
        let reply = timeout(self.io_timeout, lines.next_line())
            .await
            .map_err(|_| Error::Control("timed out waiting for the reply".to_string()))??
            .ok_or_else(|| Error::Control("connection closed without a reply".to_string()))?;

        let reply: ControlReply = serde_json::from_str(&reply)?;
        if reply.ok {
            Ok(())
        } else {
            Err(Error::Control("request rejected by the running instance".to_string()))
        }
    }
}

/// Result of looking for an instance that is already running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A running instance acknowledged the files
    Forwarded,
    /// Nobody answered; this process should host the engine
    NoInstance,
}

/// Try each control port in order and hand `paths` to the first instance
/// that acknowledges them. Failures only mean "no instance".
pub async fn probe(
    paths: &[PathBuf],
    ports: RangeInclusive<u16>,
    connect_timeout: Duration,
) -> ProbeOutcome {
    let request = ControlRequest::SuggestTorrents {
        paths: paths.to_vec(),
    };

    for port in ports {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let result = match ControlClient::connect(addr, connect_timeout).await {
            Ok(client) => client.execute(&request).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                log::info!("Forwarded {} file(s) to the instance at {}", paths.len(), addr);
                return ProbeOutcome::Forwarded;
            }
            Err(e) => log::debug!("No instance at {}: {}", addr, e),
        }
    }
    ProbeOutcome::NoInstance
}

/// Blocking probe for use before any runtime exists
pub fn find_running_instance(paths: &[PathBuf], settings: &Settings) -> ProbeOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::warn!("Cannot probe for a running instance: {}", e);
            return ProbeOutcome::NoInstance;
        }
    };
    runtime.block_on(probe(
        paths,
        settings.control_ports(),
        settings.connect_timeout(),
    ))
}
