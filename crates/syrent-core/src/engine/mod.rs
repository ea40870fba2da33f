//! Engine interface
//!
//! The torrent engine is driven exclusively from the loop thread owned by
//! [`EngineService`](crate::service::EngineService). Implementations publish
//! torrent state changes through the [`Notifier`](crate::service::Notifier)
//! they were built with.

mod session;

pub use session::SessionEngine;

use crate::error::Result;
use crate::types::{TorrentDescriptor, TorrentId};
use async_trait::async_trait;

/// Operations the control loop needs from a torrent engine.
///
/// Actions that do not apply to a torrent's current state must fail with
/// [`Error::InvalidState`](crate::Error::InvalidState); the dispatcher treats
/// that as a no-op. [`Error::Fatal`](crate::Error::Fatal) stops the loop.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Restore torrents from the last state dump
    async fn load_state(&self) -> Result<()>;

    /// Write a state dump
    async fn dump_state(&self) -> Result<()>;

    async fn pause(&self, id: &TorrentId) -> Result<()>;

    async fn resume(&self, id: &TorrentId) -> Result<()>;

    async fn remove(&self, id: &TorrentId) -> Result<()>;

    async fn add(&self, descriptor: TorrentDescriptor) -> Result<()>;
}
