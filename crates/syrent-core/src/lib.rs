//! Syrent Core Library
//!
//! This crate provides the control-plane bridge of the Syrent torrent client:
//! the engine loop and its lifecycle, the action dispatcher, single-instance
//! coordination, persistence, and the UI-side models (ordered torrent list,
//! tri-state file selection). It is UI-agnostic and can be used with any
//! frontend.

pub mod control;
pub mod db;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod metainfo;
pub mod selection;
pub mod service;
pub mod torrent_list;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use control::{find_running_instance, ControlClient, ControlServer, ProbeOutcome};
pub use db::{get_db_path, init_database, Database, SettingsDb, TorrentsDb};
pub use dispatcher::{ActionOutcome, ActionTicket, Dispatcher};
pub use engine::{Engine, SessionEngine};
pub use error::{Error, Result};
pub use selection::{CheckState, FileTree, NodeId, Selection};
pub use service::{EngineCommand, EngineService, LoopHandle, Notifier, UiMessage};
pub use torrent_list::{AvailableActions, ListEntry, TorrentList};
pub use types::*;
pub use utils::{describe_activity, describe_progress, format_bytes, format_speed};
