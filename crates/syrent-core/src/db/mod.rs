//! Database module - SQLite persistence layer

mod connection;
mod settings;
mod torrents;

pub use connection::{get_db_path, init_database, Database};
pub use settings::SettingsDb;
pub use torrents::{TorrentRecord, TorrentsDb};
