//! Types module - data structures shared by the engine loop and the foreground
//!
//! These types cross the thread boundary between the two domains, so all of
//! them are plain owned data (`Clone + Send`).

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// Opaque torrent key: the lowercase hex form of the info hash
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TorrentId(String);

impl TorrentId {
    pub fn from_info_hash(hash: &[u8]) -> Self {
        Self(hex::encode(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TorrentId {
    fn from(s: &str) -> Self {
        Self(s.to_lowercase())
    }
}

impl From<String> for TorrentId {
    fn from(s: String) -> Self {
        Self(s.to_lowercase())
    }
}

impl std::fmt::Display for TorrentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Actions the foreground can ask the engine to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Pause,
    Resume,
    Remove,
    Add,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Pause => write!(f, "pause"),
            ActionKind::Resume => write!(f, "resume"),
            ActionKind::Remove => write!(f, "remove"),
            ActionKind::Add => write!(f, "add"),
        }
    }
}

/// Single file in a torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    pub index: usize,
    /// Path relative to the torrent root, one element per component
    pub path: Vec<String>,
    pub length: u64,
}

impl TorrentFileEntry {
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}

/// Everything the engine needs to add a torrent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentDescriptor {
    pub id: TorrentId,
    pub suggested_name: String,
    pub single_file_mode: bool,
    pub files: Vec<TorrentFileEntry>,
    pub announce_list: Vec<Vec<String>>,
    /// Whitelisted file paths, `None` means every file
    pub selected_files: Option<Vec<Vec<String>>>,
    pub download_dir: Option<String>,
    pub comment: Option<String>,
}

impl TorrentDescriptor {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }

    /// Size of the files that will actually be downloaded
    pub fn selected_size(&self) -> u64 {
        match &self.selected_files {
            None => self.total_size(),
            Some(selected) => self
                .files
                .iter()
                .filter(|f| selected.contains(&f.path))
                .map(|f| f.length)
                .sum(),
        }
    }

    /// Restrict the download to `paths`. Ignored in single-file mode.
    pub fn select_files(&mut self, paths: Vec<Vec<String>>) {
        if self.single_file_mode {
            return;
        }
        self.selected_files = Some(paths);
    }
}

/// Snapshot of a torrent published by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TorrentState {
    pub id: TorrentId,
    pub suggested_name: String,
    pub single_file_mode: bool,
    pub paused: bool,
    pub complete: bool,
    pub selected_size: u64,
    pub downloaded_size: u64,
    pub uploaded_size: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub total_peer_count: u32,
    pub downloading_peer_count: u32,
    pub uploading_peer_count: u32,
    pub eta_seconds: Option<u64>,
}

impl TorrentState {
    pub fn progress(&self) -> f64 {
        crate::utils::calculate_progress(self.downloaded_size, self.selected_size)
    }

    pub fn ratio(&self) -> f64 {
        if self.selected_size == 0 {
            return 0.0;
        }
        self.uploaded_size as f64 / self.selected_size as f64
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding the state database
    pub data_dir: PathBuf,
    pub download_dir: String,
    pub last_download_dir: Option<String>,
    pub last_torrent_dir: Option<String>,
    pub control_port_first: u16,
    pub control_port_last: u16,
    pub state_dump_interval_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        let download_dir = dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join("Downloads"))
            .to_string_lossy()
            .to_string();

        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("syrent");

        Self {
            data_dir,
            download_dir,
            last_download_dir: None,
            last_torrent_dir: None,
            control_port_first: 6995,
            control_port_last: 6999,
            state_dump_interval_secs: 30,
            connect_timeout_ms: 1000,
        }
    }
}

impl Settings {
    pub fn control_ports(&self) -> RangeInclusive<u16> {
        self.control_port_first..=self.control_port_last
    }

    pub fn state_dump_interval(&self) -> Duration {
        Duration::from_secs(self.state_dump_interval_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Directory the add dialog should open in
    pub fn suggested_download_dir(&self) -> &str {
        self.last_download_dir
            .as_deref()
            .unwrap_or(&self.download_dir)
    }
}
