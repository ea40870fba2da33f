//! In-process session engine
//!
//! Keeps the torrent table, enforces the pause/resume state rules and persists
//! the table to SQLite. Peer and piece transfer are not part of this crate.

use super::Engine;
use crate::db::{Database, TorrentRecord, TorrentsDb};
use crate::error::{Error, Result};
use crate::service::{Notifier, UiMessage};
use crate::types::{TorrentDescriptor, TorrentId, TorrentState};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

pub struct SessionEngine {
    db: Database,
    notifier: Notifier,
    torrents: Mutex<BTreeMap<TorrentId, TorrentRecord>>,
    running: AtomicBool,
}

impl SessionEngine {
    pub fn new(db: Database, notifier: Notifier) -> Self {
        Self {
            db,
            notifier,
            torrents: Mutex::new(BTreeMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Current state of every torrent, ordered by id
    pub fn snapshot(&self) -> Result<Vec<TorrentState>> {
        Ok(self.torrents()?.values().map(record_state).collect())
    }

    fn torrents(&self) -> Result<MutexGuard<'_, BTreeMap<TorrentId, TorrentRecord>>> {
        self.torrents
            .lock()
            .map_err(|e| Error::Fatal(format!("torrent table poisoned: {}", e)))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::EngineStopped)
        }
    }

    fn set_paused(&self, id: &TorrentId, paused: bool) -> Result<()> {
        self.ensure_running()?;
        let state = {
            let mut torrents = self.torrents()?;
            let record = torrents
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;
            if record.paused == paused {
                return Err(Error::InvalidState(if paused {
                    "torrent is already paused".to_string()
                } else {
                    "torrent is not paused".to_string()
                }));
            }
            record.paused = paused;
            record_state(record)
        };

        log::info!(
            "Torrent {} {}",
            state.suggested_name,
            if paused { "paused" } else { "resumed" }
        );
        self.notifier.notify(UiMessage::TorrentChanged(state));
        Ok(())
    }
}

#[async_trait]
impl Engine for SessionEngine {
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Engine("engine is already running".to_string()));
        }
        log::info!("Session engine started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            log::info!("Session engine stopped");
        }
        Ok(())
    }

    async fn load_state(&self) -> Result<()> {
        let records =
            TorrentsDb::load_all(&self.db).map_err(|e| Error::StateLoad(e.to_string()))?;

        let restored: Vec<TorrentState> = {
            let mut torrents = self.torrents()?;
            records
                .into_iter()
                .map(|record| {
                    let state = record_state(&record);
                    torrents.insert(record.id().clone(), record);
                    state
                })
                .collect()
        };

        log::info!("Restored {} torrent(s) from the state dump", restored.len());
        for state in restored {
            self.notifier.notify(UiMessage::TorrentAdded(state));
        }
        Ok(())
    }

    async fn dump_state(&self) -> Result<()> {
        let records: Vec<TorrentRecord> = self.torrents()?.values().cloned().collect();
        TorrentsDb::replace_all(&self.db, &records)?;
        log::debug!("Dumped state of {} torrent(s)", records.len());
        Ok(())
    }

    async fn pause(&self, id: &TorrentId) -> Result<()> {
        self.set_paused(id, true)
    }

    async fn resume(&self, id: &TorrentId) -> Result<()> {
        self.set_paused(id, false)
    }

    async fn remove(&self, id: &TorrentId) -> Result<()> {
        self.ensure_running()?;
        let record = self
            .torrents()?
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        log::info!("Torrent {} removed", record.descriptor.suggested_name);
        self.notifier.notify(UiMessage::TorrentRemoved(id.clone()));
        Ok(())
    }

    async fn add(&self, descriptor: TorrentDescriptor) -> Result<()> {
        self.ensure_running()?;
        let state = {
            let mut torrents = self.torrents()?;
            if torrents.contains_key(&descriptor.id) {
                return Err(Error::InvalidState("this torrent is already added".to_string()));
            }
            let record = TorrentRecord {
                descriptor,
                paused: false,
                downloaded_size: 0,
                uploaded_size: 0,
                added_at: chrono::Utc::now().to_rfc3339(),
            };
            let state = record_state(&record);
            torrents.insert(record.id().clone(), record);
            state
        };

        log::info!("Torrent {} added", state.suggested_name);
        self.notifier.notify(UiMessage::TorrentAdded(state));
        Ok(())
    }
}

fn record_state(record: &TorrentRecord) -> TorrentState {
    let selected_size = record.descriptor.selected_size();
    TorrentState {
        id: record.id().clone(),
        suggested_name: record.descriptor.suggested_name.clone(),
        single_file_mode: record.descriptor.single_file_mode,
        paused: record.paused,
        complete: record.downloaded_size >= selected_size,
        selected_size,
        downloaded_size: record.downloaded_size,
        uploaded_size: record.uploaded_size,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TorrentFileEntry;

    fn descriptor(hash: &str, name: &str) -> TorrentDescriptor {
        TorrentDescriptor {
            id: TorrentId::from(hash),
            suggested_name: name.to_string(),
            single_file_mode: false,
            files: vec![
                TorrentFileEntry {
                    index: 0,
                    path: vec!["a.bin".to_string()],
                    length: 100,
                },
                TorrentFileEntry {
                    index: 1,
                    path: vec!["b.bin".to_string()],
                    length: 50,
                },
            ],
            announce_list: Vec::new(),
            selected_files: Some(vec![vec!["b.bin".to_string()]]),
            download_dir: None,
            comment: None,
        }
    }

    fn engine() -> (SessionEngine, async_channel::Receiver<UiMessage>) {
        let (tx, rx) = async_channel::unbounded();
        let db = Database::open_in_memory().unwrap();
        (SessionEngine::new(db, Notifier::new(tx)), rx)
    }

    #[tokio::test]
    async fn test_pause_resume_rules() {
        let (engine, rx) = engine();
        engine.start().await.unwrap();
        engine.add(descriptor("aa", "one")).await.unwrap();
        let id = TorrentId::from("aa");

        match rx.try_recv().unwrap() {
            UiMessage::TorrentAdded(state) => {
                assert_eq!(state.selected_size, 50);
                assert!(!state.paused);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        assert!(matches!(engine.resume(&id).await, Err(Error::InvalidState(_))));
        engine.pause(&id).await.unwrap();
        assert!(matches!(engine.pause(&id).await, Err(Error::InvalidState(_))));
        engine.resume(&id).await.unwrap();

        assert!(matches!(
            engine.remove(&TorrentId::from("bb")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.add(descriptor("aa", "again")).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_actions_require_running_engine() {
        let (engine, _rx) = engine();
        assert!(matches!(
            engine.add(descriptor("aa", "one")).await,
            Err(Error::EngineStopped)
        ));
        engine.start().await.unwrap();
        assert!(engine.start().await.is_err());
        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dump_and_restore() {
        let (tx, rx) = async_channel::unbounded();
        let db = Database::open_in_memory().unwrap();

        let first = SessionEngine::new(db.clone(), Notifier::new(tx.clone()));
        first.start().await.unwrap();
        first.add(descriptor("aa", "one")).await.unwrap();
        first.add(descriptor("bb", "two")).await.unwrap();
        first.pause(&TorrentId::from("bb")).await.unwrap();
        first.dump_state().await.unwrap();
        first.stop().await.unwrap();
        while rx.try_recv().is_ok() {}

        let second = SessionEngine::new(db, Notifier::new(tx));
        second.start().await.unwrap();
        second.load_state().await.unwrap();

        let restored = second.snapshot().unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored[1].paused);
        assert_eq!(rx.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_dump_fails_to_load() {
        let (engine, _rx) = engine();
        engine
            .db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO torrents (info_hash, name, descriptor, added_at, dumped_at)
                     VALUES ('aa', 'x', '{', 'now', 'now')",
                    [],
                )
            })
            .unwrap();

        engine.start().await.unwrap();
        assert!(matches!(engine.load_state().await, Err(Error::StateLoad(_))));
        assert!(engine.snapshot().unwrap().is_empty());
    }
}
