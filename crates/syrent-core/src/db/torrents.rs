//! Torrent state dump operations

use crate::db::Database;
use crate::error::Result;
use crate::types::{TorrentDescriptor, TorrentId};
use rusqlite::params;
use rusqlite::types::Type;

/// Persisted form of a torrent known to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentRecord {
    pub descriptor: TorrentDescriptor,
    pub paused: bool,
    pub downloaded_size: u64,
    pub uploaded_size: u64,
    pub added_at: String,
}

impl TorrentRecord {
    pub fn id(&self) -> &TorrentId {
        &self.descriptor.id
    }
}

/// Torrent database operations
pub struct TorrentsDb;

impl TorrentsDb {
    /// Replace the whole dump with `records`, atomically
    pub fn replace_all(db: &Database, records: &[TorrentRecord]) -> Result<()> {
        let dumped_at = chrono::Utc::now().to_rfc3339();
        let encoded = records
            .iter()
            .map(|r| serde_json::to_string(&r.descriptor).map(|json| (r, json)))
            .collect::<serde_json::Result<Vec<_>>>()?;

        db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM torrents", [])?;

            for (record, descriptor) in &encoded {
                tx.execute(
                    r#"
                    INSERT INTO torrents
                    (info_hash, name, descriptor, paused, downloaded_size, uploaded_size,
                     added_at, dumped_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                    params![
                        record.id().as_str(),
                        record.descriptor.suggested_name,
                        descriptor,
                        record.paused,
                        record.downloaded_size as i64,
                        record.uploaded_size as i64,
                        record.added_at,
                        dumped_at,
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Load every dumped torrent, ordered by name
    pub fn load_all(db: &Database) -> Result<Vec<TorrentRecord>> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT descriptor, paused, downloaded_size, uploaded_size, added_at
                FROM torrents
                ORDER BY name, added_at
                "#,
            )?;

            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TorrentRecord> {
    let descriptor_json: String = row.get(0)?;
    let descriptor = serde_json::from_str(&descriptor_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    Ok(TorrentRecord {
        descriptor,
        paused: row.get(1)?,
        downloaded_size: row.get::<_, i64>(2)? as u64,
        uploaded_size: row.get::<_, i64>(3)? as u64,
        added_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TorrentFileEntry;

    fn record(hash: &str, name: &str) -> TorrentRecord {
        TorrentRecord {
            descriptor: TorrentDescriptor {
                id: TorrentId::from(hash),
                suggested_name: name.to_string(),
                single_file_mode: true,
                files: vec![TorrentFileEntry {
                    index: 0,
                    path: vec![name.to_string()],
                    length: 42,
                }],
                announce_list: vec![vec!["http://tracker.example/announce".to_string()]],
                selected_files: None,
                download_dir: Some("/tmp".to_string()),
                comment: None,
            },
            paused: false,
            downloaded_size: 7,
            uploaded_size: 3,
            added_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_replace_all_overwrites_previous_dump() {
        let db = Database::open_in_memory().unwrap();
        TorrentsDb::replace_all(&db, &[record("aa", "b.iso"), record("bb", "a.iso")]).unwrap();
        assert_eq!(TorrentsDb::load_all(&db).unwrap().len(), 2);

        let mut paused = record("cc", "c.iso");
        paused.paused = true;
        TorrentsDb::replace_all(&db, &[paused.clone()]).unwrap();

        let loaded = TorrentsDb::load_all(&db).unwrap();
        assert_eq!(loaded, vec![paused]);
    }

    #[test]
    fn test_load_all_orders_by_name() {
        let db = Database::open_in_memory().unwrap();
        TorrentsDb::replace_all(&db, &[record("aa", "zeta"), record("bb", "alpha")]).unwrap();

        let names: Vec<_> = TorrentsDb::load_all(&db)
            .unwrap()
            .into_iter()
            .map(|r| r.descriptor.suggested_name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_corrupt_descriptor_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO torrents (info_hash, name, descriptor, added_at, dumped_at)
                 VALUES ('aa', 'x', 'not json', 'now', 'now')",
                [],
            )
        })
        .unwrap();

        assert!(TorrentsDb::load_all(&db).is_err());
    }
}
