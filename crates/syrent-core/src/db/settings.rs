//! Settings database operations

use crate::db::Database;
use crate::error::Result;
use crate::types::Settings;
use rusqlite::params;

/// Settings database operations
pub struct SettingsDb;

impl SettingsDb {
    /// Load all settings from database, starting from `base`
    ///
    /// Unknown keys are ignored and unparsable values keep the value from `base`.
    pub fn load(db: &Database, base: Settings) -> Result<Settings> {
        let mut settings = base;

        db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            for row in rows {
                let (key, value) = row?;
                match key.as_str() {
                    "download_dir" => settings.download_dir = expand_home(value),
                    "last_download_dir" => {
                        settings.last_download_dir = Some(value).filter(|s| !s.is_empty());
                    }
                    "last_torrent_dir" => {
                        settings.last_torrent_dir = Some(value).filter(|s| !s.is_empty());
                    }
                    "control_port_first" => {
                        settings.control_port_first =
                            value.parse().unwrap_or(settings.control_port_first);
                    }
                    "control_port_last" => {
                        settings.control_port_last =
                            value.parse().unwrap_or(settings.control_port_last);
                    }
                    "state_dump_interval_secs" => {
                        settings.state_dump_interval_secs =
                            value.parse().unwrap_or(settings.state_dump_interval_secs);
                    }
                    "connect_timeout_ms" => {
                        settings.connect_timeout_ms =
                            value.parse().unwrap_or(settings.connect_timeout_ms);
                    }
                    _ => {}
                }
            }

            Ok(())
        })?;

        Ok(settings)
    }

    /// Save a single setting
    pub fn set(db: &Database, key: &str, value: &str) -> Result<()> {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![key, value],
            )?;
            Ok(())
        })
    }

    /// Save all settings
    pub fn save(db: &Database, settings: &Settings) -> Result<()> {
        Self::set(db, "download_dir", &settings.download_dir)?;
        Self::set(
            db,
            "last_download_dir",
            settings.last_download_dir.as_deref().unwrap_or(""),
        )?;
        Self::set(
            db,
            "last_torrent_dir",
            settings.last_torrent_dir.as_deref().unwrap_or(""),
        )?;
        Self::set(db, "control_port_first", &settings.control_port_first.to_string())?;
        Self::set(db, "control_port_last", &settings.control_port_last.to_string())?;
        Self::set(
            db,
            "state_dump_interval_secs",
            &settings.state_dump_interval_secs.to_string(),
        )?;
        Self::set(db, "connect_timeout_ms", &settings.connect_timeout_ms.to_string())?;
        Ok(())
    }

    /// Get a single setting value
    pub fn get(db: &Database, key: &str) -> Result<Option<String>> {
        db.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            );

            match result {
                Ok(value) => Ok(Some(value)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(value: String) -> String {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    } else if value == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().to_string();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let mut settings = Settings::default();
        settings.last_download_dir = Some("/srv/torrents".to_string());
        settings.control_port_first = 7100;
        settings.control_port_last = 7104;
        SettingsDb::save(&db, &settings).unwrap();

        let loaded = SettingsDb::load(&db, Settings::default()).unwrap();
        assert_eq!(loaded.last_download_dir.as_deref(), Some("/srv/torrents"));
        assert_eq!(loaded.last_torrent_dir, None);
        assert_eq!(loaded.control_ports(), 7100..=7104);
    }

    #[test]
    fn test_unparsable_value_keeps_base() {
        let db = Database::open_in_memory().unwrap();
        SettingsDb::set(&db, "state_dump_interval_secs", "soon").unwrap();

        let loaded = SettingsDb::load(&db, Settings::default()).unwrap();
        assert_eq!(loaded.state_dump_interval_secs, 30);
        assert_eq!(SettingsDb::get(&db, "missing").unwrap(), None);
    }
}
