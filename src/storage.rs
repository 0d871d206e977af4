//! Persisted playlist store.
//!
//! A single key-value table holds the map of serialized queue records
//! (keyed by playlist id) and the pointer to the last active playlist id.
//! Records survive full page navigations; malformed or missing values read
//! as absent rather than failing.

use std::path::Path;

use log::warn;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};

use crate::playlist::QueueRecord;

const PLAYLIST_DATA_KEY: &str = "playlistPlayerData";
const LAST_PLAYLIST_KEY: &str = "lastPlaylistID";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Opens the store in the platform data directory.
    pub fn open_default() -> Result<Self, StorageError> {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| Path::new(".").to_path_buf())
            .join("vidqueue");
        if !data_dir.exists() {
            if let Err(err) = std::fs::create_dir_all(&data_dir) {
                warn!("Could not create data directory {}: {}", data_dir.display(), err);
            }
        }
        Self::open(&data_dir.join("state.db"))
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StorageError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Loads the persisted record for one playlist id, or `None` when the
    /// store has nothing usable for it.
    pub fn load_queue(&self, playlist_id: &str) -> Option<QueueRecord> {
        let map = self.playlist_map();
        let value = map.get(playlist_id)?;
        match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Ignoring malformed record for playlist {}: {}", playlist_id, err);
                None
            }
        }
    }

    /// Saves one record into the playlist map and marks its playlist id as
    /// the last active one. The whole map is rewritten; redundant writes
    /// are traded for not losing updates across navigations.
    pub fn save_queue(&self, record: &QueueRecord) -> Result<(), StorageError> {
        let mut map = self.playlist_map();
        map.insert(record.playlist_id.clone(), serde_json::to_value(record)?);
        self.set_raw(PLAYLIST_DATA_KEY, &Value::Object(map).to_string())?;
        self.set_raw(LAST_PLAYLIST_KEY, &record.playlist_id)?;
        Ok(())
    }

    /// Id of the playlist most recently saved, if any.
    pub fn last_playlist_id(&self) -> Option<String> {
        self.get_raw(LAST_PLAYLIST_KEY)
    }

    fn playlist_map(&self) -> Map<String, Value> {
        let Some(raw) = self.get_raw(PLAYLIST_DATA_KEY) else {
            return Map::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("Persisted playlist map is malformed, starting over");
                Map::new()
            }
        }
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .ok()
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{PlaylistQueue, Track};

    fn sample_record(playlist_id: &str) -> QueueRecord {
        let mut queue = PlaylistQueue::new(playlist_id, false);
        queue.insert_track(Track::new("a"), false);
        queue.insert_track(Track::new("b"), false);
        queue.to_record()
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let store = StateStore::new_in_memory().expect("in-memory store");
        store.save_queue(&sample_record("PL1")).expect("save");
        let record = store.load_queue("PL1").expect("record present");
        assert_eq!(record.playlist_id, "PL1");
        assert_eq!(record.tracks.len(), 2);
    }

    #[test]
    fn test_missing_playlist_reads_as_absent() {
        let store = StateStore::new_in_memory().expect("in-memory store");
        assert!(store.load_queue("PLnone").is_none());
    }

    #[test]
    fn test_save_updates_last_playlist_pointer() {
        let store = StateStore::new_in_memory().expect("in-memory store");
        assert!(store.last_playlist_id().is_none());
        store.save_queue(&sample_record("PL1")).expect("save");
        store.save_queue(&sample_record("PL2")).expect("save");
        assert_eq!(store.last_playlist_id().as_deref(), Some("PL2"));
    }

    #[test]
    fn test_records_for_different_playlists_coexist() {
        let store = StateStore::new_in_memory().expect("in-memory store");
        store.save_queue(&sample_record("PL1")).expect("save");
        store.save_queue(&sample_record("PL2")).expect("save");
        assert!(store.load_queue("PL1").is_some());
        assert!(store.load_queue("PL2").is_some());
    }

    #[test]
    fn test_malformed_map_reads_as_absent() {
        let store = StateStore::new_in_memory().expect("in-memory store");
        store.set_raw(PLAYLIST_DATA_KEY, "not json at all").expect("raw write");
        assert!(store.load_queue("PL1").is_none());
        // A save after corruption starts a fresh map instead of failing.
        store.save_queue(&sample_record("PL1")).expect("save");
        assert!(store.load_queue("PL1").is_some());
    }

    #[test]
    fn test_malformed_single_record_reads_as_absent() {
        let store = StateStore::new_in_memory().expect("in-memory store");
        store
            .set_raw(PLAYLIST_DATA_KEY, r#"{"PL1": {"unexpected": true}}"#)
            .expect("raw write");
        assert!(store.load_queue("PL1").is_none());
    }
}
