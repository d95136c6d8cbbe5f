//! Record store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StoreError;
use super::schema;
use super::types::RepairRecord;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str =
    "SELECT id, license_plate, date, photos, notes, drive_folder_id, created_at, updated_at FROM repairs";

/// Persistence for repair records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record without an id, or update the one with `record.id`.
    ///
    /// Returns the record id. Updates bump `updated_at` and keep `created_at`.
    async fn save(&self, record: &RepairRecord) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<RepairRecord>, StoreError>;

    /// All records, most recently updated first.
    async fn list(&self) -> Result<Vec<RepairRecord>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Remember the Drive folder a record was replicated into.
    async fn set_drive_folder(&self, id: i64, folder_id: &str) -> Result<(), StoreError>;
}

/// SQLite implementation of the record store.
pub struct SqliteRecordStore {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        tracing::debug!(path = %path.display(), "Opened record store");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &RepairRecord) -> Result<i64, StoreError> {
        let now = Utc::now().timestamp_millis();
        let photos = serde_json::to_string(&record.photos)?;
        let date = record.date.format(DATE_FORMAT).to_string();

        let conn = self.lock()?;
        match record.id {
            None => {
                conn.execute(
                    "INSERT INTO repairs (license_plate, date, photos, notes, drive_folder_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    rusqlite::params![
                        record.license_plate,
                        date,
                        photos,
                        record.notes,
                        record.drive_folder_id,
                        now
                    ],
                )
                .map_err(StoreError::query)?;
                let id = conn.last_insert_rowid();
                tracing::debug!(id, plate = %record.license_plate, "Inserted repair record");
                Ok(id)
            }
            Some(id) => {
                // updated_at strictly increases even within one millisecond.
                let rows = conn
                    .execute(
                        "UPDATE repairs SET license_plate = ?1, date = ?2, photos = ?3, notes = ?4, updated_at = MAX(?5, updated_at + 1) WHERE id = ?6",
                        rusqlite::params![record.license_plate, date, photos, record.notes, now, id],
                    )
                    .map_err(StoreError::query)?;
                if rows == 0 {
                    return Err(StoreError::NotFound(id));
                }
                tracing::debug!(id, plate = %record.license_plate, "Updated repair record");
                Ok(id)
            }
        }
    }

    async fn get(&self, id: i64) -> Result<Option<RepairRecord>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                read_row,
            )
            .optional()
            .map_err(StoreError::query)?;
        raw.map(RawRecord::into_record).transpose()
    }

    async fn list(&self) -> Result<Vec<RepairRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{} ORDER BY updated_at DESC, id DESC",
                SELECT_COLUMNS
            ))
            .map_err(StoreError::query)?;

        let raws = stmt
            .query_map([], read_row)
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        raws.into_iter().map(RawRecord::into_record).collect()
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute("DELETE FROM repairs WHERE id = ?1", [id])
            .map_err(StoreError::query)?;
        Ok(rows > 0)
    }

    async fn set_drive_folder(&self, id: i64, folder_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE repairs SET drive_folder_id = ?1 WHERE id = ?2",
                rusqlite::params![folder_id, id],
            )
            .map_err(StoreError::query)?;
        if rows == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

/// Column values as stored, before date and JSON decoding.
struct RawRecord {
    id: i64,
    license_plate: String,
    date: String,
    photos: String,
    notes: String,
    drive_folder_id: Option<String>,
    created_at: i64,
    updated_at: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        license_plate: row.get(1)?,
        date: row.get(2)?,
        photos: row.get(3)?,
        notes: row.get(4)?,
        drive_folder_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl RawRecord {
    fn into_record(self) -> Result<RepairRecord, StoreError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|e| {
            StoreError::Query(format!("record {} has invalid date {:?}: {}", self.id, self.date, e))
        })?;
        Ok(RepairRecord {
            id: Some(self.id),
            license_plate: self.license_plate,
            date,
            photos: serde_json::from_str(&self.photos)?,
            notes: self.notes,
            drive_folder_id: self.drive_folder_id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

fn from_millis(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}
