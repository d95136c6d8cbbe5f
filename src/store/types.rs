//! Repair record type.

use chrono::{DateTime, NaiveDate, Utc};

/// One vehicle repair: the plate, when it happened, and the photos taken.
///
/// `photos` holds base64-encoded JPEGs. `id` is `None` until the record has
/// been saved once.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairRecord {
    pub id: Option<i64>,
    pub license_plate: String,
    pub date: NaiveDate,
    pub photos: Vec<String>,
    pub notes: String,
    pub drive_folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepairRecord {
    /// A record that has not been persisted yet.
    pub fn new(license_plate: String, date: NaiveDate, photos: Vec<String>, notes: String) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            license_plate,
            date,
            photos,
            notes,
            drive_folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record has been replicated to Drive at least once.
    pub fn is_synced(&self) -> bool {
        self.drive_folder_id.is_some()
    }
}
