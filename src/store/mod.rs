//! Local repair record store.
//!
//! Records are saved here first; Drive replication is best-effort on top.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{RecordStore, SqliteRecordStore};
pub use error::StoreError;
pub use types::RepairRecord;
