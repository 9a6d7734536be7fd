//! SQLite-backed Local Snapshot Store: one slot per top-level app-data
//! field plus a reserved slot for the failure queue.

mod db;
pub mod snapshot;

pub use snapshot::SnapshotRepository;
