//! Snapshot slot store.

mod repository;

pub use repository::SnapshotRepository;
