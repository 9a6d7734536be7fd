//! Repository for the app-data snapshot slots.
//!
//! Every top-level field of the document lives in its own slot so a corrupt
//! or quota-failed write cannot take neighbouring fields with it. Storage
//! errors never leave this boundary: reads substitute the field default,
//! writes drop the failing slot with a warning.

use log::warn;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use fitfolio_core::appdata::AppData;
use fitfolio_core::sync::{FailedSyncRecord, SnapshotStore};

/// Slot names. One per top-level field, plus the reserved failure queue.
mod slots {
    pub const DEFICIT_ENTRIES: &str = "deficit_entries";
    pub const SAVED_WORKOUTS: &str = "saved_workouts";
    pub const WORKOUT_HISTORY: &str = "workout_history";
    pub const WORKOUT_SCHEDULE: &str = "workout_schedule";
    pub const WEIGHT_HISTORY: &str = "weight_history";
    pub const PROFILE: &str = "profile";
    pub const PROFILE_SETUP_COMPLETE: &str = "profile_setup_complete";
    pub const WORKOUT_SETUP_COMPLETE: &str = "workout_setup_complete";
    pub const FAILED_SYNC_QUEUE: &str = "failed_sync_queue";
}

pub struct SnapshotRepository {
    conn: Mutex<Connection>,
}

impl SnapshotRepository {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Mutex::new(crate::db::open_file(path)?),
        })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Mutex::new(crate::db::open_memory()?),
        })
    }

    fn get_slot(&self, slot: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        match conn
            .query_row(
                "SELECT value FROM app_slots WHERE slot = ?1",
                [slot],
                |row| row.get(0),
            )
            .optional()
        {
            Ok(value) => value,
            Err(err) => {
                warn!("[Storage] Failed to read slot '{}': {}", slot, err);
                None
            }
        }
    }

    fn put_slot(&self, slot: &str, value: &str) {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = conn.execute(
            "INSERT INTO app_slots (slot, value) VALUES (?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET value = excluded.value",
            [slot, value],
        ) {
            warn!("[Storage] Failed to write slot '{}': {}", slot, err);
        }
    }

    fn read_slot_or<T: DeserializeOwned>(&self, slot: &str, fallback: T) -> T {
        match self.get_slot(slot) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        "[Storage] Corrupt slot '{}' ({}); substituting default",
                        slot, err
                    );
                    fallback
                }
            },
            None => fallback,
        }
    }

    fn put_json<T: Serialize>(&self, slot: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.put_slot(slot, &raw),
            Err(err) => warn!("[Storage] Failed to serialize slot '{}': {}", slot, err),
        }
    }
}

impl SnapshotStore for SnapshotRepository {
    fn read(&self) -> AppData {
        let defaults = AppData::default();
        let mut data = AppData {
            deficit_entries: self.read_slot_or(slots::DEFICIT_ENTRIES, defaults.deficit_entries),
            saved_workouts: self.read_slot_or(slots::SAVED_WORKOUTS, defaults.saved_workouts),
            workout_history: self.read_slot_or(slots::WORKOUT_HISTORY, defaults.workout_history),
            workout_schedule: self.read_slot_or(slots::WORKOUT_SCHEDULE, defaults.workout_schedule),
            weight_history: self.read_slot_or(slots::WEIGHT_HISTORY, defaults.weight_history),
            profile: self.read_slot_or(slots::PROFILE, defaults.profile),
            profile_setup_complete: self
                .read_slot_or(slots::PROFILE_SETUP_COMPLETE, defaults.profile_setup_complete),
            workout_setup_complete: self
                .read_slot_or(slots::WORKOUT_SETUP_COMPLETE, defaults.workout_setup_complete),
        };
        data.normalize();
        data
    }

    fn write(&self, data: &AppData) {
        self.put_json(slots::DEFICIT_ENTRIES, &data.deficit_entries);
        self.put_json(slots::SAVED_WORKOUTS, &data.saved_workouts);
        self.put_json(slots::WORKOUT_HISTORY, &data.workout_history);
        self.put_json(slots::WORKOUT_SCHEDULE, &data.workout_schedule);
        self.put_json(slots::WEIGHT_HISTORY, &data.weight_history);
        self.put_json(slots::PROFILE, &data.profile);
        self.put_json(slots::PROFILE_SETUP_COMPLETE, &data.profile_setup_complete);
        self.put_json(slots::WORKOUT_SETUP_COMPLETE, &data.workout_setup_complete);
    }

    fn load_failure_queue(&self) -> Vec<FailedSyncRecord> {
        self.read_slot_or(slots::FAILED_SYNC_QUEUE, Vec::new())
    }

    fn store_failure_queue(&self, queue: &[FailedSyncRecord]) {
        self.put_json(slots::FAILED_SYNC_QUEUE, &queue)
    }
}
