//! App-data document model: one aggregate value per user holding all
//! fitness data, always total and default-filled.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Weekday bucket count; index 0 = Sunday.
pub const WEEKDAYS: usize = 7;

/// Schedule label for a day with no planned workout.
pub const REST_DAY_LABEL: &str = "Rest Day";

/// One daily nutrition record. The calendar date string is the natural key;
/// saves are filter-out-then-append, so at most one entry per date survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeficitEntry {
    pub date: String,
    pub calories_in: i32,
    pub calories_out: i32,
    pub protein_grams: Option<i32>,
}

/// An exercise definition assigned to a weekday or captured in history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    pub sets: i32,
    pub reps: i32,
    pub weight: Option<f64>,
}

/// A completed workout with a snapshot of the exercises performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRecord {
    pub timestamp: i64,
    pub day_index: u8,
    pub exercises: Vec<Exercise>,
}

/// A dated weight measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEntry {
    pub date: String,
    pub weight: f64,
    pub timestamp: i64,
}

/// User profile captured during onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub age: i32,
    pub height_cm: f64,
    pub current_weight: f64,
    pub goal_weight: f64,
    pub activity_level: String,
    pub goal: String,
}

/// The single synchronized document containing all of a user's fitness data.
///
/// Absence of a field is never observed past the storage boundary; every
/// field deserializes to its default when missing or corrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppData {
    pub deficit_entries: Vec<DeficitEntry>,
    pub saved_workouts: Vec<Vec<Exercise>>,
    pub workout_history: Vec<WorkoutRecord>,
    pub workout_schedule: Vec<String>,
    pub weight_history: Vec<WeightEntry>,
    pub profile: Option<Profile>,
    pub profile_setup_complete: bool,
    pub workout_setup_complete: bool,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            deficit_entries: Vec::new(),
            saved_workouts: vec![Vec::new(); WEEKDAYS],
            workout_history: Vec::new(),
            workout_schedule: vec![REST_DAY_LABEL.to_string(); WEEKDAYS],
            weight_history: Vec::new(),
            profile: None,
            profile_setup_complete: false,
            workout_setup_complete: false,
        }
    }
}

impl AppData {
    /// Restore the document invariants after deserialization or a caller
    /// transform: both weekday arrays are exactly length 7, deficit entries
    /// are unique per date (last occurrence wins), weight history is sorted
    /// newest-first.
    pub fn normalize(&mut self) {
        self.saved_workouts.resize_with(WEEKDAYS, Vec::new);
        self.workout_schedule
            .resize(WEEKDAYS, REST_DAY_LABEL.to_string());

        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(self.deficit_entries.len());
        for entry in self.deficit_entries.drain(..).rev() {
            if seen.insert(entry.date.clone()) {
                kept.push(entry);
            }
        }
        kept.reverse();
        self.deficit_entries = kept;

        self.weight_history
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }

    /// Record a daily nutrition entry, replacing any existing entry for the
    /// same date.
    pub fn put_deficit_entry(&mut self, entry: DeficitEntry) {
        self.deficit_entries.retain(|e| e.date != entry.date);
        self.deficit_entries.push(entry);
    }

    /// Record a weight measurement, replacing any existing entry for the
    /// same date and keeping the history sorted newest-first.
    pub fn put_weight_entry(&mut self, entry: WeightEntry) {
        self.weight_history.retain(|e| e.date != entry.date);
        self.weight_history.push(entry);
        self.weight_history
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }

    /// Append a completed workout to the history.
    pub fn record_workout(&mut self, record: WorkoutRecord) {
        self.workout_history.push(record);
    }

    /// Replace the exercises assigned to a weekday. Out-of-range indexes are
    /// ignored.
    pub fn set_day_workout(&mut self, day_index: usize, exercises: Vec<Exercise>) {
        if let Some(bucket) = self.saved_workouts.get_mut(day_index) {
            *bucket = exercises;
        }
    }

    /// Replace the planned workout label for a weekday. Out-of-range indexes
    /// are ignored.
    pub fn set_schedule_label(&mut self, day_index: usize, label: impl Into<String>) {
        if let Some(slot) = self.workout_schedule.get_mut(day_index) {
            *slot = label.into();
        }
    }
}
