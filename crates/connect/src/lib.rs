//! Remote record client for the Fitfolio cloud table: one row per user,
//! holding the whole app-data document.

mod client;
mod error;

pub use client::UserRecordClient;
pub use error::{ConnectError, Result};
