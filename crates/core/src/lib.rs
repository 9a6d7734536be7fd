//! Fitfolio core: the synchronized app-data document and the local-first
//! sync engine that mirrors it between on-device storage and the cloud.

pub mod appdata;
pub mod sync;
