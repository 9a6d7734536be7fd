//! The synchronized app-data document.

mod model;

pub use model::*;
