//! Local-first synchronization: engine, failure queue, and the periodic
//! reconciliation driver.

mod driver;
mod engine;
mod queue;
mod retry;
mod scheduler;
mod status;
mod stores;

pub use driver::*;
pub use engine::*;
pub use queue::*;
pub use retry::*;
pub use scheduler::*;
pub use status::*;
pub use stores::*;

#[cfg(test)]
mod tests;
