//! Versioning logic for temporal tables.
//!
//! Every write routed through a temporal table's public interface is handled
//! by one of three generated trigger functions. They keep the current layer
//! and the history layer in step: inserts open an interval, updates close the
//! open interval and open a new one, deletes close it.

mod generator;
mod logic;

pub use generator::VersioningGenerator;
pub use logic::{fingerprint, function_name, GeneratedFunction, VersioningLogic, WriteEvent};
