//! Core traits for strata backends.

mod connection;

pub use connection::*;
