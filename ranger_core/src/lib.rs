//! Site connector core: incremental pulls of events and observations from
//! a conservation-data site into the hub, credential checks and the
//! permission report.

pub mod actions;
pub mod config;
pub mod directory;
pub mod error;
pub mod hub;
pub mod models;
pub mod o11y;
pub mod site;
pub mod state;
pub mod time;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
