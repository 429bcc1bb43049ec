//! InfraCalendar Core — shared error type and configuration.

pub mod config;
pub mod error;

pub use config::{DataPaths, InfracalConfig};
pub use error::{Error, Result};
