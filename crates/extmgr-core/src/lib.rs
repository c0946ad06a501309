//! Core library for extmgr - shared types, configuration, and version ordering.
//!
//! Everything in here is pure data and parsing; network and process
//! callouts live in `extmgr-catalog`.

pub mod arch;
pub mod config;
pub mod error;
pub mod release;
pub mod types;
pub mod version;

pub use config::{Config, ConfigGroup};
pub use error::{Error, Result};
pub use types::{logical_name, ExtensionMetadata, ImageEntry, OsRelease};
