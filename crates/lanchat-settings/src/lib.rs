//! # lanchat-settings
//!
//! Configuration with layered sources, lowest priority first:
//! 1. **Compiled defaults**: [`ChatSettings::default()`]
//! 2. **Settings file**: `~/.lanchat/settings.json`, deep-merged over defaults
//! 3. **Environment**: `LANCHAT_*` overrides
//!
//! CLI flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::{ChatSettings, LoggingSettings, ServerSettings};
