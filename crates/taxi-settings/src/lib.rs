//! # taxi-settings
//!
//! Layered configuration for the taxi channel service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TaxiSettings::default()`]
//! 2. **User file**: `~/.taxi/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TAXI_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<TaxiSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.taxi/settings.json` with env var
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static TaxiSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TaxiSettings) -> std::result::Result<(), TaxiSettings> {
    SETTINGS.set(settings)
}
