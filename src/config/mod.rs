//! Configuration and settings management.
//!
//! This module provides the settings tree and its JSON file loading. Defaults
//! cover every field, so a deployment can start from an empty file.

mod settings;

pub use settings::{
    ContentProvider, ContentSettings, EligibilitySettings, HealthSettings, SchedulerSettings,
    Settings, StorageSettings, TransportSettings, WarmupSettings,
};
