//! Settings module
//!
//! Generic settings trees, the caller-driven differ over two snapshots, and
//! the typed environment section built on them.

mod settings_tree;
mod settings_differ;
mod environment;

pub use settings_tree::{SettingValue, SettingsNode, SettingsTree};
pub use settings_differ::{SettingsDiff, SettingsDiffer};
pub use environment::{
    filter_environment_changes, initial_environment_tree, paths, BackgroundKind,
    BackgroundSettings, BackgroundUpdate, EnvironmentKind, EnvironmentSettings,
    EnvironmentUpdate, IblSettings, IblSource, SunSkyKind, SunSkySettings, TextureResolution,
};
