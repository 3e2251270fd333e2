//! Environment lighting settings.
//!
//! Typed schema of the environment section, its conversion to a
//! `SettingsTree`, the configuration-aware change filter, and the backend
//! plan derived from a diff.
//!
//! # Relevant leaves
//!
//! ```text
//! enable ─┬─ false → nothing else is looked at
//!         └─ true  → type, gizmo_rotation
//!                    ├─ IBL     → ibl.intensity, ibl.use_ibl_map
//!                    │            ├─ map   → ibl.ibl_map
//!                    │            ├─ color → ibl.color
//!                    │            └─ ibl.maps.override_background
//!                    │                 └─ true → override_background_type
//!                    │                           ├─ image → background_map
//!                    │                           └─ color → background_color
//!                    └─ SUN_SKY → sun_sky.type
//!                                 ├─ analytical → azimuth, altitude
//!                                 ├─ date/time  → latitude, longitude, date, time
//!                                 └─ common sun/sky leaves
//! ```

use super::settings_differ::SettingsDiffer;
use super::settings_tree::{SettingValue, SettingsTree};

// ============================================================================
// PATHS
// ============================================================================

/// Leaf paths of the environment tree
pub mod paths {
    pub const ENABLE: &str = "enable";
    pub const TYPE: &str = "type";
    pub const GIZMO_ROTATION: &str = "gizmo_rotation";

    pub const IBL_COLOR: &str = "ibl.color";
    pub const IBL_INTENSITY: &str = "ibl.intensity";
    pub const IBL_USE_MAP: &str = "ibl.use_ibl_map";
    pub const IBL_MAP: &str = "ibl.ibl_map";
    pub const BACKGROUND_OVERRIDE: &str = "ibl.maps.override_background";
    pub const BACKGROUND_TYPE: &str = "ibl.maps.override_background_type";
    pub const BACKGROUND_MAP: &str = "ibl.maps.background_map";
    pub const BACKGROUND_COLOR: &str = "ibl.maps.background_color";

    pub const SUN_SKY_TYPE: &str = "sun_sky.type";
    pub const AZIMUTH: &str = "sun_sky.azimuth";
    pub const ALTITUDE: &str = "sun_sky.altitude";
    pub const TEXTURE_RESOLUTION: &str = "sun_sky.texture_resolution";

    /// Leaves of the date/time/location sun position
    pub const SUN_SKY_LOCATION: [&str; 10] = [
        "sun_sky.latitude",
        "sun_sky.longitude",
        "sun_sky.date_year",
        "sun_sky.date_month",
        "sun_sky.date_day",
        "sun_sky.time_hours",
        "sun_sky.time_minutes",
        "sun_sky.time_seconds",
        "sun_sky.time_zone",
        "sun_sky.daylight_savings",
    ];

    /// Sun/sky leaves relevant whatever the sun position mode
    pub const SUN_SKY_COMMON: [&str; 10] = [
        "sun_sky.turbidity",
        "sun_sky.intensity",
        "sun_sky.sun_glow",
        "sun_sky.sun_disc",
        "sun_sky.saturation",
        "sun_sky.horizon_height",
        "sun_sky.horizon_blur",
        "sun_sky.filter_color",
        "sun_sky.ground_color",
        "sun_sky.texture_resolution",
    ];
}

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentKind {
    Ibl,
    SunSky,
}

impl EnvironmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentKind::Ibl => "IBL",
            EnvironmentKind::SunSky => "SUN_SKY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundKind {
    Image,
    Color,
}

impl BackgroundKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackgroundKind::Image => "image",
            BackgroundKind::Color => "color",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunSkyKind {
    /// Sun placed by azimuth and altitude
    Analytical,
    /// Sun placed by location, date and time
    DateTime,
}

impl SunSkyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SunSkyKind::Analytical => "analytical_sky",
            SunSkyKind::DateTime => "date_time_location",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureResolution {
    Small,
    Normal,
    High,
}

impl TextureResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            TextureResolution::Small => "small",
            TextureResolution::Normal => "normal",
            TextureResolution::High => "high",
        }
    }

    /// Sun/sky texture buffer edge, in texels
    pub fn buffer_size(self) -> u32 {
        match self {
            TextureResolution::Small => 256,
            TextureResolution::Normal => 1024,
            TextureResolution::High => 4096,
        }
    }

    /// Buffer edge for a resolution name (unknown names get the normal size)
    pub fn buffer_size_for(name: &str) -> u32 {
        match name {
            "small" => 256,
            "high" => 4096,
            _ => 1024,
        }
    }
}

/// Background override of the IBL
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSettings {
    pub override_background: bool,
    pub override_background_type: BackgroundKind,
    pub background_map: String,
    pub background_color: [f32; 3],
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            override_background: false,
            override_background_type: BackgroundKind::Color,
            background_map: String::new(),
            background_color: [0.0; 3],
        }
    }
}

/// Image-based lighting
#[derive(Debug, Clone, PartialEq)]
pub struct IblSettings {
    pub color: [f32; 3],
    pub intensity: f32,
    pub use_ibl_map: bool,
    pub ibl_map: String,
    pub maps: BackgroundSettings,
}

impl Default for IblSettings {
    fn default() -> Self {
        Self {
            color: [0.0; 3],
            intensity: 1.0,
            use_ibl_map: false,
            ibl_map: String::new(),
            maps: BackgroundSettings::default(),
        }
    }
}

/// Analytical sun and sky
#[derive(Debug, Clone, PartialEq)]
pub struct SunSkySettings {
    pub kind: SunSkyKind,
    pub azimuth: f32,
    pub altitude: f32,
    pub latitude: f32,
    pub longitude: f32,
    pub date_year: i64,
    pub date_month: i64,
    pub date_day: i64,
    pub time_hours: i64,
    pub time_minutes: i64,
    pub time_seconds: i64,
    pub time_zone: i64,
    pub daylight_savings: bool,
    pub turbidity: f32,
    pub intensity: f32,
    pub sun_glow: f32,
    pub sun_disc: f32,
    pub saturation: f32,
    pub horizon_height: f32,
    pub horizon_blur: f32,
    pub filter_color: [f32; 3],
    pub ground_color: [f32; 3],
    pub texture_resolution: TextureResolution,
}

impl Default for SunSkySettings {
    fn default() -> Self {
        Self {
            kind: SunSkyKind::Analytical,
            azimuth: 0.0,
            altitude: 0.5,
            latitude: 0.0,
            longitude: 0.0,
            date_year: 2017,
            date_month: 6,
            date_day: 21,
            time_hours: 12,
            time_minutes: 0,
            time_seconds: 0,
            time_zone: 0,
            daylight_savings: false,
            turbidity: 0.2,
            intensity: 1.0,
            sun_glow: 1.0,
            sun_disc: 0.5,
            saturation: 0.5,
            horizon_height: 0.001,
            horizon_blur: 0.1,
            filter_color: [0.0; 3],
            ground_color: [0.4, 0.4, 0.4],
            texture_resolution: TextureResolution::Normal,
        }
    }
}

/// Environment section of the scene settings
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSettings {
    pub enable: bool,
    pub gizmo_rotation: [f32; 3],
    pub kind: EnvironmentKind,
    pub ibl: IblSettings,
    pub sun_sky: SunSkySettings,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            enable: false,
            gizmo_rotation: [0.0; 3],
            kind: EnvironmentKind::Ibl,
            ibl: IblSettings::default(),
            sun_sky: SunSkySettings::default(),
        }
    }
}

impl EnvironmentSettings {
    /// Flatten into a settings tree
    pub fn to_tree(&self) -> SettingsTree {
        let sky = &self.sun_sky;
        SettingsTree::new()
            .with(paths::ENABLE, self.enable)
            .with(paths::TYPE, self.kind.as_str())
            .with(paths::GIZMO_ROTATION, self.gizmo_rotation)
            .with(paths::IBL_COLOR, self.ibl.color)
            .with(paths::IBL_INTENSITY, self.ibl.intensity)
            .with(paths::IBL_USE_MAP, self.ibl.use_ibl_map)
            .with(paths::IBL_MAP, self.ibl.ibl_map.as_str())
            .with(paths::BACKGROUND_OVERRIDE, self.ibl.maps.override_background)
            .with(paths::BACKGROUND_TYPE, self.ibl.maps.override_background_type.as_str())
            .with(paths::BACKGROUND_MAP, self.ibl.maps.background_map.as_str())
            .with(paths::BACKGROUND_COLOR, self.ibl.maps.background_color)
            .with(paths::SUN_SKY_TYPE, sky.kind.as_str())
            .with(paths::AZIMUTH, sky.azimuth)
            .with(paths::ALTITUDE, sky.altitude)
            .with("sun_sky.latitude", sky.latitude)
            .with("sun_sky.longitude", sky.longitude)
            .with("sun_sky.date_year", sky.date_year)
            .with("sun_sky.date_month", sky.date_month)
            .with("sun_sky.date_day", sky.date_day)
            .with("sun_sky.time_hours", sky.time_hours)
            .with("sun_sky.time_minutes", sky.time_minutes)
            .with("sun_sky.time_seconds", sky.time_seconds)
            .with("sun_sky.time_zone", sky.time_zone)
            .with("sun_sky.daylight_savings", sky.daylight_savings)
            .with("sun_sky.turbidity", sky.turbidity)
            .with("sun_sky.intensity", sky.intensity)
            .with("sun_sky.sun_glow", sky.sun_glow)
            .with("sun_sky.sun_disc", sky.sun_disc)
            .with("sun_sky.saturation", sky.saturation)
            .with("sun_sky.horizon_height", sky.horizon_height)
            .with("sun_sky.horizon_blur", sky.horizon_blur)
            .with("sun_sky.filter_color", sky.filter_color)
            .with("sun_sky.ground_color", sky.ground_color)
            .with(paths::TEXTURE_RESOLUTION, sky.texture_resolution.as_str())
    }
}

/// Snapshot the backend starts from: nothing attached
pub fn initial_environment_tree() -> SettingsTree {
    SettingsTree::new()
        .with(paths::ENABLE, false)
        .with(paths::GIZMO_ROTATION, [0.0f32; 3])
        .with(paths::IBL_COLOR, [0.0f32; 3])
        .with(paths::IBL_INTENSITY, 1.0f32)
        .with(paths::IBL_USE_MAP, false)
        .with(paths::BACKGROUND_OVERRIDE, false)
}

// ============================================================================
// FILTER
// ============================================================================

/// Visit only the leaves that affect the render in the new configuration
pub fn filter_environment_changes<'a>(
    old: &'a mut SettingsTree,
    new: &'a SettingsTree,
) -> SettingsDiffer<'a> {
    let mut sync = SettingsDiffer::new(old, new);

    sync.use_new_value(paths::ENABLE);
    if !updated_bool(&sync, paths::ENABLE) {
        return sync;
    }

    sync.use_new_value(paths::TYPE);
    sync.use_new_value(paths::GIZMO_ROTATION);

    if is_ibl(&sync) {
        sync.use_new_value(paths::IBL_INTENSITY);
        sync.use_new_value(paths::IBL_USE_MAP);
        if updated_bool(&sync, paths::IBL_USE_MAP) {
            sync.use_new_value(paths::IBL_MAP);
        } else {
            sync.use_new_value(paths::IBL_COLOR);
        }

        sync.use_new_value(paths::BACKGROUND_OVERRIDE);
        if updated_bool(&sync, paths::BACKGROUND_OVERRIDE) {
            sync.use_new_value(paths::BACKGROUND_TYPE);
            if updated_text(&sync, paths::BACKGROUND_TYPE) == Some(BackgroundKind::Image.as_str()) {
                sync.use_new_value(paths::BACKGROUND_MAP);
            } else {
                sync.use_new_value(paths::BACKGROUND_COLOR);
            }
        }
    } else {
        sync.use_new_value(paths::SUN_SKY_TYPE);
        if updated_text(&sync, paths::SUN_SKY_TYPE) == Some(SunSkyKind::Analytical.as_str()) {
            sync.use_new_value(paths::AZIMUTH);
            sync.use_new_value(paths::ALTITUDE);
        } else {
            for path in paths::SUN_SKY_LOCATION {
                sync.use_new_value(path);
            }
        }
        for path in paths::SUN_SKY_COMMON {
            sync.use_new_value(path);
        }
    }
    sync
}

fn updated_bool(sync: &SettingsDiffer<'_>, path: &str) -> bool {
    sync.updated_value(path).and_then(SettingValue::as_bool).unwrap_or(false)
}

fn updated_text<'s>(sync: &'s SettingsDiffer<'_>, path: &str) -> Option<&'s str> {
    sync.updated_value(path).and_then(SettingValue::as_text)
}

fn updated_float3(sync: &SettingsDiffer<'_>, path: &str) -> [f32; 3] {
    sync.updated_value(path).and_then(SettingValue::as_float3).unwrap_or([0.0; 3])
}

/// A missing type means IBL
fn is_ibl(sync: &SettingsDiffer<'_>) -> bool {
    updated_text(sync, paths::TYPE).map_or(true, |kind| kind == EnvironmentKind::Ibl.as_str())
}

// ============================================================================
// BACKEND PLAN
// ============================================================================

/// Source of a rebuilt IBL
#[derive(Debug, Clone, PartialEq)]
pub enum IblSource {
    Map(String),
    Color([f32; 3]),
}

/// What to do with the background override
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundUpdate {
    Unchanged,
    Disable,
    /// Re-enable the existing override
    Enable,
    Image(String),
    Color([f32; 3]),
}

/// Environment changes the host applies to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentUpdate {
    pub detach_ibl: bool,
    pub detach_sun_sky: bool,
    pub attach_ibl: bool,
    pub attach_sun_sky: bool,
    pub rebuild_ibl: Option<IblSource>,
    pub ibl_intensity: Option<f32>,
    pub rotation: Option<[f32; 3]>,
    pub background: BackgroundUpdate,
    /// New sun/sky buffer edge, when the buffer must be (re)created
    pub sun_sky_buffer_size: Option<u32>,
    /// Sun/sky leaves that changed, with their new values
    pub sun_sky_changes: Vec<(String, SettingValue)>,
}

impl Default for EnvironmentUpdate {
    fn default() -> Self {
        Self {
            detach_ibl: false,
            detach_sun_sky: false,
            attach_ibl: false,
            attach_sun_sky: false,
            rebuild_ibl: None,
            ibl_intensity: None,
            rotation: None,
            background: BackgroundUpdate::Unchanged,
            sun_sky_buffer_size: None,
            sun_sky_changes: Vec::new(),
        }
    }
}

impl EnvironmentUpdate {
    /// Derive the backend plan from a filtered, not yet committed, diff
    pub fn from_diff(sync: &SettingsDiffer<'_>) -> Self {
        let mut update = Self::default();

        let enabled = updated_bool(sync, paths::ENABLE);
        let type_changed = sync.updated(paths::TYPE);
        let ibl = is_ibl(sync);

        if sync.updated(paths::ENABLE) || type_changed {
            if enabled || type_changed {
                if ibl {
                    update.attach_ibl = true;
                    update.detach_sun_sky = true;
                } else {
                    update.attach_sun_sky = true;
                    update.detach_ibl = true;
                }
            } else {
                update.detach_ibl = true;
                update.detach_sun_sky = true;
            }
        }

        if !enabled {
            return update;
        }

        if update.attach_sun_sky || sync.updated(paths::TEXTURE_RESOLUTION) {
            let resolution = updated_text(sync, paths::TEXTURE_RESOLUTION).unwrap_or("normal");
            update.sun_sky_buffer_size = Some(TextureResolution::buffer_size_for(resolution));
        }

        if !ibl {
            for path in sync.diff().changed_paths.iter().filter(|p| p.starts_with("sun_sky.")) {
                if let Some(value) = sync.updated_value(path) {
                    update.sun_sky_changes.push((path.clone(), value.clone()));
                }
            }
            return update;
        }

        let use_map = updated_bool(sync, paths::IBL_USE_MAP);
        let use_map_changed = sync.updated(paths::IBL_USE_MAP);
        if sync.updated(paths::IBL_MAP) || (use_map_changed && use_map) {
            let map = updated_text(sync, paths::IBL_MAP).unwrap_or_default().to_string();
            update.rebuild_ibl = Some(IblSource::Map(map));
            update.attach_ibl = true;
        }
        if sync.updated(paths::IBL_COLOR) || (use_map_changed && !use_map) {
            update.rebuild_ibl = Some(IblSource::Color(updated_float3(sync, paths::IBL_COLOR)));
            update.attach_ibl = true;
        }

        update.ibl_intensity = sync.updated_value(paths::IBL_INTENSITY).and_then(SettingValue::as_float);
        update.rotation = Some(updated_float3(sync, paths::GIZMO_ROTATION));

        let override_background = updated_bool(sync, paths::BACKGROUND_OVERRIDE);
        let source_changed = sync.updated(paths::BACKGROUND_TYPE)
            || sync.updated(paths::BACKGROUND_MAP)
            || sync.updated(paths::BACKGROUND_COLOR);
        update.background = if sync.updated(paths::BACKGROUND_OVERRIDE) || source_changed {
            if !override_background {
                BackgroundUpdate::Disable
            } else if source_changed {
                if updated_text(sync, paths::BACKGROUND_TYPE) == Some(BackgroundKind::Image.as_str()) {
                    let map = updated_text(sync, paths::BACKGROUND_MAP).unwrap_or_default().to_string();
                    BackgroundUpdate::Image(map)
                } else {
                    BackgroundUpdate::Color(updated_float3(sync, paths::BACKGROUND_COLOR))
                }
            } else {
                BackgroundUpdate::Enable
            }
        } else if update.attach_ibl && override_background {
            BackgroundUpdate::Enable
        } else {
            BackgroundUpdate::Unchanged
        };

        update
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
