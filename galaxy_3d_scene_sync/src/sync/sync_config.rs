/// Synchronization engine configuration.

/// Tunables of a `SyncEngine`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Check registry invariants after every transition sub-step
    pub verify_transitions: bool,
    /// Remember "no geometry" extractions so zero-polygon objects are not
    /// re-extracted on every frame
    pub cache_empty_geometry: bool,
    /// Hide objects that become invisible instead of de-realizing them.
    /// Prototypes with live instances are always hidden.
    pub hide_invisible_objects: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            verify_transitions: cfg!(debug_assertions),
            cache_empty_geometry: true,
            hide_invisible_objects: true,
        }
    }
}
