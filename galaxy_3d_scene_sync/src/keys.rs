/// Identity keys for the synchronization engine.
///
/// All keys are plain `Copy` values. Object and material keys are
/// generation-checked slot map keys minted by the scene graph provider, so a
/// key of a removed object can never alias a newer one.

use std::fmt;
use slotmap::new_key_type;

// ===== SLOT MAP KEYS =====

new_key_type! {
    /// Stable identity of a source object.
    ///
    /// Minted by the SceneGraphProvider. Also used as the identity of a
    /// geometry source: instances produced by duplicators share geometry with
    /// the object they duplicate.
    pub struct ObjectKey;

    /// Stable identity of a source material.
    pub struct MaterialKey;
}

// ===== PERSISTENT ID =====

/// Maximum nesting depth of a duplication chain encoded in a persistent id
pub const PERSISTENT_ID_DEPTH: usize = 8;

/// Per-occurrence id supplied by the source graph.
///
/// Identifies one occurrence among those produced by a duplicator, stable
/// across frames. Holds up to `PERSISTENT_ID_DEPTH` components, any `i32`
/// value included.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersistentId {
    /// Unused trailing components stay 0
    ids: [i32; PERSISTENT_ID_DEPTH],
    len: u8,
}

impl PersistentId {
    /// Build a persistent id from its components.
    ///
    /// Components past `PERSISTENT_ID_DEPTH` are dropped with a warning:
    /// occurrences differing only there share one key.
    pub fn new(components: &[i32]) -> Self {
        if components.len() > PERSISTENT_ID_DEPTH {
            crate::engine_warn!("galaxy3d::PersistentId",
                "Persistent id {:?} nested deeper than {} levels, truncated", components, PERSISTENT_ID_DEPTH);
        }
        let len = components.len().min(PERSISTENT_ID_DEPTH);
        let mut ids = [0; PERSISTENT_ID_DEPTH];
        ids[..len].copy_from_slice(&components[..len]);
        Self { ids, len: len as u8 }
    }

    /// Single-level persistent id (the common case of a flat duplicator)
    pub fn single(index: i32) -> Self {
        Self::new(&[index])
    }

    pub fn components(&self) -> &[i32] {
        &self.ids[..usize::from(self.len)]
    }
}

impl fmt::Debug for PersistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistentId{:?}", self.components())
    }
}

// ===== INSTANCE KEY =====

/// Identity of one occurrence produced by a duplicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceKey {
    pub duplicator: ObjectKey,
    pub persistent_id: PersistentId,
}

impl InstanceKey {
    pub fn new(duplicator: ObjectKey, persistent_id: PersistentId) -> Self {
        Self { duplicator, persistent_id }
    }
}

// ===== SYNC KEY =====

/// Key of a sync record: either a plain source object or a duplicator occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncKey {
    Object(ObjectKey),
    Instance(InstanceKey),
}

impl From<ObjectKey> for SyncKey {
    fn from(key: ObjectKey) -> Self {
        SyncKey::Object(key)
    }
}

impl From<InstanceKey> for SyncKey {
    fn from(key: InstanceKey) -> Self {
        SyncKey::Instance(key)
    }
}

// ===== SUBMESH KEY =====

/// One material-index partition of a record's geometry.
///
/// The unit the backend allocates: a submesh for prototypes, an instance
/// handle for instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmeshKey {
    pub owner: SyncKey,
    pub material_index: u32,
}

impl SubmeshKey {
    pub fn new(owner: impl Into<SyncKey>, material_index: u32) -> Self {
        Self { owner: owner.into(), material_index }
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
