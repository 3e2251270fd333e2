/// Per-key synchronization state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use glam::Mat4;
use crate::backend::BackendHandle;
use crate::error::SkipReason;
use crate::geometry::ExtractedGeometry;
use crate::keys::{MaterialKey, ObjectKey, SubmeshKey, SyncKey};

// ===== PUBLIC STATE =====

/// Realization state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Realization {
    Unrealized,
    /// Owns one backend submesh per material index used by its geometry
    Prototype,
    /// Owns one backend instance per submesh of the prototype `of`
    Instance { of: SyncKey },
}

/// Outcome of a realization: the new state, or why the object was skipped
pub type SyncOutcome = std::result::Result<Realization, SkipReason>;

/// What to realize for a key
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDesc {
    /// Geometry source (the object itself, or the object a duplicator copies)
    pub geometry: ObjectKey,
    pub transform: Mat4,
    /// Material per index. On an instance, Some is an override and None
    /// inherits the prototype binding.
    pub materials: Vec<Option<MaterialKey>>,
    pub visible: bool,
}

impl ObjectDesc {
    pub fn new(geometry: ObjectKey) -> Self {
        Self {
            geometry,
            transform: Mat4::IDENTITY,
            materials: Vec::new(),
            visible: true,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_materials(mut self, materials: Vec<Option<MaterialKey>>) -> Self {
        self.materials = materials;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

// ===== INTERNAL RECORDS =====

#[derive(Debug)]
pub(crate) enum RecordState {
    Prototype { submeshes: BTreeMap<u32, BackendHandle> },
    Instance { of: SyncKey, handles: BTreeMap<u32, BackendHandle> },
}

/// Everything the engine knows about one realized key
#[derive(Debug)]
pub(crate) struct SyncRecord {
    pub geometry_key: ObjectKey,
    pub geometry: Arc<ExtractedGeometry>,
    pub transform: Mat4,
    pub material_slots: Vec<Option<MaterialKey>>,
    pub state: RecordState,
    /// Material currently bound to each handle
    pub bound: BTreeMap<u32, MaterialKey>,
    pub hidden: bool,
}

impl SyncRecord {
    /// Backend handle per material index
    pub fn handles(&self) -> &BTreeMap<u32, BackendHandle> {
        match &self.state {
            RecordState::Prototype { submeshes } => submeshes,
            RecordState::Instance { handles, .. } => handles,
        }
    }

    pub fn handle(&self, material_index: u32) -> Option<BackendHandle> {
        self.handles().get(&material_index).copied()
    }

    /// Own material of `material_index` (override on an instance)
    pub fn slot(&self, material_index: u32) -> Option<MaterialKey> {
        self.material_slots.get(material_index as usize).copied().flatten()
    }

    pub fn set_slot(&mut self, material_index: u32, material: Option<MaterialKey>) {
        let index = material_index as usize;
        if self.material_slots.len() <= index {
            if material.is_none() {
                return;
            }
            self.material_slots.resize(index + 1, None);
        }
        self.material_slots[index] = material;
    }

    pub fn prototype_of(&self) -> Option<SyncKey> {
        match self.state {
            RecordState::Prototype { .. } => None,
            RecordState::Instance { of, .. } => Some(of),
        }
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self.state, RecordState::Prototype { .. })
    }

    pub fn realization(&self) -> Realization {
        match self.state {
            RecordState::Prototype { .. } => Realization::Prototype,
            RecordState::Instance { of, .. } => Realization::Instance { of },
        }
    }
}

/// Backend material realized for a source material
#[derive(Debug)]
pub(crate) struct RealizedMaterial {
    pub handle: BackendHandle,
    /// Handles the material is bound to
    pub users: BTreeSet<SubmeshKey>,
}

// ===== DEFERRED RELEASE =====

/// Backend release that failed and waits for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PendingRelease {
    Instance(BackendHandle),
    Submesh(BackendHandle),
    Material(BackendHandle),
}
