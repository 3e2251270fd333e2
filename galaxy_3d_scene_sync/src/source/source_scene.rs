/// In-memory scene graph.
///
/// `SourceScene` implements `SceneGraphProvider` over slot map arenas. Hosts
/// without a scene graph of their own (tools, tests) build their scene here
/// and call `clear_dirty()` once a frame has been synchronized.

use std::cell::Cell;
use glam::Mat4;
use slotmap::SlotMap;
use crate::geometry::{ExtractedGeometry, GeometryDesc};
use crate::keys::{InstanceKey, MaterialKey, ObjectKey, PersistentId};
use crate::settings::EnvironmentSettings;
use super::scene_graph::{
    DirtyFlags, GeometryExtractor, MaterialDesc, ObjectInfo, ObjectKind,
    ProducedInstance, SceneGraphProvider,
};

// ===== DESCRIPTORS =====

/// Object creation descriptor
#[derive(Debug, Clone)]
pub struct SourceObjectDesc {
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Mat4,
    pub materials: Vec<Option<MaterialKey>>,
    pub geometry: Option<GeometryDesc>,
    pub visible: bool,
}

impl SourceObjectDesc {
    /// Visible geometry object at the origin
    pub fn mesh(name: impl Into<String>, geometry: GeometryDesc) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Geometry,
            transform: Mat4::IDENTITY,
            materials: Vec::new(),
            geometry: Some(geometry),
            visible: true,
        }
    }

    /// Visible empty, typically used as a duplicator
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ObjectKind::Empty,
            transform: Mat4::IDENTITY,
            materials: Vec::new(),
            geometry: None,
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
}

/// One occurrence a duplicator should produce
#[derive(Debug, Clone, PartialEq)]
pub struct DupliDesc {
    pub persistent_id: PersistentId,
    pub object: ObjectKey,
    pub transform: Mat4,
    /// Per-occurrence material overrides (None = inherit)
    pub materials: Vec<Option<MaterialKey>>,
}

impl DupliDesc {
    /// Occurrence without material overrides
    pub fn new(persistent_id: PersistentId, object: ObjectKey, transform: Mat4) -> Self {
        Self { persistent_id, object, transform, materials: Vec::new() }
    }

    pub fn with_materials(mut self, materials: Vec<Option<MaterialKey>>) -> Self {
        self.materials = materials;
        self
    }
}

// ===== SOURCE OBJECT =====

struct SourceObject {
    name: String,
    kind: ObjectKind,
    transform: Mat4,
    materials: Vec<Option<MaterialKey>>,
    geometry: Option<GeometryDesc>,
    visible: bool,
    dirty: DirtyFlags,
    /// Some once the object has been made a duplicator
    duplis: Option<Vec<DupliDesc>>,
}

// ===== SOURCE SCENE =====

/// In-memory `SceneGraphProvider`
#[derive(Default)]
pub struct SourceScene {
    objects: SlotMap<ObjectKey, SourceObject>,
    materials: SlotMap<MaterialKey, MaterialDesc>,
    updated_materials: Vec<MaterialKey>,
    environment: Option<EnvironmentSettings>,
    extractions: Cell<usize>,
}

impl SourceScene {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== OBJECTS =====

    pub fn add_object(&mut self, desc: SourceObjectDesc) -> ObjectKey {
        self.objects.insert(SourceObject {
            name: desc.name,
            kind: desc.kind,
            transform: desc.transform,
            materials: desc.materials,
            geometry: desc.geometry,
            visible: desc.visible,
            dirty: DirtyFlags::empty(),
            duplis: None,
        })
    }

    /// Remove an object. Duplicators referencing it keep their occurrences
    /// until the host updates them.
    pub fn remove_object(&mut self, key: ObjectKey) -> bool {
        self.objects.remove(key).is_some()
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.objects.contains_key(key)
    }

    pub fn set_transform(&mut self, key: ObjectKey, transform: Mat4) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.transform = transform;
                object.dirty |= DirtyFlags::TRANSFORM_CHANGED;
                true
            }
            None => false,
        }
    }

    /// Replace the geometry of an object (marks it data-changed)
    pub fn set_geometry(&mut self, key: ObjectKey, geometry: Option<GeometryDesc>) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.geometry = geometry;
                object.dirty |= DirtyFlags::DATA_CHANGED;
                true
            }
            None => false,
        }
    }

    pub fn set_materials(&mut self, key: ObjectKey, materials: Vec<Option<MaterialKey>>) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.materials = materials;
                object.dirty |= DirtyFlags::MATERIALS_CHANGED;
                true
            }
            None => false,
        }
    }

    pub fn set_visible(&mut self, key: ObjectKey, visible: bool) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Set the occurrences produced by a duplicator (marks it data-changed)
    pub fn set_duplis(&mut self, key: ObjectKey, duplis: Vec<DupliDesc>) -> bool {
        match self.objects.get_mut(key) {
            Some(object) => {
                object.duplis = Some(duplis);
                object.dirty |= DirtyFlags::DATA_CHANGED;
                true
            }
            None => false,
        }
    }

    // ===== MATERIALS =====

    pub fn add_material(&mut self, desc: MaterialDesc) -> MaterialKey {
        self.materials.insert(desc)
    }

    /// Edit a material; it is reported by `updated_materials` until `clear_dirty`
    pub fn update_material(&mut self, key: MaterialKey, desc: MaterialDesc) -> bool {
        match self.materials.get_mut(key) {
            Some(material) => {
                *material = desc;
                if !self.updated_materials.contains(&key) {
                    self.updated_materials.push(key);
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_material(&mut self, key: MaterialKey) -> bool {
        self.updated_materials.retain(|&k| k != key);
        self.materials.remove(key).is_some()
    }

    // ===== ENVIRONMENT =====

    pub fn set_environment(&mut self, environment: Option<EnvironmentSettings>) {
        self.environment = environment;
    }

    pub fn environment_mut(&mut self) -> Option<&mut EnvironmentSettings> {
        self.environment.as_mut()
    }

    // ===== FRAME =====

    /// Forget every change, once the engine has consumed them
    pub fn clear_dirty(&mut self) {
        for object in self.objects.values_mut() {
            object.dirty = DirtyFlags::empty();
        }
        self.updated_materials.clear();
    }

    /// Number of `extract` calls served so far
    pub fn extraction_count(&self) -> usize {
        self.extractions.get()
    }
}

impl GeometryExtractor for SourceScene {
    fn extract(&self, key: ObjectKey) -> Option<ExtractedGeometry> {
        self.extractions.set(self.extractions.get() + 1);
        let desc = self.objects.get(key)?.geometry.clone()?;
        match ExtractedGeometry::from_desc(desc) {
            Ok(geometry) => Some(geometry),
            Err(err) => {
                crate::engine_warn!("galaxy3d::SourceScene",
                    "Rejected geometry of {:?}: {}", key, err);
                None
            }
        }
    }
}

impl SceneGraphProvider for SourceScene {
    fn objects(&self) -> Vec<ObjectKey> {
        self.objects.keys().collect()
    }

    fn is_visible(&self, key: ObjectKey) -> bool {
        self.objects.get(key).is_some_and(|object| object.visible)
    }

    fn object(&self, key: ObjectKey) -> Option<ObjectInfo> {
        self.objects.get(key).map(|object| ObjectInfo {
            name: object.name.clone(),
            kind: object.kind,
            transform: object.transform,
            materials: object.materials.clone(),
            is_duplicator: object.duplis.is_some(),
        })
    }

    fn dirty_flags(&self, key: ObjectKey) -> DirtyFlags {
        self.objects.get(key).map(|object| object.dirty).unwrap_or_default()
    }

    fn duplicator_instances(&self, key: ObjectKey) -> Vec<ProducedInstance> {
        let Some(duplis) = self.objects.get(key).and_then(|object| object.duplis.as_ref()) else {
            return Vec::new();
        };
        duplis
            .iter()
            .filter_map(|dupli| {
                // Occurrences of removed objects are dropped
                if !self.objects.contains_key(dupli.object) {
                    return None;
                }
                Some(ProducedInstance {
                    key: InstanceKey::new(key, dupli.persistent_id),
                    geometry_object: dupli.object,
                    transform: dupli.transform,
                    materials: dupli.materials.clone(),
                })
            })
            .collect()
    }

    fn material(&self, key: MaterialKey) -> Option<MaterialDesc> {
        self.materials.get(key).cloned()
    }

    fn updated_materials(&self) -> Vec<MaterialKey> {
        self.updated_materials.clone()
    }

    fn environment(&self) -> Option<EnvironmentSettings> {
        self.environment.clone()
    }
}

#[cfg(test)]
#[path = "source_scene_tests.rs"]
mod tests;
