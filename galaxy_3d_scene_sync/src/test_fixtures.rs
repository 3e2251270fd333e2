//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex, MutexGuard};
use glam::{Mat4, Vec3};
use crate::backend::mock_backend::MockBackend;
use crate::geometry::GeometryDesc;
use crate::keys::{InstanceKey, MaterialKey, ObjectKey, PersistentId, SyncKey};
use crate::source::{
    MaterialDesc, ProducedInstance, SceneGraphProvider, ShaderKind, SourceObjectDesc, SourceScene,
};
use crate::sync::{ObjectDesc, SyncConfig, SyncEngine, SyncOutcome};

/// One triangle per entry of `face_materials`, all sharing the same three vertices
pub fn triangles(name: &str, face_materials: &[u32]) -> GeometryDesc {
    GeometryDesc {
        name: name.to_string(),
        positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        normals: vec![Vec3::Z; 3],
        uvs: None,
        face_vertex_counts: vec![3; face_materials.len()],
        face_indices: face_materials.iter().flat_map(|_| [0, 1, 2]).collect(),
        face_materials: face_materials.to_vec(),
    }
}

/// Geometry without faces
pub fn empty_geometry(name: &str) -> GeometryDesc {
    triangles(name, &[])
}

pub fn translation(x: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(x, 0.0, 0.0))
}

/// Occurrence `id` of `duplicator`
pub fn occurrence(duplicator: ObjectKey, id: i32) -> InstanceKey {
    InstanceKey::new(duplicator, PersistentId::single(id))
}

/// Occurrence `id` of `duplicator` copying `object`, without overrides
pub fn produced(duplicator: ObjectKey, id: i32, object: ObjectKey, transform: Mat4) -> ProducedInstance {
    ProducedInstance {
        key: occurrence(duplicator, id),
        geometry_object: object,
        transform,
        materials: Vec::new(),
    }
}

/// Source scene, mock backend and an engine verifying every transition
pub struct Fixture {
    pub scene: SourceScene,
    pub backend: Arc<Mutex<MockBackend>>,
    pub engine: SyncEngine,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(SyncConfig { verify_transitions: true, ..SyncConfig::default() })
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let backend = Arc::new(Mutex::new(MockBackend::new()));
        let engine = SyncEngine::new(backend.clone(), config);
        Self { scene: SourceScene::new(), backend, engine }
    }

    pub fn mock(&self) -> MutexGuard<'_, MockBackend> {
        self.backend.lock().unwrap()
    }

    pub fn material(&mut self, name: &str) -> MaterialKey {
        self.scene.add_material(MaterialDesc::new(name, ShaderKind::Diffuse))
    }

    /// Visible mesh with one triangle per entry of `face_materials`
    pub fn mesh(&mut self, name: &str, face_materials: &[u32], slots: &[Option<MaterialKey>]) -> ObjectKey {
        self.scene.add_object(
            SourceObjectDesc::mesh(name, triangles(name, face_materials)).with_materials(slots.to_vec()),
        )
    }

    /// Realize a scene object with its own transform and materials
    pub fn realize_object(&mut self, key: ObjectKey) -> SyncOutcome {
        let info = self.scene.object(key).unwrap();
        let desc = ObjectDesc::new(key)
            .with_transform(info.transform)
            .with_materials(info.materials);
        self.engine.realize(&self.scene, key, &desc).unwrap()
    }

    /// Realize `key` from an explicit description
    pub fn realize_as(&mut self, key: impl Into<SyncKey>, desc: &ObjectDesc) -> SyncOutcome {
        self.engine.realize(&self.scene, key, desc).unwrap()
    }

    /// Duplicator object producing nothing yet
    pub fn duplicator(&mut self, name: &str) -> ObjectKey {
        self.scene.add_object(SourceObjectDesc::empty(name))
    }
}
