//! Source-side collaborator traits and the data they hand over.
//!
//! The host scene graph is read through `SceneGraphProvider`; the engine never
//! holds references into it, only the keys the provider minted.

use bitflags::bitflags;
use glam::Mat4;
use crate::geometry::ExtractedGeometry;
use crate::keys::{InstanceKey, MaterialKey, ObjectKey};
use crate::settings::EnvironmentSettings;

// ===== OBJECT INFO =====

/// Kind of a source object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Renderable object with tessellated geometry
    Geometry,
    /// Light (handled outside the engine)
    Light,
    /// Transform-only object, typically a duplicator
    Empty,
}

/// Snapshot of one source object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub name: String,
    pub kind: ObjectKind,
    pub transform: Mat4,
    /// Material per material index (None = empty slot)
    pub materials: Vec<Option<MaterialKey>>,
    /// The object produces instances of other objects
    pub is_duplicator: bool,
}

bitflags! {
    /// What changed on a source object since the last frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        /// Geometry must be re-extracted (or duplicator output changed)
        const DATA_CHANGED = 1 << 0;
        /// World transform changed
        const TRANSFORM_CHANGED = 1 << 1;
        /// Material slots changed
        const MATERIALS_CHANGED = 1 << 2;
    }
}

/// One occurrence produced by a duplicator
#[derive(Debug, Clone, PartialEq)]
pub struct ProducedInstance {
    pub key: InstanceKey,
    /// Object whose geometry is duplicated
    pub geometry_object: ObjectKey,
    pub transform: Mat4,
    /// Material overrides of the occurrence (None = inherit from the geometry object)
    pub materials: Vec<Option<MaterialKey>>,
}

// ===== MATERIALS =====

/// Shader model of a source material
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderKind {
    Diffuse,
    Emissive,
    Uber,
    /// Node type the backend cannot express
    Unsupported(String),
}

/// Typed material parameter value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
    UInt(u32),
}

/// Description of a source material, as handed to the backend
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub shader: ShaderKind,
    pub params: Vec<(String, ParamValue)>,
}

impl MaterialDesc {
    /// Build a material with no parameters
    pub fn new(name: impl Into<String>, shader: ShaderKind) -> Self {
        Self { name: name.into(), shader, params: Vec::new() }
    }

    /// Add a named parameter (builder style)
    pub fn with_param(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Get a parameter by name
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

// ===== TRAITS =====

/// Produces geometry for a geometry source
pub trait GeometryExtractor {
    /// Tessellate the geometry of `key`.
    ///
    /// Returns None if the object has no geometry (or no longer exists).
    fn extract(&self, key: ObjectKey) -> Option<ExtractedGeometry>;
}

/// Read access to the host scene graph
pub trait SceneGraphProvider: GeometryExtractor {
    /// Every object currently in the scene
    fn objects(&self) -> Vec<ObjectKey>;

    fn is_visible(&self, key: ObjectKey) -> bool;

    fn object(&self, key: ObjectKey) -> Option<ObjectInfo>;

    /// Changes since the last frame (empty for unknown keys)
    fn dirty_flags(&self, key: ObjectKey) -> DirtyFlags;

    /// Current output of a duplicator (empty if `key` is not one)
    fn duplicator_instances(&self, key: ObjectKey) -> Vec<ProducedInstance>;

    fn material(&self, key: MaterialKey) -> Option<MaterialDesc>;

    /// Materials edited since the last frame
    fn updated_materials(&self) -> Vec<MaterialKey>;

    /// Current environment settings, if the scene has any
    fn environment(&self) -> Option<EnvironmentSettings>;

    /// Every visible object
    fn visible_objects(&self) -> Vec<ObjectKey> {
        self.objects()
            .into_iter()
            .filter(|&key| self.is_visible(key))
            .collect()
    }
}
