//! Source module
//!
//! Read side of the synchronization: the collaborator traits the engine pulls
//! scene data through, and an in-memory scene graph implementing them.

mod scene_graph;
mod source_scene;

pub use scene_graph::{
    DirtyFlags, GeometryExtractor, MaterialDesc, ObjectInfo, ObjectKind, ParamValue,
    ProducedInstance, SceneGraphProvider, ShaderKind,
};
pub use source_scene::{DupliDesc, SourceObjectDesc, SourceScene};
