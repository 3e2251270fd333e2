/// Mock render backend for unit tests (no native renderer required)
///
/// Keeps live tables of every submesh, instance and material it handed out,
/// records each successful call, and rejects operations on dangling handles
/// the way a native renderer would crash on them. Calls can be made to fail
/// with `fail_next` and `fail_calls`.

use glam::Mat4;
use slotmap::SlotMap;
use crate::engine_bail;
use crate::error::Result;
use crate::geometry::SubmeshGeometry;
use crate::source::MaterialDesc;
use super::render_backend::{BackendHandle, RenderBackend};

// ============================================================================
// Recorded calls
// ============================================================================

/// Kind of a backend call, used for counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateSubmesh,
    RemoveSubmesh,
    CreateInstance,
    RemoveInstance,
    UpdateTransform,
    SetVisibility,
    CreateMaterial,
    RemoveMaterial,
    BindMaterial,
    UnbindMaterial,
}

/// One successful backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateSubmesh { handle: BackendHandle, material_index: u32, face_count: usize },
    RemoveSubmesh(BackendHandle),
    CreateInstance { handle: BackendHandle, of: BackendHandle },
    RemoveInstance(BackendHandle),
    UpdateTransform(BackendHandle),
    SetVisibility(BackendHandle, bool),
    CreateMaterial { handle: BackendHandle, name: String },
    RemoveMaterial(BackendHandle),
    BindMaterial { shape: BackendHandle, material: BackendHandle },
    UnbindMaterial(BackendHandle),
}

impl BackendCall {
    pub fn kind(&self) -> CallKind {
        match self {
            BackendCall::CreateSubmesh { .. } => CallKind::CreateSubmesh,
            BackendCall::RemoveSubmesh(_) => CallKind::RemoveSubmesh,
            BackendCall::CreateInstance { .. } => CallKind::CreateInstance,
            BackendCall::RemoveInstance(_) => CallKind::RemoveInstance,
            BackendCall::UpdateTransform(_) => CallKind::UpdateTransform,
            BackendCall::SetVisibility(..) => CallKind::SetVisibility,
            BackendCall::CreateMaterial { .. } => CallKind::CreateMaterial,
            BackendCall::RemoveMaterial(_) => CallKind::RemoveMaterial,
            BackendCall::BindMaterial { .. } => CallKind::BindMaterial,
            BackendCall::UnbindMaterial(_) => CallKind::UnbindMaterial,
        }
    }
}

// ============================================================================
// Mock resources
// ============================================================================

#[derive(Debug)]
pub struct MockShape {
    /// Source submesh for instances, None for submeshes
    pub of: Option<BackendHandle>,
    pub material_index: u32,
    pub transform: Mat4,
    pub material: Option<BackendHandle>,
    pub visible: bool,
}

#[derive(Debug)]
pub enum MockResource {
    Shape(MockShape),
    Material { name: String },
}

// ============================================================================
// Mock backend
// ============================================================================

#[derive(Default)]
pub struct MockBackend {
    resources: SlotMap<BackendHandle, MockResource>,
    calls: Vec<BackendCall>,
    failure: Option<InjectedFailure>,
}

/// Calls of `kind` to let through, then to fail
struct InjectedFailure {
    kind: CallKind,
    skip: usize,
    remaining: usize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `kind` fail without side effects
    pub fn fail_next(&mut self, kind: CallKind) {
        self.fail_calls(kind, 0, 1);
    }

    /// Let `skip` calls of `kind` through, then fail the `count` following ones
    pub fn fail_calls(&mut self, kind: CallKind, skip: usize, count: usize) {
        self.failure = (count > 0).then_some(InjectedFailure { kind, skip, remaining: count });
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.iter().filter(|call| call.kind() == kind).count()
    }

    pub fn is_live(&self, handle: BackendHandle) -> bool {
        self.resources.contains_key(handle)
    }

    pub fn live_submesh_count(&self) -> usize {
        self.shapes().filter(|shape| shape.of.is_none()).count()
    }

    pub fn live_instance_count(&self) -> usize {
        self.shapes().filter(|shape| shape.of.is_some()).count()
    }

    pub fn live_material_count(&self) -> usize {
        self.resources
            .values()
            .filter(|resource| matches!(resource, MockResource::Material { .. }))
            .count()
    }

    pub fn shape(&self, handle: BackendHandle) -> Option<&MockShape> {
        match self.resources.get(handle)? {
            MockResource::Shape(shape) => Some(shape),
            MockResource::Material { .. } => None,
        }
    }

    /// Name of the material bound to `shape`
    pub fn material_name_of(&self, shape: BackendHandle) -> Option<&str> {
        let material = self.shape(shape)?.material?;
        match self.resources.get(material)? {
            MockResource::Material { name } => Some(name),
            MockResource::Shape(_) => None,
        }
    }

    fn shapes(&self) -> impl Iterator<Item = &MockShape> {
        self.resources.values().filter_map(|resource| match resource {
            MockResource::Shape(shape) => Some(shape),
            MockResource::Material { .. } => None,
        })
    }

    fn check_failure(&mut self, kind: CallKind) -> Result<()> {
        let Some(failure) = self.failure.as_mut().filter(|failure| failure.kind == kind) else {
            return Ok(());
        };
        if failure.skip > 0 {
            failure.skip -= 1;
            return Ok(());
        }
        failure.remaining -= 1;
        if failure.remaining == 0 {
            self.failure = None;
        }
        engine_bail!("galaxy3d::MockBackend", "Injected failure on {:?}", kind);
    }

    fn shape_mut(&mut self, handle: BackendHandle) -> Result<&mut MockShape> {
        match self.resources.get_mut(handle) {
            Some(MockResource::Shape(shape)) => Ok(shape),
            _ => engine_bail!("galaxy3d::MockBackend", "Unknown shape {:?}", handle),
        }
    }

    fn is_material(&self, handle: BackendHandle) -> bool {
        matches!(self.resources.get(handle), Some(MockResource::Material { .. }))
    }

    fn remove_shape(&mut self, handle: BackendHandle, instance: bool) -> Result<()> {
        let is_instance = match self.resources.get(handle) {
            Some(MockResource::Shape(shape)) => shape.of.is_some(),
            _ => engine_bail!("galaxy3d::MockBackend", "Unknown shape {:?}", handle),
        };
        if is_instance != instance {
            engine_bail!("galaxy3d::MockBackend", "{:?} is not a{}", handle,
                if instance { "n instance" } else { " submesh" });
        }
        if !instance && self.shapes().any(|shape| shape.of == Some(handle)) {
            engine_bail!("galaxy3d::MockBackend", "Submesh {:?} still has live instances", handle);
        }
        self.resources.remove(handle);
        Ok(())
    }
}

impl RenderBackend for MockBackend {
    fn create_submesh(&mut self, geometry: &SubmeshGeometry<'_>, transform: &Mat4) -> Result<BackendHandle> {
        self.check_failure(CallKind::CreateSubmesh)?;
        if geometry.face_count() == 0 {
            engine_bail!("galaxy3d::MockBackend", "Submesh without faces");
        }
        let handle = self.resources.insert(MockResource::Shape(MockShape {
            of: None,
            material_index: geometry.material_index(),
            transform: *transform,
            material: None,
            visible: true,
        }));
        self.calls.push(BackendCall::CreateSubmesh {
            handle,
            material_index: geometry.material_index(),
            face_count: geometry.face_count(),
        });
        Ok(handle)
    }

    fn remove_submesh(&mut self, handle: BackendHandle) -> Result<()> {
        self.check_failure(CallKind::RemoveSubmesh)?;
        self.remove_shape(handle, false)?;
        self.calls.push(BackendCall::RemoveSubmesh(handle));
        Ok(())
    }

    fn create_instance(&mut self, of: BackendHandle, transform: &Mat4) -> Result<BackendHandle> {
        self.check_failure(CallKind::CreateInstance)?;
        let material_index = match self.resources.get(of) {
            Some(MockResource::Shape(shape)) if shape.of.is_none() => shape.material_index,
            _ => engine_bail!("galaxy3d::MockBackend", "Cannot instance {:?}", of),
        };
        let handle = self.resources.insert(MockResource::Shape(MockShape {
            of: Some(of),
            material_index,
            transform: *transform,
            material: None,
            visible: true,
        }));
        self.calls.push(BackendCall::CreateInstance { handle, of });
        Ok(handle)
    }

    fn remove_instance(&mut self, handle: BackendHandle) -> Result<()> {
        self.check_failure(CallKind::RemoveInstance)?;
        self.remove_shape(handle, true)?;
        self.calls.push(BackendCall::RemoveInstance(handle));
        Ok(())
    }

    fn update_transform(&mut self, shape: BackendHandle, transform: &Mat4) -> Result<()> {
        self.check_failure(CallKind::UpdateTransform)?;
        self.shape_mut(shape)?.transform = *transform;
        self.calls.push(BackendCall::UpdateTransform(shape));
        Ok(())
    }

    fn set_visibility(&mut self, shape: BackendHandle, visible: bool) -> Result<()> {
        self.check_failure(CallKind::SetVisibility)?;
        self.shape_mut(shape)?.visible = visible;
        self.calls.push(BackendCall::SetVisibility(shape, visible));
        Ok(())
    }

    fn create_material(&mut self, desc: &MaterialDesc) -> Result<BackendHandle> {
        self.check_failure(CallKind::CreateMaterial)?;
        let handle = self.resources.insert(MockResource::Material { name: desc.name.clone() });
        self.calls.push(BackendCall::CreateMaterial { handle, name: desc.name.clone() });
        Ok(handle)
    }

    fn remove_material(&mut self, handle: BackendHandle) -> Result<()> {
        self.check_failure(CallKind::RemoveMaterial)?;
        if !self.is_material(handle) {
            engine_bail!("galaxy3d::MockBackend", "Unknown material {:?}", handle);
        }
        if self.shapes().any(|shape| shape.material == Some(handle)) {
            engine_bail!("galaxy3d::MockBackend", "Material {:?} is still bound", handle);
        }
        self.resources.remove(handle);
        self.calls.push(BackendCall::RemoveMaterial(handle));
        Ok(())
    }

    fn bind_material(&mut self, shape: BackendHandle, material: BackendHandle) -> Result<()> {
        self.check_failure(CallKind::BindMaterial)?;
        if !self.is_material(material) {
            engine_bail!("galaxy3d::MockBackend", "Unknown material {:?}", material);
        }
        self.shape_mut(shape)?.material = Some(material);
        self.calls.push(BackendCall::BindMaterial { shape, material });
        Ok(())
    }

    fn unbind_material(&mut self, shape: BackendHandle) -> Result<()> {
        self.check_failure(CallKind::UnbindMaterial)?;
        self.shape_mut(shape)?.material = None;
        self.calls.push(BackendCall::UnbindMaterial(shape));
        Ok(())
    }
}
