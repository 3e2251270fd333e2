/// Render backend trait.
///
/// The native renderer the engine mirrors the scene into. Handles are opaque
/// generation-checked keys minted by the backend; the engine owns the
/// lifetime of every handle it receives and releases each exactly once.
///
/// The backend is shared with render worker threads, so it lives behind a
/// mutex. Every engine transition takes the lock once and holds it for the
/// whole transition.

use std::sync::{Arc, Mutex, MutexGuard};
use glam::Mat4;
use slotmap::new_key_type;
use crate::error::{Error, Result};
use crate::geometry::SubmeshGeometry;
use crate::source::MaterialDesc;

new_key_type! {
    /// Opaque handle to a backend resource (submesh, instance or material)
    pub struct BackendHandle;
}

/// Backend shared between the engine and the render path
pub type SharedBackend = Arc<Mutex<dyn RenderBackend>>;

/// Native renderer operations used by the synchronization engine
pub trait RenderBackend: Send {
    // ===== SHAPES =====

    /// Upload one submesh and place it with `transform`
    fn create_submesh(&mut self, geometry: &SubmeshGeometry<'_>, transform: &Mat4) -> Result<BackendHandle>;

    fn remove_submesh(&mut self, handle: BackendHandle) -> Result<()>;

    /// Create an instance of the submesh `of`, sharing its geometry
    fn create_instance(&mut self, of: BackendHandle, transform: &Mat4) -> Result<BackendHandle>;

    fn remove_instance(&mut self, handle: BackendHandle) -> Result<()>;

    /// Set the transform of a submesh or instance
    fn update_transform(&mut self, shape: BackendHandle, transform: &Mat4) -> Result<()>;

    /// Show or hide a submesh or instance
    fn set_visibility(&mut self, shape: BackendHandle, visible: bool) -> Result<()>;

    // ===== MATERIALS =====

    /// Build a native material
    fn create_material(&mut self, desc: &MaterialDesc) -> Result<BackendHandle>;

    fn remove_material(&mut self, handle: BackendHandle) -> Result<()>;

    /// Bind `material` to a submesh or instance, replacing any previous binding
    fn bind_material(&mut self, shape: BackendHandle, material: BackendHandle) -> Result<()>;

    /// Remove the material of a submesh or instance
    fn unbind_material(&mut self, shape: BackendHandle) -> Result<()>;
}

/// Lock the shared backend, reporting poisoning as a backend error
pub(crate) fn lock_backend(backend: &SharedBackend) -> Result<MutexGuard<'_, dyn RenderBackend + 'static>> {
    backend
        .lock()
        .map_err(|_| Error::BackendError("Backend lock poisoned".to_string()))
}
