//! Backend module
//!
//! The native renderer seam: the `RenderBackend` trait, its opaque handles and
//! the shared, mutex-guarded backend type.

mod render_backend;

#[cfg(test)]
pub(crate) mod mock_backend;

pub use render_backend::{BackendHandle, RenderBackend, SharedBackend};
pub(crate) use render_backend::lock_backend;
