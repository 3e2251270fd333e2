//! Geometry module
//!
//! Extracted geometry, its per-material submesh split, and the geometry cache.

mod extracted_geometry;
mod geometry_cache;

pub use extracted_geometry::{ExtractedGeometry, GeometryDesc, SubmeshGeometry};
pub use geometry_cache::{GeometryCache, GeometryCacheStats};
