//! Extracted geometry types.
//!
//! An `ExtractedGeometry` is the immutable, backend-agnostic result of
//! tessellating one source object. Faces carry a material index; the engine
//! splits the geometry into one `SubmeshGeometry` per distinct index actually
//! used, which is the unit the backend allocates.
//!
//! # Layout
//!
//! ```text
//! ExtractedGeometry "cube"
//! ├── positions / normals / uvs (per vertex, shared by all submeshes)
//! ├── face_vertex_counts   [4, 4, 4, 4, 4, 4]
//! ├── face_indices         [0, 1, 2, 3, 4, 5, ...]
//! └── face_materials       [0, 0, 1, 1, 0, 1]
//!                           └── used indices: {0, 1} → two submeshes
//! ```

use glam::{Vec2, Vec3};
use crate::error::{Error, Result};

// ============================================================================
// DESCRIPTOR
// ============================================================================

/// Extraction output handed over by the geometry extractor
#[derive(Debug, Clone)]
pub struct GeometryDesc {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Option<Vec<Vec2>>,
    /// Number of vertices of each face
    pub face_vertex_counts: Vec<u32>,
    /// Vertex indices of all faces, concatenated
    pub face_indices: Vec<u32>,
    /// Material index of each face
    pub face_materials: Vec<u32>,
}

// ============================================================================
// EXTRACTED GEOMETRY
// ============================================================================

/// Immutable geometry of one source object
#[derive(Debug)]
pub struct ExtractedGeometry {
    name: String,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Option<Vec<Vec2>>,
    face_vertex_counts: Vec<u32>,
    face_indices: Vec<u32>,
    face_materials: Vec<u32>,
    /// Sorted distinct material indices referenced by faces
    material_indices_used: Vec<u32>,
}

impl ExtractedGeometry {
    /// Validate a descriptor and build the geometry
    pub fn from_desc(desc: GeometryDesc) -> Result<Self> {
        if desc.normals.len() != desc.positions.len() {
            return Err(Error::InvalidResource(format!(
                "Geometry '{}': {} normals for {} vertices",
                desc.name, desc.normals.len(), desc.positions.len())));
        }
        if let Some(uvs) = &desc.uvs {
            if uvs.len() != desc.positions.len() {
                return Err(Error::InvalidResource(format!(
                    "Geometry '{}': {} uvs for {} vertices",
                    desc.name, uvs.len(), desc.positions.len())));
            }
        }
        if desc.face_materials.len() != desc.face_vertex_counts.len() {
            return Err(Error::InvalidResource(format!(
                "Geometry '{}': {} face materials for {} faces",
                desc.name, desc.face_materials.len(), desc.face_vertex_counts.len())));
        }
        let index_total: usize = desc.face_vertex_counts.iter().map(|&c| c as usize).sum();
        if index_total != desc.face_indices.len() {
            return Err(Error::InvalidResource(format!(
                "Geometry '{}': faces reference {} indices, {} provided",
                desc.name, index_total, desc.face_indices.len())));
        }
        let vertex_count = desc.positions.len() as u32;
        if let Some(bad) = desc.face_indices.iter().find(|&&i| i >= vertex_count) {
            return Err(Error::InvalidResource(format!(
                "Geometry '{}': vertex index {} out of range ({} vertices)",
                desc.name, bad, vertex_count)));
        }

        let mut material_indices_used = desc.face_materials.clone();
        material_indices_used.sort_unstable();
        material_indices_used.dedup();

        Ok(Self {
            name: desc.name,
            positions: desc.positions,
            normals: desc.normals,
            uvs: desc.uvs,
            face_vertex_counts: desc.face_vertex_counts,
            face_indices: desc.face_indices,
            face_materials: desc.face_materials,
            material_indices_used,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }

    /// No faces means nothing to realize
    pub fn is_empty(&self) -> bool {
        self.face_vertex_counts.is_empty()
    }

    /// Sorted distinct material indices used by at least one face
    pub fn material_indices_used(&self) -> &[u32] {
        &self.material_indices_used
    }

    /// Build the submesh holding every face of one material index.
    ///
    /// Vertex attributes are shared with the whole geometry; only faces are
    /// filtered. Returns None if no face uses `material_index`.
    pub fn submesh(&self, material_index: u32) -> Option<SubmeshGeometry<'_>> {
        if self.material_indices_used.binary_search(&material_index).is_err() {
            return None;
        }

        // Single-material geometry: the submesh is the whole geometry
        if self.material_indices_used.len() == 1 {
            return Some(SubmeshGeometry {
                material_index,
                positions: &self.positions,
                normals: &self.normals,
                uvs: self.uvs.as_deref(),
                face_vertex_counts: self.face_vertex_counts.clone(),
                face_indices: self.face_indices.clone(),
            });
        }

        let mut face_vertex_counts = Vec::new();
        let mut face_indices = Vec::new();
        let mut cursor = 0usize;
        for (&count, &material) in self.face_vertex_counts.iter().zip(&self.face_materials) {
            let end = cursor + count as usize;
            if material == material_index {
                face_vertex_counts.push(count);
                face_indices.extend_from_slice(&self.face_indices[cursor..end]);
            }
            cursor = end;
        }

        Some(SubmeshGeometry {
            material_index,
            positions: &self.positions,
            normals: &self.normals,
            uvs: self.uvs.as_deref(),
            face_vertex_counts,
            face_indices,
        })
    }
}

// ============================================================================
// SUBMESH GEOMETRY
// ============================================================================

/// Faces of one material index, borrowing the vertex attributes of their geometry
#[derive(Debug)]
pub struct SubmeshGeometry<'a> {
    material_index: u32,
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    uvs: Option<&'a [Vec2]>,
    face_vertex_counts: Vec<u32>,
    face_indices: Vec<u32>,
}

impl<'a> SubmeshGeometry<'a> {
    pub fn material_index(&self) -> u32 {
        self.material_index
    }

    pub fn positions(&self) -> &'a [Vec3] {
        self.positions
    }

    pub fn normals(&self) -> &'a [Vec3] {
        self.normals
    }

    pub fn uvs(&self) -> Option<&'a [Vec2]> {
        self.uvs
    }

    pub fn face_vertex_counts(&self) -> &[u32] {
        &self.face_vertex_counts
    }

    pub fn face_indices(&self) -> &[u32] {
        &self.face_indices
    }

    pub fn face_count(&self) -> usize {
        self.face_vertex_counts.len()
    }

    /// Raw position bytes for backend upload
    pub fn position_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.positions)
    }

    /// Raw normal bytes for backend upload
    pub fn normal_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.normals)
    }

    /// Raw face index bytes for backend upload
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.face_indices)
    }
}

#[cfg(test)]
#[path = "extracted_geometry_tests.rs"]
mod tests;
