//! Error types for Galaxy3D Scene Sync
//!
//! Two families of failure exist:
//! - `Error`: fatal to the current transition (backend failures, invariant
//!   violations). Earlier transitions of the same frame stay committed.
//! - `SkipReason`: a single object or submesh could not be synchronized. It is
//!   logged, collected into the frame report and the frame continues.

use std::fmt;
use crate::keys::{MaterialKey, SyncKey};

/// Result type for Galaxy3D sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D sync errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Native backend call failed
    BackendError(String),

    /// Backend ran out of memory
    OutOfMemory,

    /// Invalid resource (unknown handle, unknown key, ...)
    InvalidResource(String),

    /// A registry invariant would be (or was found) broken
    InvariantViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of backend memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Why a single object (or one of its submeshes) was left out of the backend
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Extraction produced no polygons
    EmptyGeometry,
    /// The provider no longer knows the object
    MissingSourceObject,
    /// The provider has no description for a referenced material
    MissingMaterial(MaterialKey),
    /// The material uses a shader the backend cannot express
    UnsupportedMaterial {
        material: MaterialKey,
        shader: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyGeometry => write!(f, "geometry is empty"),
            SkipReason::MissingSourceObject => write!(f, "source object not found"),
            SkipReason::MissingMaterial(key) => write!(f, "material {:?} not found", key),
            SkipReason::UnsupportedMaterial { material, shader } => {
                write!(f, "material {:?} uses unsupported shader '{}'", material, shader)
            }
        }
    }
}

/// A skipped object, as aggregated in a frame report
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedObject {
    pub key: SyncKey,
    pub reason: SkipReason,
}

// ===== ERROR MACROS =====

/// Log an error and build an `Error::BackendError` from it
///
/// # Example
///
/// ```ignore
/// return Err(engine_err!("galaxy3d::MockBackend", "Unknown submesh {:?}", handle));
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::error::Error::BackendError(message)
    }};
}

/// Log an error and return early with an `Error::BackendError`
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

/// Log an error and return early with an `Error::InvariantViolation`
#[macro_export]
macro_rules! invariant_bail {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "Invariant violation: {}", message);
        return Err($crate::error::Error::InvariantViolation(message));
    }};
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
