//! Sync module
//!
//! The synchronization engine: prototype/instance state machine, material
//! reassignment, duplicator reconciliation and the per-frame driver.

mod sync_config;
mod sync_record;
mod sync_engine;
mod material_binding;
mod prototype;
mod duplicator;
mod invariants;
mod frame;

pub use sync_config::SyncConfig;
pub use sync_record::{ObjectDesc, PendingRelease, Realization, SyncOutcome};
pub use sync_engine::SyncEngine;
pub use duplicator::ReconcileReport;
pub use frame::FrameReport;
