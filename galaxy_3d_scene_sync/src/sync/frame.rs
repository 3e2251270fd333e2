/// Per-frame driver.
///
/// One call applies everything that changed in the source since the last
/// frame, as a sequence of transitions:
///
/// 1. retry queued backend releases
/// 2. duplicator occurrences of objects gone from the source are dropped,
///    then those objects are removed
/// 3. objects that turned invisible are hidden, duplicators drop their output
/// 4. edited materials are rebuilt
/// 5. changed geometry is replaced, then visible geometry objects are
///    realized, moved, rebound and shown
/// 6. duplicators that are new, dirty or duplicate changed objects are
///    reconciled
/// 7. environment settings are diffed
///
/// The frame may be abandoned between two transitions, never inside one.

use std::collections::BTreeSet;
use rustc_hash::FxHashSet;
use crate::error::{Result, SkippedObject};
use crate::geometry::GeometryCacheStats;
use crate::keys::{ObjectKey, SyncKey};
use crate::settings::{filter_environment_changes, EnvironmentUpdate};
use crate::source::{DirtyFlags, ObjectKind, SceneGraphProvider};
use super::duplicator::ReconcileReport;
use super::sync_engine::SyncEngine;
use super::sync_record::ObjectDesc;

/// Outcome of one synchronized frame
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Objects left out of the backend this frame
    pub skipped: Vec<SkippedObject>,
    /// Duplicator reconciliations run this frame
    pub reconciled: Vec<ReconcileReport>,
    /// Environment changes for the host to apply
    pub environment: Option<EnvironmentUpdate>,
    /// Backend releases still waiting for a retry
    pub pending_releases: usize,
    pub cache_stats: GeometryCacheStats,
    /// The frame was abandoned before completion
    pub cancelled: bool,
}

impl SyncEngine {
    /// Synchronize one frame
    pub fn sync_frame(&mut self, scene: &dyn SceneGraphProvider) -> Result<FrameReport> {
        self.sync_frame_until(scene, || false)
    }

    /// Synchronize one frame, checking `should_stop` before each transition.
    ///
    /// A stopped frame keeps its committed transitions; the next frame
    /// resumes the remaining work.
    pub fn sync_frame_until(
        &mut self,
        scene: &dyn SceneGraphProvider,
        mut should_stop: impl FnMut() -> bool,
    ) -> Result<FrameReport> {
        let mut report = FrameReport::default();

        // ========== 1. Deferred releases ==========
        let pending = self.flush_pending_releases()?;
        if pending > 0 {
            crate::engine_warn!("galaxy3d::SyncEngine", "{} backend releases still pending", pending);
        }

        let objects = scene.objects();
        let current: FxHashSet<ObjectKey> = objects.iter().copied().collect();
        let visible: FxHashSet<ObjectKey> =
            objects.iter().copied().filter(|&key| scene.is_visible(key)).collect();
        let mut changed: BTreeSet<ObjectKey> = objects
            .iter()
            .copied()
            .filter(|&key| {
                scene.dirty_flags(key).intersects(DirtyFlags::DATA_CHANGED | DirtyFlags::MATERIALS_CHANGED)
            })
            .collect();

        // ========== 2. Source removal ==========
        let mut removed: Vec<ObjectKey> =
            self.known_objects.iter().copied().filter(|key| !current.contains(key)).collect();
        removed.sort();
        let gone: BTreeSet<ObjectKey> = removed.iter().copied().collect();
        let mut emptied: Vec<ObjectKey> = self.duplicators
            .keys()
            .copied()
            .filter(|&duplicator| gone.contains(&duplicator) || self.duplicates_any(duplicator, &gone))
            .collect();
        emptied.sort();
        // Occurrences first: a removed object then has no instance left to promote
        for duplicator in emptied {
            if should_stop() {
                return Ok(self.abandon(report));
            }
            report.reconciled.push(self.drop_occurrences_of(scene, duplicator, &gone)?);
        }
        for key in removed {
            if should_stop() {
                return Ok(self.abandon(report));
            }
            self.remove(scene, key)?;
            self.geometry_cache.evict(key);
            self.known_objects.remove(&key);
            self.visible_objects.remove(&key);
            changed.insert(key);
        }

        // ========== 3. Objects turned invisible ==========
        for &key in objects.iter().filter(|key| !visible.contains(key)) {
            let sync_key = SyncKey::Object(key);
            let realized = self.records.get(&sync_key).is_some_and(|record| !record.hidden);
            if !realized && !self.duplicators.contains_key(&key) {
                continue;
            }
            if should_stop() {
                return Ok(self.abandon(report));
            }
            if self.duplicators.contains_key(&key) {
                report.reconciled.push(self.reconcile(scene, key, &[])?);
            }
            if realized {
                let has_instances = self.instances_of.contains_key(&sync_key);
                if self.config.hide_invisible_objects || has_instances {
                    self.set_visibility(sync_key, false)?;
                } else {
                    self.remove(scene, sync_key)?;
                }
            }
            self.visible_objects.remove(&key);
        }

        // ========== 4. Edited materials ==========
        for material in scene.updated_materials() {
            if should_stop() {
                return Ok(self.abandon(report));
            }
            self.on_material_changed(scene, material)?;
        }

        // ========== 5. Geometry objects ==========
        for &key in &objects {
            if !scene.dirty_flags(key).contains(DirtyFlags::DATA_CHANGED) {
                continue;
            }
            if should_stop() {
                return Ok(self.abandon(report));
            }
            if self.prototypes.contains_key(&key) {
                self.replace_geometry(scene, key)?;
            } else {
                self.geometry_cache.evict(key);
            }
        }

        for &key in objects.iter().filter(|key| visible.contains(key)) {
            let Some(info) = scene.object(key) else {
                continue;
            };
            if info.kind != ObjectKind::Geometry {
                continue;
            }
            if should_stop() {
                return Ok(self.abandon(report));
            }
            let sync_key = SyncKey::Object(key);
            if !self.records.contains_key(&sync_key) {
                // Already reported, nothing to retry until its data changes
                if self.geometry_cache.is_known_empty(key) {
                    continue;
                }
                let desc = ObjectDesc::new(key)
                    .with_transform(info.transform)
                    .with_materials(info.materials);
                self.realize(scene, sync_key, &desc)?;
                continue;
            }
            self.transition(|engine, backend| {
                engine.update_transform_locked(backend, sync_key, info.transform)?;
                let materials_changed = engine.records
                    .get(&sync_key)
                    .is_some_and(|record| record.material_slots != info.materials);
                if materials_changed {
                    engine.update_materials_locked(backend, scene, sync_key, info.materials)?;
                }
                engine.set_visibility_locked(backend, sync_key, true)?;
                Ok(())
            })?;
        }

        // ========== 6. Duplicators ==========
        for &key in objects.iter().filter(|key| visible.contains(key)) {
            if !scene.object(key).is_some_and(|info| info.is_duplicator) {
                continue;
            }
            let needs_reconcile = !self.visible_objects.contains(&key)
                || scene.dirty_flags(key).contains(DirtyFlags::DATA_CHANGED)
                || self.duplicates_any(key, &changed);
            if !needs_reconcile {
                continue;
            }
            if should_stop() {
                return Ok(self.abandon(report));
            }
            let produced = scene.duplicator_instances(key);
            report.reconciled.push(self.reconcile(scene, key, &produced)?);
        }

        // ========== 7. Environment ==========
        if let Some(environment) = scene.environment() {
            let tree = environment.to_tree();
            if self.last_environment.as_ref() != Some(&tree) {
                let sync = filter_environment_changes(&mut self.environment, &tree);
                let update = EnvironmentUpdate::from_diff(&sync);
                let diff = sync.commit();
                if !diff.is_empty() {
                    crate::engine_debug!("galaxy3d::SyncEngine",
                        "Environment changed: {:?}", diff.changed_paths);
                    report.environment = Some(update);
                }
                self.last_environment = Some(tree);
            }
        }

        self.known_objects = current;
        self.visible_objects = visible;
        report.skipped = self.take_skipped();
        report.pending_releases = self.pending_releases.len();
        report.cache_stats = self.geometry_cache.stats();
        Ok(report)
    }

    fn abandon(&mut self, mut report: FrameReport) -> FrameReport {
        crate::engine_info!("galaxy3d::SyncEngine", "Frame abandoned");
        report.cancelled = true;
        report.skipped = self.take_skipped();
        report.pending_releases = self.pending_releases.len();
        report.cache_stats = self.geometry_cache.stats();
        report
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
