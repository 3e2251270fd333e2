/// Duplicator reconciliation.
///
/// A duplicator's output is diffed against what was realized for it last
/// time by instance key: occurrences only in the old set are removed, those
/// only in the new set are realized, those in both are updated in place.

use std::collections::{BTreeMap, BTreeSet};
use crate::backend::RenderBackend;
use crate::error::Result;
use crate::keys::{InstanceKey, ObjectKey, SyncKey};
use crate::source::{ProducedInstance, SceneGraphProvider};
use super::sync_engine::SyncEngine;
use super::sync_record::{ObjectDesc, SyncRecord};

/// What one reconciliation did
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub duplicator: ObjectKey,
    /// Occurrences realized (or attempted) for the first time
    pub added: Vec<InstanceKey>,
    /// Occurrences torn down
    pub removed: Vec<InstanceKey>,
    /// Occurrences present before and after
    pub updated: Vec<InstanceKey>,
}

impl ReconcileReport {
    fn new(duplicator: ObjectKey) -> Self {
        Self { duplicator, added: Vec::new(), removed: Vec::new(), updated: Vec::new() }
    }

    /// No occurrence added or removed
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl SyncEngine {
    /// Bring the instances of `duplicator` in line with `produced`
    pub fn reconcile(
        &mut self,
        scene: &dyn SceneGraphProvider,
        duplicator: ObjectKey,
        produced: &[ProducedInstance],
    ) -> Result<ReconcileReport> {
        self.transition(|engine, backend| engine.reconcile_locked(backend, scene, duplicator, produced))
    }

    pub(super) fn reconcile_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        duplicator: ObjectKey,
        produced: &[ProducedInstance],
    ) -> Result<ReconcileReport> {
        let old: BTreeMap<InstanceKey, ObjectKey> =
            self.duplicators.get(&duplicator).cloned().unwrap_or_default();
        let new_keys: BTreeSet<InstanceKey> = produced.iter().map(|item| item.key).collect();
        let mut report = ReconcileReport::new(duplicator);

        // Removals first, so a promoted successor never belongs to the new set by accident
        report.removed = old.keys().copied().filter(|key| !new_keys.contains(key)).collect();
        self.remove_occurrences_locked(backend, scene, duplicator, &report.removed)?;

        let mut seen = BTreeSet::new();
        for item in produced {
            if !seen.insert(item.key) {
                crate::engine_warn!("galaxy3d::SyncEngine",
                    "Duplicator {:?} produced {:?} twice", duplicator, item.key);
                continue;
            }
            let key = SyncKey::from(item.key);
            let desc = produced_desc(scene, item);
            match old.get(&item.key) {
                None => {
                    self.realize_locked(backend, scene, key, &desc)?;
                    report.added.push(item.key);
                }
                Some(&geometry_object) if geometry_object != item.geometry_object => {
                    // Same occurrence, other object: rebuild it
                    self.remove_locked(backend, scene, key)?;
                    self.realize_locked(backend, scene, key, &desc)?;
                    report.updated.push(item.key);
                }
                Some(_) => {
                    match self.records.get(&key).map(|record| record.material_slots != desc.materials) {
                        Some(materials_changed) => {
                            self.update_transform_locked(backend, key, desc.transform)?;
                            if materials_changed {
                                self.update_materials_locked(backend, scene, key, desc.materials)?;
                            }
                        }
                        // Skipped last time
                        None => {
                            self.realize_locked(backend, scene, key, &desc)?;
                        }
                    }
                    report.updated.push(item.key);
                }
            }
            self.duplicators.entry(duplicator).or_default().insert(item.key, item.geometry_object);
        }

        if !report.is_unchanged() {
            crate::engine_debug!("galaxy3d::SyncEngine",
                "Duplicator {:?} reconciled: {} added, {} removed, {} kept",
                duplicator, report.added.len(), report.removed.len(), report.updated.len());
        }
        Ok(report)
    }

    /// Drop the occurrences of `duplicator` that duplicate one of `objects`,
    /// or all of them when `duplicator` is itself in `objects`
    pub(super) fn drop_occurrences_of(
        &mut self,
        scene: &dyn SceneGraphProvider,
        duplicator: ObjectKey,
        objects: &BTreeSet<ObjectKey>,
    ) -> Result<ReconcileReport> {
        self.transition(|engine, backend| {
            let everything = objects.contains(&duplicator);
            let mut report = ReconcileReport::new(duplicator);
            report.removed = engine.duplicators
                .get(&duplicator)
                .map(|produced| {
                    produced
                        .iter()
                        .filter(|&(_, &object)| everything || objects.contains(&object))
                        .map(|(&key, _)| key)
                        .collect()
                })
                .unwrap_or_default();
            engine.remove_occurrences_locked(backend, scene, duplicator, &report.removed)?;
            crate::engine_debug!("galaxy3d::SyncEngine",
                "Duplicator {:?} dropped {} occurrences of removed objects", duplicator, report.removed.len());
            Ok(report)
        })
    }

    /// Remove `keys` from the output of `duplicator`.
    ///
    /// Instances go before prototypes, so a removed prototype only ever
    /// promotes an occurrence that stays.
    fn remove_occurrences_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        duplicator: ObjectKey,
        keys: &[InstanceKey],
    ) -> Result<()> {
        let (prototypes, others): (Vec<InstanceKey>, Vec<InstanceKey>) = keys
            .iter()
            .copied()
            .partition(|&key| self.records.get(&SyncKey::from(key)).is_some_and(SyncRecord::is_prototype));

        for key in others.into_iter().chain(prototypes) {
            self.remove_locked(backend, scene, key.into())?;
            if let Some(produced) = self.duplicators.get_mut(&duplicator) {
                produced.remove(&key);
            }
        }
        if self.duplicators.get(&duplicator).is_some_and(BTreeMap::is_empty) {
            self.duplicators.remove(&duplicator);
        }
        Ok(())
    }

    /// Whether an occurrence of `duplicator` duplicates one of `objects`
    pub(super) fn duplicates_any(&self, duplicator: ObjectKey, objects: &BTreeSet<ObjectKey>) -> bool {
        self.duplicators
            .get(&duplicator)
            .is_some_and(|produced| produced.values().any(|object| objects.contains(object)))
    }
}

/// Realization description of an occurrence: its overrides, completed by the
/// materials of the object it duplicates
fn produced_desc(scene: &dyn SceneGraphProvider, item: &ProducedInstance) -> ObjectDesc {
    let inherited = scene
        .object(item.geometry_object)
        .map(|info| info.materials)
        .unwrap_or_default();
    let count = item.materials.len().max(inherited.len());
    let materials = (0..count)
        .map(|index| {
            item.materials
                .get(index)
                .copied()
                .flatten()
                .or_else(|| inherited.get(index).copied().flatten())
        })
        .collect();
    ObjectDesc::new(item.geometry_object)
        .with_transform(item.transform)
        .with_materials(materials)
}

#[cfg(test)]
#[path = "duplicator_tests.rs"]
mod tests;
