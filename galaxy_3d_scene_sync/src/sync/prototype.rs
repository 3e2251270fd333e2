/// Prototype lifecycle: removal with promotion, and geometry replacement.
///
/// Removing a prototype that still has instances promotes one of them:
///
/// ```text
///  before            promote            repoint            teardown
///  P ── d1           P ── d2            P                  d1 ── d2
///    └─ d2           d1 (prototype)     d1 ── d2
/// ```
///
/// The successor is the instance with the lowest key. Registry invariants
/// hold after each of the three sub-steps, with the retiring prototype the
/// only tolerated second prototype of its geometry.

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::backend::{BackendHandle, RenderBackend};
use crate::error::Result;
use crate::invariant_bail;
use crate::keys::{ObjectKey, SyncKey};
use crate::source::SceneGraphProvider;
use super::sync_engine::SyncEngine;
use super::sync_record::{ObjectDesc, PendingRelease, Realization, RecordState};

impl SyncEngine {
    // ===== REMOVAL =====

    /// De-realize `key` for good. A prototype with live instances hands its
    /// role over to one of them first.
    pub fn remove(&mut self, scene: &dyn SceneGraphProvider, key: impl Into<SyncKey>) -> Result<()> {
        let key = key.into();
        self.transition(|engine, backend| engine.remove_locked(backend, scene, key))
    }

    pub(super) fn remove_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
    ) -> Result<()> {
        match self.realization(key) {
            Realization::Unrealized => Ok(()),
            Realization::Instance { .. } => self.derealize_instance_locked(backend, key),
            Realization::Prototype => {
                let successor = self.instances_of.get(&key).and_then(|instances| instances.first().copied());
                match successor {
                    Some(successor) => self.promote_and_remove_locked(backend, scene, key, successor),
                    None => {
                        self.teardown_prototype_locked(backend, key, true)?;
                        self.verify(None)
                    }
                }
            }
        }
    }

    fn promote_and_remove_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        retiring: SyncKey,
        successor: SyncKey,
    ) -> Result<()> {
        crate::engine_debug!("galaxy3d::SyncEngine",
            "Promoting {:?} to replace prototype {:?}", successor, retiring);

        self.promote_locked(backend, scene, retiring, successor)?;
        self.verify(Some(retiring))?;

        let remaining = self.instances_of(retiring);
        for instance in remaining {
            self.repoint_locked(backend, scene, instance, retiring, successor)?;
            self.verify(Some(retiring))?;
        }

        self.teardown_prototype_locked(backend, retiring, false)?;
        self.verify(None)
    }

    /// Re-realize the instance `successor` as the prototype of its geometry
    fn promote_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        retiring: SyncKey,
        successor: SyncKey,
    ) -> Result<()> {
        let Some(record) = self.records.get(&successor) else {
            invariant_bail!("galaxy3d::SyncEngine",
                "Instance {:?} of {:?} has no record", successor, retiring);
        };
        let geometry = Arc::clone(&record.geometry);
        let transform = record.transform;

        let mut submeshes = BTreeMap::new();
        for &index in geometry.material_indices_used() {
            let Some(submesh) = geometry.submesh(index) else {
                continue;
            };
            match backend.create_submesh(&submesh, &transform) {
                Ok(handle) => {
                    submeshes.insert(index, handle);
                }
                Err(err) => {
                    for handle in submeshes.into_values() {
                        self.release(backend, PendingRelease::Submesh(handle));
                    }
                    return Err(err);
                }
            }
        }

        let Some(record) = self.records.get_mut(&successor) else {
            invariant_bail!("galaxy3d::SyncEngine", "Instance {:?} vanished during promotion", successor);
        };
        // Inherited bindings become the successor's own materials
        let inherited: Vec<(u32, _)> = record.bound
            .iter()
            .filter(|&(&index, _)| record.slot(index).is_none())
            .map(|(&index, &material)| (index, material))
            .collect();
        for (index, material) in inherited {
            record.set_slot(index, Some(material));
        }
        let old_state = std::mem::replace(&mut record.state, RecordState::Prototype { submeshes });
        let old_bound = std::mem::take(&mut record.bound);
        let hidden = std::mem::replace(&mut record.hidden, false);
        let geometry_key = record.geometry_key;

        if let Some(instances) = self.instances_of.get_mut(&retiring) {
            instances.remove(&successor);
        }
        self.prototypes.insert(geometry_key, successor);
        self.unlink_materials(successor, &old_bound);
        self.release_state(backend, old_state);

        self.bind_all(backend, scene, successor)?;
        if hidden {
            self.set_visibility_locked(backend, successor, false)?;
        }
        Ok(())
    }

    /// Move the instance `instance` from `retiring` to `successor`
    fn repoint_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        instance: SyncKey,
        retiring: SyncKey,
        successor: SyncKey,
    ) -> Result<()> {
        let Some(transform) = self.records.get(&instance).map(|record| record.transform) else {
            invariant_bail!("galaxy3d::SyncEngine", "Instance {:?} of {:?} has no record", instance, retiring);
        };
        let sources: Vec<(u32, BackendHandle)> = self.records
            .get(&successor)
            .map(|record| record.handles().iter().map(|(&index, &handle)| (index, handle)).collect())
            .unwrap_or_default();

        let mut handles = BTreeMap::new();
        for (index, of) in sources {
            match backend.create_instance(of, &transform) {
                Ok(handle) => {
                    handles.insert(index, handle);
                }
                Err(err) => {
                    for handle in handles.into_values() {
                        self.release(backend, PendingRelease::Instance(handle));
                    }
                    return Err(err);
                }
            }
        }

        let Some(record) = self.records.get_mut(&instance) else {
            invariant_bail!("galaxy3d::SyncEngine", "Instance {:?} vanished during promotion", instance);
        };
        let old_state = std::mem::replace(&mut record.state, RecordState::Instance { of: successor, handles });
        let old_bound = std::mem::take(&mut record.bound);
        let hidden = std::mem::replace(&mut record.hidden, false);

        if let Some(instances) = self.instances_of.get_mut(&retiring) {
            instances.remove(&instance);
        }
        self.instances_of.entry(successor).or_default().insert(instance);
        self.unlink_materials(instance, &old_bound);
        self.release_state(backend, old_state);

        crate::engine_trace!("galaxy3d::SyncEngine", "{:?} re-pointed to {:?}", instance, successor);
        self.bind_all(backend, scene, instance)?;
        if hidden {
            self.set_visibility_locked(backend, instance, false)?;
        }
        Ok(())
    }

    /// Release the handles of a replaced record state
    fn release_state(&mut self, backend: &mut dyn RenderBackend, state: RecordState) {
        match state {
            RecordState::Prototype { submeshes } => {
                for handle in submeshes.into_values() {
                    self.release(backend, PendingRelease::Submesh(handle));
                }
            }
            RecordState::Instance { handles, .. } => {
                for handle in handles.into_values() {
                    self.release(backend, PendingRelease::Instance(handle));
                }
            }
        }
    }

    // ===== GEOMETRY REPLACEMENT =====

    /// Re-extract the geometry of `geometry` and re-realize every record
    /// sharing it, prototype first
    pub fn replace_geometry(&mut self, scene: &dyn SceneGraphProvider, geometry: ObjectKey) -> Result<()> {
        self.transition(|engine, backend| engine.replace_geometry_locked(backend, scene, geometry))
    }

    pub(super) fn replace_geometry_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        geometry: ObjectKey,
    ) -> Result<()> {
        let Some(prototype) = self.prototypes.get(&geometry).copied() else {
            self.geometry_cache.evict(geometry);
            return Ok(());
        };

        let describe = |engine: &Self, key: SyncKey| {
            engine.records.get(&key).map(|record| ObjectDesc {
                geometry,
                transform: record.transform,
                materials: record.material_slots.clone(),
                visible: !record.hidden,
            })
        };
        let prototype_desc = describe(&*self, prototype);
        let instances: Vec<(SyncKey, Option<ObjectDesc>)> = self
            .instances_of(prototype)
            .into_iter()
            .map(|key| (key, describe(&*self, key)))
            .collect();

        crate::engine_debug!("galaxy3d::SyncEngine",
            "Replacing geometry of {:?} ({} instances)", geometry, instances.len());
        for (key, _) in &instances {
            self.derealize_instance_locked(backend, *key)?;
        }
        self.teardown_prototype_locked(backend, prototype, true)?;

        if let Some(desc) = prototype_desc {
            self.realize_locked(backend, scene, prototype, &desc)?;
        }
        for (key, desc) in instances {
            if let Some(desc) = desc {
                self.realize_locked(backend, scene, key, &desc)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "prototype_tests.rs"]
mod tests;
