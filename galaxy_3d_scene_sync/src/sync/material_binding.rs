/// Material reassignment.
///
/// A record binds one material per handle. A prototype binds its own slots;
/// an instance binds its override when it has one and otherwise inherits the
/// binding its prototype currently has. Every change of a prototype binding
/// cascades to the instances that do not override that index.

use std::collections::BTreeSet;
use crate::backend::{BackendHandle, RenderBackend};
use crate::error::{Error, Result, SkipReason};
use crate::keys::{MaterialKey, SubmeshKey, SyncKey};
use crate::source::{SceneGraphProvider, ShaderKind};
use super::sync_engine::SyncEngine;
use super::sync_record::{PendingRelease, RealizedMaterial};

impl SyncEngine {
    // ===== RESOLUTION =====

    /// Material `key` should have bound at `material_index`
    pub(super) fn effective_target(&self, key: SyncKey, material_index: u32) -> Option<MaterialKey> {
        let record = self.records.get(&key)?;
        record.slot(material_index).or_else(|| {
            let prototype = self.records.get(&record.prototype_of()?)?;
            prototype.bound.get(&material_index).copied()
        })
    }

    /// Backend handle of `material`, creating the native material on first use
    fn ensure_material(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        material: MaterialKey,
    ) -> Result<std::result::Result<BackendHandle, SkipReason>> {
        if let Some(realized) = self.materials.get(&material) {
            return Ok(Ok(realized.handle));
        }
        let Some(desc) = scene.material(material) else {
            return Ok(Err(SkipReason::MissingMaterial(material)));
        };
        if let ShaderKind::Unsupported(shader) = &desc.shader {
            return Ok(Err(SkipReason::UnsupportedMaterial { material, shader: shader.clone() }));
        }
        let handle = backend.create_material(&desc)?;
        crate::engine_debug!("galaxy3d::SyncEngine", "Material {:?} ('{}') realized", material, desc.name);
        self.materials.insert(material, RealizedMaterial { handle, users: BTreeSet::new() });
        self.track_unused(material);
        Ok(Ok(handle))
    }

    // ===== BINDING =====

    /// Bind the effective material of every handle of `key`
    pub(super) fn bind_all(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
    ) -> Result<()> {
        let indices: Vec<u32> = match self.records.get(&key) {
            Some(record) => record.handles().keys().copied().collect(),
            None => return Ok(()),
        };
        for index in indices {
            let target = self.effective_target(key, index);
            self.apply_binding(backend, scene, key, index, target)?;
        }
        Ok(())
    }

    /// Make `target` the binding of `key` at `material_index`.
    ///
    /// Issues no backend call when the binding is unchanged. A material that
    /// cannot be realized is skipped and leaves the handle unbound.
    pub(super) fn apply_binding(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
        material_index: u32,
        target: Option<MaterialKey>,
    ) -> Result<()> {
        let Some(record) = self.records.get(&key) else {
            return Ok(());
        };
        let Some(shape) = record.handle(material_index) else {
            return Ok(());
        };
        let current = record.bound.get(&material_index).copied();
        if target == current {
            return Ok(());
        }

        let resolved = match target {
            Some(material) => match self.ensure_material(backend, scene, material)? {
                Ok(handle) => Some((material, handle)),
                Err(reason) => {
                    self.skip(key, reason);
                    None
                }
            },
            None => None,
        };
        let next = resolved.map(|(material, _)| material);
        if next == current {
            return Ok(());
        }

        match resolved {
            Some((_, handle)) => backend.bind_material(shape, handle)?,
            None => backend.unbind_material(shape)?,
        }

        let submesh = SubmeshKey::new(key, material_index);
        if let Some(previous) = current {
            self.drop_user(previous, submesh);
        }
        if let Some(material) = next {
            if let Some(realized) = self.materials.get_mut(&material) {
                realized.users.insert(submesh);
            }
        }
        let Some(record) = self.records.get_mut(&key) else {
            return Ok(());
        };
        match next {
            Some(material) => {
                record.bound.insert(material_index, material);
            }
            None => {
                record.bound.remove(&material_index);
            }
        }
        let is_prototype = record.is_prototype();
        crate::engine_trace!("galaxy3d::SyncEngine",
            "{:?}[{}] bound to {:?}", key, material_index, next);

        if is_prototype {
            let instances: Vec<SyncKey> = self.instances_of
                .get(&key)
                .map(|instances| instances.iter().copied().collect())
                .unwrap_or_default();
            for instance in instances {
                let inherits = self.records
                    .get(&instance)
                    .is_some_and(|record| record.slot(material_index).is_none());
                if inherits {
                    self.apply_binding(backend, scene, instance, material_index, next)?;
                }
            }
        }
        Ok(())
    }

    // ===== PUBLIC OPERATIONS =====

    /// Bind `material` to each submesh, as the owner's own slot (an override
    /// on instances). Idempotent.
    pub fn assign(
        &mut self,
        scene: &dyn SceneGraphProvider,
        material: MaterialKey,
        submeshes: &[SubmeshKey],
    ) -> Result<()> {
        self.transition(|engine, backend| {
            for submesh in submeshes {
                let Some(record) = engine.records.get_mut(&submesh.owner) else {
                    return Err(Error::InvalidResource(format!("{:?} is not realized", submesh.owner)));
                };
                record.set_slot(submesh.material_index, Some(material));
                engine.apply_binding(backend, scene, submesh.owner, submesh.material_index, Some(material))?;
            }
            engine.verify(None)
        })
    }

    /// Replace the material slots of `key` and rebind the indices whose
    /// effective material changed
    pub fn update_materials(
        &mut self,
        scene: &dyn SceneGraphProvider,
        key: impl Into<SyncKey>,
        materials: Vec<Option<MaterialKey>>,
    ) -> Result<()> {
        let key = key.into();
        self.transition(|engine, backend| engine.update_materials_locked(backend, scene, key, materials))
    }

    pub(super) fn update_materials_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
        materials: Vec<Option<MaterialKey>>,
    ) -> Result<()> {
        let Some(record) = self.records.get_mut(&key) else {
            return Err(Error::InvalidResource(format!("{:?} is not realized", key)));
        };
        record.material_slots = materials;
        self.bind_all(backend, scene, key)?;
        self.verify(None)
    }

    /// Drop the override of `key` at `material_index`; an instance falls
    /// back to its prototype's current binding
    pub fn clear_override(
        &mut self,
        scene: &dyn SceneGraphProvider,
        key: impl Into<SyncKey>,
        material_index: u32,
    ) -> Result<()> {
        let key = key.into();
        self.transition(|engine, backend| {
            let Some(record) = engine.records.get_mut(&key) else {
                return Err(Error::InvalidResource(format!("{:?} is not realized", key)));
            };
            record.set_slot(material_index, None);
            let target = engine.effective_target(key, material_index);
            engine.apply_binding(backend, scene, key, material_index, target)?;
            engine.verify(None)
        })
    }

    /// Rebuild the backend material of an edited source material and
    /// re-issue every binding to it
    pub fn on_material_changed(
        &mut self,
        scene: &dyn SceneGraphProvider,
        material: MaterialKey,
    ) -> Result<()> {
        self.transition(|engine, backend| engine.on_material_changed_locked(backend, scene, material))
    }

    pub(super) fn on_material_changed_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        material: MaterialKey,
    ) -> Result<()> {
        let Some(realized) = self.materials.get(&material) else {
            return Ok(());
        };
        let old_handle = realized.handle;
        let users: Vec<(SubmeshKey, BackendHandle)> = realized.users
            .iter()
            .filter_map(|&user| Some((user, self.records.get(&user.owner)?.handle(user.material_index)?)))
            .collect();

        let Some(desc) = scene.material(material) else {
            return self.drop_material_locked(backend, material, Some(SkipReason::MissingMaterial(material)));
        };
        if let ShaderKind::Unsupported(shader) = &desc.shader {
            let reason = SkipReason::UnsupportedMaterial { material, shader: shader.clone() };
            return self.drop_material_locked(backend, material, Some(reason));
        }

        let new_handle = backend.create_material(&desc)?;
        for (done, &(_, shape)) in users.iter().enumerate() {
            if let Err(err) = backend.bind_material(shape, new_handle) {
                self.roll_back_rebuild(backend, material, &users[..done], old_handle, new_handle);
                return Err(err);
            }
        }
        if let Some(realized) = self.materials.get_mut(&material) {
            realized.handle = new_handle;
        }
        self.release(backend, PendingRelease::Material(old_handle));
        crate::engine_debug!("galaxy3d::SyncEngine",
            "Material {:?} rebuilt, {} bindings re-issued", material, users.len());
        Ok(())
    }

    /// Point the `rebound` users back at the old material after a failed
    /// rebuild.
    ///
    /// A shape that refuses the old material is unbound and stops being a
    /// user. The rebuilt material is released unless a shape is stuck on it.
    fn roll_back_rebuild(
        &mut self,
        backend: &mut dyn RenderBackend,
        material: MaterialKey,
        rebound: &[(SubmeshKey, BackendHandle)],
        old_handle: BackendHandle,
        new_handle: BackendHandle,
    ) {
        let mut stuck = 0;
        for &(user, shape) in rebound {
            if backend.bind_material(shape, old_handle).is_ok() {
                continue;
            }
            if backend.unbind_material(shape).is_err() {
                crate::engine_error!("galaxy3d::SyncEngine",
                    "{:?} is stuck on the rebuilt material of {:?}", user, material);
                stuck += 1;
                continue;
            }
            crate::engine_error!("galaxy3d::SyncEngine",
                "{:?} could not get {:?} back and was left unbound", user, material);
            if let Some(record) = self.records.get_mut(&user.owner) {
                record.bound.remove(&user.material_index);
            }
            self.drop_user(material, user);
        }

        if stuck == 0 {
            self.release(backend, PendingRelease::Material(new_handle));
        } else {
            // Releasing it would leave those shapes on a dead material
            crate::engine_error!("galaxy3d::SyncEngine",
                "Rebuilt material {:?} kept alive for {} shapes", new_handle, stuck);
        }
    }

    /// Unbind `material` from every user and release its backend material
    pub fn remove_material(&mut self, material: MaterialKey) -> Result<()> {
        self.transition(|engine, backend| {
            engine.drop_material_locked(backend, material, None)?;
            engine.verify(None)
        })
    }

    /// Unbind and release `material`, reporting `reason` for each user
    fn drop_material_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        material: MaterialKey,
        reason: Option<SkipReason>,
    ) -> Result<()> {
        let Some(realized) = self.materials.remove(&material) else {
            return Ok(());
        };

        let mut first_error = None;
        for user in &realized.users {
            let Some(record) = self.records.get_mut(&user.owner) else {
                continue;
            };
            record.bound.remove(&user.material_index);
            if let Some(shape) = record.handle(user.material_index) {
                if let Err(err) = backend.unbind_material(shape) {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(reason) = reason {
            let owners: BTreeSet<SyncKey> = realized.users.iter().map(|user| user.owner).collect();
            for owner in owners {
                self.skip(owner, reason.clone());
            }
        }
        crate::engine_debug!("galaxy3d::SyncEngine",
            "Material {:?} dropped from {} bindings", material, realized.users.len());

        match first_error {
            Some(err) => {
                // Still bound somewhere: the release waits for a retry
                self.pending_releases.push(PendingRelease::Material(realized.handle));
                Err(err)
            }
            None => {
                self.release(backend, PendingRelease::Material(realized.handle));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "material_binding_tests.rs"]
mod tests;
