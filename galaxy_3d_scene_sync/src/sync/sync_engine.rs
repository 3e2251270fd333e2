/// SyncEngine: mirrors a source scene graph into a render backend.
///
/// Every cache and registry of the synchronization lives in this struct: the
/// geometry cache, the sync records, the geometry → prototype registry, the
/// prototype → instances side table, duplicator outputs and realized
/// materials. Relations between keys are key relations in side tables, never
/// references.
///
/// Each public transition locks the shared backend once and holds the lock
/// for the whole transition. The `*_locked` variants run inside a transition
/// and are composed by the higher level operations (promotion, geometry
/// replacement, reconciliation, frame driver).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use glam::Mat4;
use rustc_hash::{FxHashMap, FxHashSet};
use crate::backend::{lock_backend, BackendHandle, RenderBackend, SharedBackend};
use crate::error::{Error, Result, SkipReason, SkippedObject};
use crate::geometry::GeometryCache;
use crate::invariant_bail;
use crate::keys::{InstanceKey, MaterialKey, ObjectKey, SubmeshKey, SyncKey};
use crate::settings::{initial_environment_tree, SettingsTree};
use crate::source::SceneGraphProvider;
use super::sync_config::SyncConfig;
use super::sync_record::{
    ObjectDesc, PendingRelease, Realization, RealizedMaterial, RecordState, SyncOutcome,
    SyncRecord,
};

/// Incremental scene synchronization engine
pub struct SyncEngine {
    /// Native renderer, shared with the render path
    backend: SharedBackend,
    pub(super) config: SyncConfig,
    pub(super) geometry_cache: GeometryCache,
    /// State of every realized key
    pub(super) records: FxHashMap<SyncKey, SyncRecord>,
    /// Geometry source → the key realized as its prototype
    pub(super) prototypes: FxHashMap<ObjectKey, SyncKey>,
    /// Prototype → keys realized as its instances
    pub(super) instances_of: FxHashMap<SyncKey, BTreeSet<SyncKey>>,
    /// Duplicator → produced occurrences and the object each one duplicates
    pub(super) duplicators: FxHashMap<ObjectKey, BTreeMap<InstanceKey, ObjectKey>>,
    pub(super) materials: FxHashMap<MaterialKey, RealizedMaterial>,
    /// Realized materials that may have lost their last user
    unused_materials: BTreeSet<MaterialKey>,
    /// Skips collected since the last `take_skipped`
    pub(super) skipped: Vec<SkippedObject>,
    pub(super) pending_releases: Vec<PendingRelease>,
    /// First release failure of the running transition
    release_error: Option<Error>,
    /// Objects seen by the last frame
    pub(super) known_objects: FxHashSet<ObjectKey>,
    /// Objects visible in the last frame
    pub(super) visible_objects: FxHashSet<ObjectKey>,
    /// Environment as last applied to the backend
    pub(super) environment: SettingsTree,
    /// Environment as last read from the source
    pub(super) last_environment: Option<SettingsTree>,
}

impl SyncEngine {
    /// Create an engine mirroring into `backend`
    ///
    /// # Arguments
    ///
    /// * `backend` - Render backend, shared with the render path
    /// * `config` - Engine tunables
    pub fn new(backend: SharedBackend, config: SyncConfig) -> Self {
        crate::engine_info!("galaxy3d::SyncEngine", "Sync engine created ({:?})", config);
        Self {
            backend,
            geometry_cache: GeometryCache::new(config.cache_empty_geometry),
            config,
            records: FxHashMap::default(),
            prototypes: FxHashMap::default(),
            instances_of: FxHashMap::default(),
            duplicators: FxHashMap::default(),
            materials: FxHashMap::default(),
            unused_materials: BTreeSet::new(),
            skipped: Vec::new(),
            pending_releases: Vec::new(),
            release_error: None,
            known_objects: FxHashSet::default(),
            visible_objects: FxHashSet::default(),
            environment: initial_environment_tree(),
            last_environment: None,
        }
    }

    // ===== TRANSITION PLUMBING =====

    /// Run `transition` with the backend locked once, then release the
    /// materials it left without users
    pub(super) fn transition<T>(
        &mut self,
        transition: impl FnOnce(&mut Self, &mut dyn RenderBackend) -> Result<T>,
    ) -> Result<T> {
        let backend = Arc::clone(&self.backend);
        let mut guard = lock_backend(&backend)?;
        let result = transition(self, &mut *guard);
        self.release_unused_materials(&mut *guard);
        let release_error = self.release_error.take();
        let value = result?;
        match release_error {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }

    /// Issue a backend release; a failure is queued for retry and surfaced
    /// when the transition ends
    pub(super) fn release(&mut self, backend: &mut dyn RenderBackend, release: PendingRelease) {
        let result = match release {
            PendingRelease::Instance(handle) => backend.remove_instance(handle),
            PendingRelease::Submesh(handle) => backend.remove_submesh(handle),
            PendingRelease::Material(handle) => backend.remove_material(handle),
        };
        if let Err(err) = result {
            crate::engine_error!("galaxy3d::SyncEngine",
                "Release of {:?} failed, queued for retry: {}", release, err);
            self.pending_releases.push(release);
            self.release_error.get_or_insert(err);
        }
    }

    pub(super) fn flush_pending_releases_locked(&mut self, backend: &mut dyn RenderBackend) -> usize {
        if self.pending_releases.is_empty() {
            return 0;
        }
        let mut pending = std::mem::take(&mut self.pending_releases);
        pending.sort();
        for release in pending {
            self.release(backend, release);
        }
        // Retries report through the queue, not through the transition
        self.release_error = None;
        self.pending_releases.len()
    }

    /// Retry queued backend releases. Returns how many are still pending.
    pub fn flush_pending_releases(&mut self) -> Result<usize> {
        self.transition(|engine, backend| Ok(engine.flush_pending_releases_locked(backend)))
    }

    pub(super) fn skip(&mut self, key: SyncKey, reason: SkipReason) {
        crate::engine_warn!("galaxy3d::SyncEngine", "Skipping {:?}: {}", key, reason);
        self.skipped.push(SkippedObject { key, reason });
    }

    /// Check invariants after a sub-step when configured to
    pub(super) fn verify(&self, retiring: Option<SyncKey>) -> Result<()> {
        if self.config.verify_transitions {
            self.check_invariants_allowing(retiring)?;
        }
        Ok(())
    }

    // ===== REALIZATION =====

    /// Realize `key`, as an instance if its geometry already has a prototype,
    /// else as that prototype.
    ///
    /// Realizing an already realized key returns its current state.
    pub fn realize(
        &mut self,
        scene: &dyn SceneGraphProvider,
        key: impl Into<SyncKey>,
        desc: &ObjectDesc,
    ) -> Result<SyncOutcome> {
        let key = key.into();
        self.transition(|engine, backend| engine.realize_locked(backend, scene, key, desc))
    }

    pub(super) fn realize_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
        desc: &ObjectDesc,
    ) -> Result<SyncOutcome> {
        if let Some(record) = self.records.get(&key) {
            return Ok(Ok(record.realization()));
        }
        let outcome = match self.prototypes.get(&desc.geometry).copied() {
            Some(prototype) => self.realize_instance(backend, scene, key, prototype, desc)?,
            None => self.realize_prototype(backend, scene, key, desc)?,
        };
        if let Err(reason) = &outcome {
            self.skip(key, reason.clone());
        }
        self.verify(None)?;
        Ok(outcome)
    }

    fn realize_prototype(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
        desc: &ObjectDesc,
    ) -> Result<SyncOutcome> {
        let Some(geometry) = self.geometry_cache.get_or_extract(desc.geometry, scene) else {
            return Ok(Err(SkipReason::EmptyGeometry));
        };

        let mut submeshes = BTreeMap::new();
        for &index in geometry.material_indices_used() {
            let Some(submesh) = geometry.submesh(index) else {
                continue;
            };
            match backend.create_submesh(&submesh, &desc.transform) {
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

        crate::engine_debug!("galaxy3d::SyncEngine",
            "{:?} realized as prototype of {:?} ({} submeshes)", key, desc.geometry, submeshes.len());
        self.records.insert(key, SyncRecord {
            geometry_key: desc.geometry,
            geometry,
            transform: desc.transform,
            material_slots: desc.materials.clone(),
            state: RecordState::Prototype { submeshes },
            bound: BTreeMap::new(),
            hidden: false,
        });
        self.prototypes.insert(desc.geometry, key);

        self.bind_all(backend, scene, key)?;
        if !desc.visible {
            self.set_visibility_locked(backend, key, false)?;
        }
        Ok(Ok(Realization::Prototype))
    }

    fn realize_instance(
        &mut self,
        backend: &mut dyn RenderBackend,
        scene: &dyn SceneGraphProvider,
        key: SyncKey,
        prototype: SyncKey,
        desc: &ObjectDesc,
    ) -> Result<SyncOutcome> {
        let Some(proto) = self.records.get(&prototype) else {
            invariant_bail!("galaxy3d::SyncEngine",
                "{:?} cannot resolve prototype {:?}", key, prototype);
        };
        if !proto.is_prototype() {
            invariant_bail!("galaxy3d::SyncEngine",
                "{:?} is registered as prototype but is not realized as one", prototype);
        }
        let geometry = Arc::clone(&proto.geometry);
        let sources: Vec<(u32, BackendHandle)> =
            proto.handles().iter().map(|(&index, &handle)| (index, handle)).collect();

        let mut handles = BTreeMap::new();
        for (index, of) in sources {
            match backend.create_instance(of, &desc.transform) {
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

        crate::engine_debug!("galaxy3d::SyncEngine",
            "{:?} realized as instance of {:?} ({} handles)", key, prototype, handles.len());
        self.records.insert(key, SyncRecord {
            geometry_key: desc.geometry,
            geometry,
            transform: desc.transform,
            material_slots: desc.materials.clone(),
            state: RecordState::Instance { of: prototype, handles },
            bound: BTreeMap::new(),
            hidden: false,
        });
        self.instances_of.entry(prototype).or_default().insert(key);

        self.bind_all(backend, scene, key)?;
        if !desc.visible {
            self.set_visibility_locked(backend, key, false)?;
        }
        Ok(Ok(Realization::Instance { of: prototype }))
    }

    // ===== DE-REALIZATION =====

    /// De-realize `key`.
    ///
    /// Fails with `InvariantViolation` on a prototype that still has
    /// instances; use `remove` to promote one of them instead.
    pub fn derealize(&mut self, key: impl Into<SyncKey>) -> Result<()> {
        let key = key.into();
        self.transition(|engine, backend| engine.derealize_locked(backend, key))
    }

    pub(super) fn derealize_locked(&mut self, backend: &mut dyn RenderBackend, key: SyncKey) -> Result<()> {
        match self.realization(key) {
            Realization::Unrealized => Ok(()),
            Realization::Instance { .. } => self.derealize_instance_locked(backend, key),
            Realization::Prototype => self.teardown_prototype_locked(backend, key, true),
        }
    }

    /// Release the per-instance handles of `key`; its prototype only loses it
    /// from its referencing set
    pub(super) fn derealize_instance_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: SyncKey,
    ) -> Result<()> {
        let Some(of) = self.records.get(&key).and_then(SyncRecord::prototype_of) else {
            return Ok(());
        };
        let Some(record) = self.records.remove(&key) else {
            return Ok(());
        };
        if let Some(instances) = self.instances_of.get_mut(&of) {
            instances.remove(&key);
            if instances.is_empty() {
                self.instances_of.remove(&of);
            }
        }
        self.unlink_materials(key, &record.bound);

        crate::engine_debug!("galaxy3d::SyncEngine", "{:?} de-realized (instance of {:?})", key, of);
        for &handle in record.handles().values() {
            self.release(backend, PendingRelease::Instance(handle));
        }
        self.verify(None)
    }

    /// Release every submesh of the prototype `key`
    ///
    /// # Arguments
    ///
    /// * `evict` - also drop the geometry cache entry of its geometry source
    pub(super) fn teardown_prototype_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: SyncKey,
        evict: bool,
    ) -> Result<()> {
        let live = self.instances_of.get(&key).map_or(0, BTreeSet::len);
        if live > 0 {
            invariant_bail!("galaxy3d::SyncEngine",
                "Cannot de-realize prototype {:?} with {} live instances", key, live);
        }
        let Some(record) = self.records.remove(&key) else {
            return Ok(());
        };
        if self.prototypes.get(&record.geometry_key) == Some(&key) {
            self.prototypes.remove(&record.geometry_key);
        }
        self.instances_of.remove(&key);
        self.unlink_materials(key, &record.bound);

        crate::engine_debug!("galaxy3d::SyncEngine",
            "{:?} de-realized (prototype of {:?})", key, record.geometry_key);
        for &handle in record.handles().values() {
            self.release(backend, PendingRelease::Submesh(handle));
        }
        if evict {
            self.geometry_cache.evict(record.geometry_key);
        }
        Ok(())
    }

    /// Drop `key` from the users of the materials in `bound`
    pub(super) fn unlink_materials(&mut self, key: SyncKey, bound: &BTreeMap<u32, MaterialKey>) {
        for (&index, &material) in bound {
            self.drop_user(material, SubmeshKey::new(key, index));
        }
    }

    /// Forget that `submesh` is bound to `material`
    pub(super) fn drop_user(&mut self, material: MaterialKey, submesh: SubmeshKey) {
        if let Some(realized) = self.materials.get_mut(&material) {
            realized.users.remove(&submesh);
            if realized.users.is_empty() {
                self.unused_materials.insert(material);
            }
        }
    }

    /// Mark a freshly realized material for release unless something binds it
    pub(super) fn track_unused(&mut self, material: MaterialKey) {
        self.unused_materials.insert(material);
    }

    /// Release the backend materials no handle is bound to anymore
    fn release_unused_materials(&mut self, backend: &mut dyn RenderBackend) {
        for material in std::mem::take(&mut self.unused_materials) {
            let unused = self.materials.get(&material).is_some_and(|realized| realized.users.is_empty());
            if !unused {
                continue;
            }
            if let Some(realized) = self.materials.remove(&material) {
                crate::engine_debug!("galaxy3d::SyncEngine", "Material {:?} has no user left, released", material);
                self.release(backend, PendingRelease::Material(realized.handle));
            }
        }
    }

    // ===== TRANSFORM & VISIBILITY =====

    /// Move `key`. One transform update per handle, no reallocation; a
    /// no-op when the transform is unchanged.
    pub fn update_transform(&mut self, key: impl Into<SyncKey>, transform: Mat4) -> Result<()> {
        let key = key.into();
        self.transition(|engine, backend| engine.update_transform_locked(backend, key, transform).map(|_| ()))
    }

    pub(super) fn update_transform_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: SyncKey,
        transform: Mat4,
    ) -> Result<bool> {
        let Some(record) = self.records.get_mut(&key) else {
            return Err(Error::InvalidResource(format!("{:?} is not realized", key)));
        };
        if record.transform == transform {
            return Ok(false);
        }
        for &handle in record.handles().values() {
            backend.update_transform(handle, &transform)?;
        }
        record.transform = transform;
        crate::engine_trace!("galaxy3d::SyncEngine", "{:?} moved", key);
        Ok(true)
    }

    /// Show or hide `key` without de-realizing it
    pub fn set_visibility(&mut self, key: impl Into<SyncKey>, visible: bool) -> Result<()> {
        let key = key.into();
        self.transition(|engine, backend| engine.set_visibility_locked(backend, key, visible).map(|_| ()))
    }

    pub(super) fn set_visibility_locked(
        &mut self,
        backend: &mut dyn RenderBackend,
        key: SyncKey,
        visible: bool,
    ) -> Result<bool> {
        let Some(record) = self.records.get_mut(&key) else {
            return Err(Error::InvalidResource(format!("{:?} is not realized", key)));
        };
        if record.hidden != visible {
            return Ok(false);
        }
        for &handle in record.handles().values() {
            backend.set_visibility(handle, visible)?;
        }
        record.hidden = !visible;
        crate::engine_trace!("galaxy3d::SyncEngine", "{:?} {}", key, if visible { "shown" } else { "hidden" });
        Ok(true)
    }

    // ===== QUERIES =====

    pub fn realization(&self, key: impl Into<SyncKey>) -> Realization {
        self.records
            .get(&key.into())
            .map_or(Realization::Unrealized, SyncRecord::realization)
    }

    /// Material currently bound to a submesh (after inheritance)
    pub fn effective_material(&self, submesh: SubmeshKey) -> Option<MaterialKey> {
        self.records.get(&submesh.owner)?.bound.get(&submesh.material_index).copied()
    }

    /// Key realized as the prototype of a geometry source
    pub fn prototype_for(&self, geometry: ObjectKey) -> Option<SyncKey> {
        self.prototypes.get(&geometry).copied()
    }

    /// Keys realized as instances of `prototype`, in key order
    pub fn instances_of(&self, prototype: impl Into<SyncKey>) -> Vec<SyncKey> {
        self.instances_of
            .get(&prototype.into())
            .map(|instances| instances.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Occurrences currently tracked for a duplicator, in key order
    pub fn produced_by(&self, duplicator: ObjectKey) -> Vec<InstanceKey> {
        self.duplicators
            .get(&duplicator)
            .map(|produced| produced.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Backend handles owned by `key`, in material index order
    pub fn handles(&self, key: impl Into<SyncKey>) -> Vec<BackendHandle> {
        self.records
            .get(&key.into())
            .map(|record| record.handles().values().copied().collect())
            .unwrap_or_default()
    }

    /// Own material slots of `key`
    pub fn material_slots(&self, key: impl Into<SyncKey>) -> Option<&[Option<MaterialKey>]> {
        self.records.get(&key.into()).map(|record| record.material_slots.as_slice())
    }

    pub fn is_hidden(&self, key: impl Into<SyncKey>) -> bool {
        self.records.get(&key.into()).is_some_and(|record| record.hidden)
    }

    /// Backend handle realized for a material
    pub fn material_handle(&self, material: MaterialKey) -> Option<BackendHandle> {
        self.materials.get(&material).map(|realized| realized.handle)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.geometry_cache
    }

    pub fn pending_release_count(&self) -> usize {
        self.pending_releases.len()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Drain the skips collected so far
    pub fn take_skipped(&mut self) -> Vec<SkippedObject> {
        std::mem::take(&mut self.skipped)
    }

    // ===== SHUTDOWN =====

    /// Release every backend resource owned by the engine: instances first,
    /// then prototypes, then materials.
    pub fn shutdown(&mut self) -> Result<()> {
        self.transition(|engine, backend| {
            let instances: Vec<SyncKey> = engine.records
                .iter()
                .filter(|(_, record)| !record.is_prototype())
                .map(|(&key, _)| key)
                .collect();
            for key in instances {
                engine.derealize_instance_locked(backend, key)?;
            }

            let prototypes: Vec<SyncKey> = engine.records.keys().copied().collect();
            for key in prototypes {
                engine.teardown_prototype_locked(backend, key, false)?;
            }
            engine.geometry_cache.clear();

            engine.unused_materials.clear();
            let materials: Vec<BackendHandle> =
                engine.materials.drain().map(|(_, realized)| realized.handle).collect();
            for handle in materials {
                engine.release(backend, PendingRelease::Material(handle));
            }

            engine.duplicators.clear();
            engine.known_objects.clear();
            engine.visible_objects.clear();
            engine.environment = initial_environment_tree();
            engine.last_environment = None;
            crate::engine_info!("galaxy3d::SyncEngine", "Sync engine shut down");
            Ok(())
        })
    }
}

#[cfg(test)]
#[path = "sync_engine_tests.rs"]
mod tests;
