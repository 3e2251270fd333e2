/// Registry consistency checks.
///
/// Checked relations:
/// - every registered prototype is realized as a prototype of that geometry,
///   and no geometry has two prototypes;
/// - every instance points at a live prototype of the same geometry, owns one
///   handle per prototype submesh and is listed in its referencing set;
/// - no backend handle is owned twice;
/// - bindings only name owned handles and match the material users.

use rustc_hash::FxHashSet;
use crate::error::Result;
use crate::invariant_bail;
use crate::keys::{SubmeshKey, SyncKey};
use super::sync_engine::SyncEngine;
use super::sync_record::RecordState;

impl SyncEngine {
    /// Verify every registry invariant
    pub fn check_invariants(&self) -> Result<()> {
        self.check_invariants_allowing(None)
    }

    /// Verify invariants, tolerating `retiring` as an unregistered prototype
    /// in the middle of a promotion
    pub(super) fn check_invariants_allowing(&self, retiring: Option<SyncKey>) -> Result<()> {
        const SOURCE: &str = "galaxy3d::SyncEngine";

        for (geometry, prototype) in &self.prototypes {
            match self.records.get(prototype) {
                Some(record) if record.is_prototype() && record.geometry_key == *geometry => {}
                _ => invariant_bail!(SOURCE,
                    "Registry names {:?} as prototype of {:?} but it is not", prototype, geometry),
            }
        }

        let mut owned = FxHashSet::default();
        for (&key, record) in &self.records {
            for &handle in record.handles().values() {
                if !owned.insert(handle) {
                    invariant_bail!(SOURCE, "Backend handle {:?} owned twice (again by {:?})", handle, key);
                }
            }

            match &record.state {
                RecordState::Prototype { .. } => {
                    if self.prototypes.get(&record.geometry_key) != Some(&key) && Some(key) != retiring {
                        invariant_bail!(SOURCE,
                            "{:?} is a second prototype of {:?}", key, record.geometry_key);
                    }
                }
                RecordState::Instance { of, handles } => {
                    let Some(prototype) = self.records.get(of) else {
                        invariant_bail!(SOURCE, "Instance {:?} points at dead prototype {:?}", key, of);
                    };
                    let RecordState::Prototype { submeshes } = &prototype.state else {
                        invariant_bail!(SOURCE, "Instance {:?} points at non-prototype {:?}", key, of);
                    };
                    if prototype.geometry_key != record.geometry_key {
                        invariant_bail!(SOURCE,
                            "Instance {:?} and prototype {:?} differ in geometry", key, of);
                    }
                    if !submeshes.keys().eq(handles.keys()) {
                        invariant_bail!(SOURCE,
                            "Instance {:?} does not cover the submeshes of {:?}", key, of);
                    }
                    if !self.instances_of.get(of).is_some_and(|instances| instances.contains(&key)) {
                        invariant_bail!(SOURCE,
                            "Instance {:?} missing from the referencing set of {:?}", key, of);
                    }
                }
            }

            for (&index, material) in &record.bound {
                if !record.handles().contains_key(&index) {
                    invariant_bail!(SOURCE, "{:?} binds material index {} it does not own", key, index);
                }
                let listed = self.materials
                    .get(material)
                    .is_some_and(|realized| realized.users.contains(&SubmeshKey::new(key, index)));
                if !listed {
                    invariant_bail!(SOURCE,
                        "{:?}[{}] bound to {:?} but not listed as its user", key, index, material);
                }
            }
        }

        for (prototype, instances) in &self.instances_of {
            for instance in instances {
                let points_back = self.records
                    .get(instance)
                    .is_some_and(|record| record.prototype_of() == Some(*prototype));
                if !points_back {
                    invariant_bail!(SOURCE,
                        "{:?} lists {:?} which is not its instance", prototype, instance);
                }
            }
        }

        for (material, realized) in &self.materials {
            for user in &realized.users {
                let bound = self.records
                    .get(&user.owner)
                    .and_then(|record| record.bound.get(&user.material_index));
                if bound != Some(material) {
                    invariant_bail!(SOURCE,
                        "{:?} lists user {:?} which is not bound to it", material, user);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "invariants_tests.rs"]
mod tests;
