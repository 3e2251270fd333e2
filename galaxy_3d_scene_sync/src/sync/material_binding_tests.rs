//! Unit tests for material_binding.rs

use crate::backend::mock_backend::CallKind;
use crate::error::{Error, SkipReason};
use crate::keys::{InstanceKey, MaterialKey, ObjectKey, SubmeshKey};
use crate::source::{MaterialDesc, ShaderKind};
use crate::sync::ObjectDesc;
use crate::test_fixtures::{occurrence, Fixture};

/// Prototype `cube` bound to `m1`, instance `a` inheriting it and instance
/// `b` overriding index 0 with `m2`
struct CascadeScene {
    f: Fixture,
    cube: ObjectKey,
    a: InstanceKey,
    b: InstanceKey,
    m1: MaterialKey,
    m2: MaterialKey,
}

fn cascade_scene() -> CascadeScene {
    let mut f = Fixture::new();
    let m1 = f.material("m1");
    let m2 = f.material("m2");
    let cube = f.mesh("cube", &[0], &[Some(m1)]);
    let dup = f.duplicator("dup");
    f.realize_object(cube).unwrap();

    let a = occurrence(dup, 0);
    let b = occurrence(dup, 1);
    f.realize_as(a, &ObjectDesc::new(cube)).unwrap();
    f.realize_as(b, &ObjectDesc::new(cube).with_materials(vec![Some(m2)])).unwrap();
    f.mock().clear_calls();

    CascadeScene { f, cube, a, b, m1, m2 }
}

// ============================================================================
// CASCADE TESTS
// ============================================================================

#[test]
fn test_initial_bindings() {
    let s = cascade_scene();
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.cube, 0)), Some(s.m1));
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), Some(s.m1));
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.b, 0)), Some(s.m2));
}

#[test]
fn test_prototype_rebind_cascades_to_inheriting_instances_only() {
    let mut s = cascade_scene();
    let m3 = s.f.material("m3");

    s.f.engine.assign(&s.f.scene, m3, &[SubmeshKey::new(s.cube, 0)]).unwrap();

    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.cube, 0)), Some(m3));
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), Some(m3));
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.b, 0)), Some(s.m2));

    let a_handle = s.f.engine.handles(s.a)[0];
    let b_handle = s.f.engine.handles(s.b)[0];
    let mock = s.f.mock();
    assert_eq!(mock.count(CallKind::CreateMaterial), 1);
    assert_eq!(mock.count(CallKind::BindMaterial), 2);
    assert_eq!(mock.material_name_of(a_handle), Some("m3"));
    assert_eq!(mock.material_name_of(b_handle), Some("m2"));
}

#[test]
fn test_assign_is_idempotent() {
    let mut s = cascade_scene();
    s.f.engine.assign(&s.f.scene, s.m1, &[SubmeshKey::new(s.cube, 0)]).unwrap();
    assert_eq!(s.f.mock().call_count(), 0);
}

#[test]
fn test_assign_on_instance_is_override() {
    let mut s = cascade_scene();
    s.f.engine.assign(&s.f.scene, s.m2, &[SubmeshKey::new(s.a, 0)]).unwrap();
    assert_eq!(s.f.engine.material_slots(s.a), Some(&[Some(s.m2)][..]));

    // The prototype moving on no longer drags `a` along
    s.f.engine.assign(&s.f.scene, s.m2, &[SubmeshKey::new(s.cube, 0)]).unwrap();
    s.f.engine.assign(&s.f.scene, s.m1, &[SubmeshKey::new(s.cube, 0)]).unwrap();
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), Some(s.m2));
}

#[test]
fn test_assign_unrealized_owner() {
    let mut s = cascade_scene();
    let stray = s.f.mesh("stray", &[0], &[]);
    let err = s.f.engine.assign(&s.f.scene, s.m1, &[SubmeshKey::new(stray, 0)]).unwrap_err();
    assert!(matches!(err, Error::InvalidResource(_)));
}

#[test]
fn test_clear_override_falls_back_to_prototype() {
    let mut s = cascade_scene();
    s.f.engine.clear_override(&s.f.scene, s.b, 0).unwrap();

    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.b, 0)), Some(s.m1));
    assert_eq!(s.f.mock().count(CallKind::BindMaterial), 1);
    assert_eq!(s.f.engine.material_slots(s.b), Some(&[None][..]));
}

#[test]
fn test_prototype_unbind_cascades() {
    let mut s = cascade_scene();
    s.f.engine.update_materials(&s.f.scene, s.cube, vec![None]).unwrap();

    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.cube, 0)), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.b, 0)), Some(s.m2));
    assert_eq!(s.f.mock().count(CallKind::UnbindMaterial), 2);
}

#[test]
fn test_update_materials_unchanged_is_noop() {
    let mut s = cascade_scene();
    s.f.engine.update_materials(&s.f.scene, s.cube, vec![Some(s.m1)]).unwrap();
    assert_eq!(s.f.mock().call_count(), 0);
}

// ============================================================================
// MATERIAL EDIT TESTS
// ============================================================================

#[test]
fn test_material_change_rebuilds_and_rebinds_every_user() {
    let mut s = cascade_scene();
    let old_handle = s.f.engine.material_handle(s.m1).unwrap();
    s.f.scene.update_material(s.m1, MaterialDesc::new("m1 v2", ShaderKind::Uber));

    s.f.engine.on_material_changed(&s.f.scene, s.m1).unwrap();

    let new_handle = s.f.engine.material_handle(s.m1).unwrap();
    assert_ne!(new_handle, old_handle);
    let cube_handle = s.f.engine.handles(s.cube)[0];
    let a_handle = s.f.engine.handles(s.a)[0];
    let mock = s.f.mock();
    assert_eq!(mock.count(CallKind::CreateMaterial), 1);
    assert_eq!(mock.count(CallKind::BindMaterial), 2);
    assert_eq!(mock.count(CallKind::RemoveMaterial), 1);
    assert!(!mock.is_live(old_handle));
    assert_eq!(mock.material_name_of(cube_handle), Some("m1 v2"));
    assert_eq!(mock.material_name_of(a_handle), Some("m1 v2"));
}

#[test]
fn test_material_change_of_unrealized_material_is_noop() {
    let mut s = cascade_scene();
    let unused = s.f.material("unused");
    s.f.engine.on_material_changed(&s.f.scene, unused).unwrap();
    assert_eq!(s.f.mock().call_count(), 0);
}

#[test]
fn test_material_change_rolls_back_on_bind_failure() {
    let mut s = cascade_scene();
    let old_handle = s.f.engine.material_handle(s.m1).unwrap();
    s.f.scene.update_material(s.m1, MaterialDesc::new("m1 v2", ShaderKind::Diffuse));
    s.f.mock().fail_next(CallKind::BindMaterial);

    assert!(s.f.engine.on_material_changed(&s.f.scene, s.m1).is_err());

    assert_eq!(s.f.engine.material_handle(s.m1), Some(old_handle));
    let cube_handle = s.f.engine.handles(s.cube)[0];
    let mock = s.f.mock();
    assert_eq!(mock.material_name_of(cube_handle), Some("m1"));
    // m1 and m2 only: the rebuilt material was released again
    assert_eq!(mock.live_material_count(), 2);
}

#[test]
fn test_material_change_unbinds_shapes_that_refuse_the_old_material() {
    let mut s = cascade_scene();
    let old_handle = s.f.engine.material_handle(s.m1).unwrap();
    s.f.scene.update_material(s.m1, MaterialDesc::new("m1 v2", ShaderKind::Diffuse));
    // cube takes the rebuilt material, `a` refuses it, then cube refuses m1 again
    s.f.mock().fail_calls(CallKind::BindMaterial, 1, 2);

    assert!(s.f.engine.on_material_changed(&s.f.scene, s.m1).is_err());

    let cube_handle = s.f.engine.handles(s.cube)[0];
    let a_handle = s.f.engine.handles(s.a)[0];
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.cube, 0)), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), Some(s.m1));
    assert_eq!(s.f.engine.material_handle(s.m1), Some(old_handle));
    assert_eq!(s.f.engine.pending_release_count(), 0);
    s.f.engine.check_invariants().unwrap();

    let mock = s.f.mock();
    assert_eq!(mock.material_name_of(cube_handle), None);
    assert_eq!(mock.material_name_of(a_handle), Some("m1"));
    assert_eq!(mock.count(CallKind::UnbindMaterial), 1);
    // m1 and m2 only: nothing is left on the rebuilt material
    assert_eq!(mock.live_material_count(), 2);
}

#[test]
fn test_material_turned_unsupported_is_dropped() {
    let mut s = cascade_scene();
    s.f.scene.update_material(s.m1, MaterialDesc::new("m1", ShaderKind::Unsupported("hair".to_string())));

    s.f.engine.on_material_changed(&s.f.scene, s.m1).unwrap();

    assert_eq!(s.f.engine.material_handle(s.m1), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.cube, 0)), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), None);
    let skipped = s.f.engine.take_skipped();
    assert_eq!(skipped.len(), 2);
    assert!(skipped.iter().all(|skip| matches!(skip.reason, SkipReason::UnsupportedMaterial { .. })));
    assert_eq!(s.f.mock().count(CallKind::UnbindMaterial), 2);
}

// ============================================================================
// REMOVAL TESTS
// ============================================================================

#[test]
fn test_remove_material_unbinds_every_user() {
    let mut s = cascade_scene();
    s.f.engine.remove_material(s.m1).unwrap();

    assert_eq!(s.f.engine.material_handle(s.m1), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.cube, 0)), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.a, 0)), None);
    assert_eq!(s.f.engine.effective_material(SubmeshKey::new(s.b, 0)), Some(s.m2));
    let mock = s.f.mock();
    assert_eq!(mock.count(CallKind::UnbindMaterial), 2);
    assert_eq!(mock.count(CallKind::RemoveMaterial), 1);
    assert_eq!(mock.live_material_count(), 1);
}

#[test]
fn test_remove_unknown_material_is_noop() {
    let mut s = cascade_scene();
    let unused = s.f.material("unused");
    s.f.engine.remove_material(unused).unwrap();
    assert_eq!(s.f.mock().call_count(), 0);
}

// ============================================================================
// UNUSED MATERIAL TESTS
// ============================================================================

#[test]
fn test_material_without_users_is_released() {
    let mut f = Fixture::new();
    let red = f.material("red");
    let blue = f.material("blue");
    let cube = f.mesh("cube", &[0], &[Some(red)]);
    f.realize_object(cube).unwrap();
    let red_handle = f.engine.material_handle(red).unwrap();

    f.engine.update_materials(&f.scene, cube, vec![Some(blue)]).unwrap();

    assert_eq!(f.engine.material_handle(red), None);
    assert!(f.engine.material_handle(blue).is_some());
    let mock = f.mock();
    assert!(!mock.is_live(red_handle));
    assert_eq!(mock.live_material_count(), 1);
}

#[test]
fn test_material_kept_while_an_instance_uses_it() {
    let mut s = cascade_scene();
    s.f.engine.update_materials(&s.f.scene, s.b, vec![Some(s.m1)]).unwrap();

    // m2 lost its only user, m1 gained one
    assert_eq!(s.f.engine.material_handle(s.m2), None);
    assert!(s.f.engine.material_handle(s.m1).is_some());
    assert_eq!(s.f.mock().count(CallKind::RemoveMaterial), 1);
}

#[test]
fn test_material_released_with_its_last_user() {
    let mut s = cascade_scene();
    s.f.engine.derealize(s.b).unwrap();

    assert_eq!(s.f.engine.material_handle(s.m2), None);
    assert_eq!(s.f.mock().live_material_count(), 1);
    s.f.engine.check_invariants().unwrap();
}
