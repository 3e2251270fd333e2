//! Unit tests for settings_differ.rs

use crate::settings::{SettingValue, SettingsDiffer, SettingsTree};

fn old_tree() -> SettingsTree {
    SettingsTree::new()
        .with("enable", false)
        .with("ibl.intensity", 1.0f32)
        .with("ibl.color", [0.0f32; 3])
}

// ============================================================================
// VISIT TESTS
// ============================================================================

#[test]
fn test_use_new_value_detects_change() {
    let mut old = old_tree();
    let new = old_tree().with("enable", true);
    let mut sync = SettingsDiffer::new(&mut old, &new);

    assert!(sync.use_new_value("enable"));
    assert!(!sync.use_new_value("ibl.intensity"));
    assert!(sync.updated("enable"));
    assert!(!sync.updated("ibl.intensity"));
    assert_eq!(sync.updated_value("enable"), Some(&SettingValue::Bool(true)));
    assert_eq!(sync.old_value("enable"), Some(&SettingValue::Bool(false)));
}

#[test]
fn test_missing_new_value_is_not_a_change() {
    let mut old = old_tree();
    let new = SettingsTree::new();
    let mut sync = SettingsDiffer::new(&mut old, &new);

    assert!(!sync.use_new_value("enable"));
    assert_eq!(sync.updated_value("enable"), Some(&SettingValue::Bool(false)));
}

#[test]
fn test_missing_old_value_is_a_change() {
    let mut old = SettingsTree::new();
    let new = old_tree();
    let mut sync = SettingsDiffer::new(&mut old, &new);

    assert!(sync.use_new_value("ibl.intensity"));
    assert_eq!(sync.new_value("ibl.intensity"), Some(&SettingValue::Float(1.0)));
}

#[test]
fn test_revisit_is_stable() {
    let mut old = old_tree();
    let new = old_tree().with("enable", true);
    let mut sync = SettingsDiffer::new(&mut old, &new);

    assert!(sync.use_new_value("enable"));
    assert!(sync.use_new_value("enable"));
    assert_eq!(sync.visited_paths(), &["enable".to_string()]);
    assert_eq!(sync.diff().changed_paths, vec!["enable".to_string()]);
}

#[test]
fn test_is_same() {
    let mut old = old_tree();
    let new = old_tree().with("enable", true);
    let sync = SettingsDiffer::new(&mut old, &new);

    assert!(!sync.is_same("enable"));
    assert!(sync.is_same("ibl.color"));
    assert!(sync.is_same("does.not.exist"));
}

// ============================================================================
// COMMIT TESTS
// ============================================================================

#[test]
fn test_commit_writes_only_visited_changes() {
    let mut old = old_tree();
    let new = old_tree()
        .with("enable", true)
        .with("ibl.color", [1.0f32, 0.0, 0.0])
        .with("ibl.intensity", 3.0f32);

    let diff = {
        let mut sync = SettingsDiffer::new(&mut old, &new);
        sync.use_new_value("enable");
        sync.use_new_value("ibl.intensity");
        sync.commit()
    };

    assert_eq!(diff.changed_paths, vec!["enable".to_string(), "ibl.intensity".to_string()]);
    assert!(diff.changed("ibl.intensity"));
    assert!(!diff.changed("ibl.color"));
    assert!(!diff.is_empty());

    assert_eq!(old.get("enable"), Some(&SettingValue::Bool(true)));
    assert_eq!(old.get("ibl.intensity"), Some(&SettingValue::Float(3.0)));
    // Never visited: keeps the old value
    assert_eq!(old.get("ibl.color"), Some(&SettingValue::Float3([0.0; 3])));
}

#[test]
fn test_commit_without_changes_leaves_old_untouched() {
    let mut old = old_tree();
    let new = old_tree();

    let diff = {
        let mut sync = SettingsDiffer::new(&mut old, &new);
        sync.use_new_value("enable");
        sync.use_new_value("ibl.color");
        sync.commit()
    };

    assert!(diff.is_empty());
    assert_eq!(diff.visited_paths.len(), 2);
    assert_eq!(old, old_tree());
}

#[test]
fn test_second_pass_sees_no_change() {
    let mut old = old_tree();
    let new = old_tree().with("enable", true);

    {
        let mut sync = SettingsDiffer::new(&mut old, &new);
        sync.use_new_value("enable");
        sync.commit();
    }
    let mut sync = SettingsDiffer::new(&mut old, &new);
    assert!(!sync.use_new_value("enable"));
    assert!(sync.commit().is_empty());
}
