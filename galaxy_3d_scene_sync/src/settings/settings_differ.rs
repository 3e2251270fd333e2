/// Caller-driven differ between two settings snapshots.
///
/// The caller walks the leaves relevant to its current configuration and asks,
/// leaf by leaf, whether to take the new value. Accepted changes are gathered
/// in a diff tree; `commit()` writes exactly those leaves back into the old
/// snapshot. Leaves the caller never asked about stay untouched, whatever
/// their new value.

use super::settings_tree::{SettingValue, SettingsTree};

/// Result of a committed diff
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDiff {
    /// Accepted new values, at their paths
    pub changes: SettingsTree,
    /// Paths of the accepted changes, in visiting order
    pub changed_paths: Vec<String>,
    /// Every path the caller asked about, in visiting order
    pub visited_paths: Vec<String>,
}

impl SettingsDiff {
    pub fn is_empty(&self) -> bool {
        self.changed_paths.is_empty()
    }

    pub fn changed(&self, path: &str) -> bool {
        self.changes.contains(path)
    }
}

/// Differ over an old snapshot (written on commit) and a new one
pub struct SettingsDiffer<'a> {
    old: &'a mut SettingsTree,
    new: &'a SettingsTree,
    diff: SettingsDiff,
}

impl<'a> SettingsDiffer<'a> {
    pub fn new(old: &'a mut SettingsTree, new: &'a SettingsTree) -> Self {
        Self { old, new, diff: SettingsDiff::default() }
    }

    /// Visit `path` and take its new value if it differs from the old one.
    ///
    /// Returns true if the value changed. A leaf missing from the new
    /// snapshot is never a change.
    pub fn use_new_value(&mut self, path: &str) -> bool {
        if !self.diff.visited_paths.iter().any(|p| p == path) {
            self.diff.visited_paths.push(path.to_string());
        }
        if self.diff.changes.contains(path) {
            return true;
        }
        let Some(new_value) = self.new.get(path) else {
            return false;
        };
        if self.old.get(path) == Some(new_value) {
            return false;
        }
        self.diff.changes.set(path, new_value.clone());
        self.diff.changed_paths.push(path.to_string());
        true
    }

    /// Whether the new value of `path` was taken
    pub fn updated(&self, path: &str) -> bool {
        self.diff.changes.contains(path)
    }

    /// Value `path` will have after commit: the taken new value, else the old one
    pub fn updated_value(&self, path: &str) -> Option<&SettingValue> {
        self.diff.changes.get(path).or_else(|| self.old.get(path))
    }

    pub fn old_value(&self, path: &str) -> Option<&SettingValue> {
        self.old.get(path)
    }

    pub fn new_value(&self, path: &str) -> Option<&SettingValue> {
        self.new.get(path)
    }

    /// Whether both snapshots hold the same value (two missing leaves are the same)
    pub fn is_same(&self, path: &str) -> bool {
        self.old.get(path) == self.new.get(path)
    }

    pub fn visited_paths(&self) -> &[String] {
        &self.diff.visited_paths
    }

    pub fn diff(&self) -> &SettingsDiff {
        &self.diff
    }

    /// Write the taken values into the old snapshot and return the diff
    pub fn commit(self) -> SettingsDiff {
        for path in &self.diff.changed_paths {
            if let Some(value) = self.diff.changes.get(path) {
                self.old.set(path, value.clone());
            }
        }
        self.diff
    }
}

#[cfg(test)]
#[path = "settings_differ_tests.rs"]
mod tests;
