/// Nested tree of named setting leaves.
///
/// Paths are dot-separated names (`"ibl.maps.override_background"`). Every
/// lookup is total: a missing branch or leaf yields None, never an error.

use std::collections::BTreeMap;

/// Value of one setting leaf
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Float3([f32; 3]),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            SettingValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            SettingValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float3(&self) -> Option<[f32; 3]> {
        match self {
            SettingValue::Float3(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<f32> for SettingValue {
    fn from(v: f32) -> Self {
        SettingValue::Float(v)
    }
}

impl From<[f32; 3]> for SettingValue {
    fn from(v: [f32; 3]) -> Self {
        SettingValue::Float3(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Text(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::Text(v)
    }
}

/// Node of a settings tree
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsNode {
    Leaf(SettingValue),
    Branch(SettingsTree),
}

/// Tree of named settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsTree {
    children: BTreeMap<String, SettingsNode>,
}

impl SettingsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a leaf (builder style)
    pub fn with(mut self, path: &str, value: impl Into<SettingValue>) -> Self {
        self.set(path, value.into());
        self
    }

    /// Get the leaf at `path`
    pub fn get(&self, path: &str) -> Option<&SettingValue> {
        match self.node(path)? {
            SettingsNode::Leaf(value) => Some(value),
            SettingsNode::Branch(_) => None,
        }
    }

    /// Get the branch at `path`
    pub fn branch(&self, path: &str) -> Option<&SettingsTree> {
        match self.node(path)? {
            SettingsNode::Branch(tree) => Some(tree),
            SettingsNode::Leaf(_) => None,
        }
    }

    /// Whether a leaf exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set the leaf at `path`, creating missing branches.
    ///
    /// A leaf standing where a branch is needed is replaced by the branch.
    pub fn set(&mut self, path: &str, value: SettingValue) {
        let mut names = path.split('.');
        let Some(last) = names.next_back() else {
            return;
        };
        let mut tree = self;
        for name in names {
            let node = tree
                .children
                .entry(name.to_string())
                .or_insert_with(|| SettingsNode::Branch(SettingsTree::new()));
            if let SettingsNode::Leaf(_) = node {
                *node = SettingsNode::Branch(SettingsTree::new());
            }
            tree = match node {
                SettingsNode::Branch(branch) => branch,
                SettingsNode::Leaf(_) => return,
            };
        }
        tree.children.insert(last.to_string(), SettingsNode::Leaf(value));
    }

    /// Remove the leaf at `path`, returning its value
    pub fn remove(&mut self, path: &str) -> Option<SettingValue> {
        let (parent, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, path),
        };
        let tree = match parent {
            Some(parent) => match self.node_mut(parent)? {
                SettingsNode::Branch(tree) => tree,
                SettingsNode::Leaf(_) => return None,
            },
            None => self,
        };
        if !matches!(tree.children.get(last)?, SettingsNode::Leaf(_)) {
            return None;
        }
        match tree.children.remove(last)? {
            SettingsNode::Leaf(value) => Some(value),
            SettingsNode::Branch(_) => None,
        }
    }

    /// Paths of every leaf, in name order
    pub fn leaf_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn node(&self, path: &str) -> Option<&SettingsNode> {
        let mut names = path.split('.');
        let mut node = self.children.get(names.next()?)?;
        for name in names {
            node = match node {
                SettingsNode::Branch(tree) => tree.children.get(name)?,
                SettingsNode::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut SettingsNode> {
        let mut names = path.split('.');
        let mut node = self.children.get_mut(names.next()?)?;
        for name in names {
            node = match node {
                SettingsNode::Branch(tree) => tree.children.get_mut(name)?,
                SettingsNode::Leaf(_) => return None,
            };
        }
        Some(node)
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for (name, node) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            match node {
                SettingsNode::Leaf(_) => paths.push(path),
                SettingsNode::Branch(tree) => tree.collect_paths(&path, paths),
            }
        }
    }
}

#[cfg(test)]
#[path = "settings_tree_tests.rs"]
mod tests;
