//! Dataset partitions and the label vocabulary.
//!
//! Manifest file parsing lives outside the core; this module consumes
//! already-resolved `(path, label)` pairs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub label: String,
}

/// Named partition of recordings (`train`, `test`, ...), streamed and
/// shuffled independently.
#[derive(Debug, Clone)]
pub struct DataGroup {
    pub name: String,
    pub entries: Vec<ManifestEntry>,
}

impl DataGroup {
    pub fn new(name: impl Into<String>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A set of data groups under one label vocabulary.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub groups: Vec<DataGroup>,
}

impl Dataset {
    pub fn new(groups: Vec<DataGroup>) -> Self {
        Self { groups }
    }

    pub fn group(&self, name: &str) -> Option<&DataGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Sorted label → class index mapping over every group, so the
    /// numbering is independent of manifest order.
    pub fn label_to_index(&self) -> BTreeMap<String, u32> {
        let mut labels: Vec<&str> = self
            .groups
            .iter()
            .flat_map(|g| g.entries.iter().map(|e| e.label.as_str()))
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels
            .into_iter()
            .enumerate()
            .map(|(i, l)| (l.to_string(), i as u32))
            .collect()
    }

    /// The vocabulary as an injectable lookup function.
    pub fn label_fn(&self) -> Arc<dyn Fn(&str) -> Option<u32> + Send + Sync> {
        let map = self.label_to_index();
        Arc::new(move |label| map.get(label).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, label: &str) -> ManifestEntry {
        ManifestEntry {
            path: PathBuf::from(path),
            label: label.to_string(),
        }
    }

    #[test]
    fn label_indices_are_sorted_and_stable() {
        let ds = Dataset::new(vec![
            DataGroup::new("train", vec![entry("a.wav", "sv"), entry("b.wav", "et")]),
            DataGroup::new("test", vec![entry("c.wav", "fi"), entry("d.wav", "sv")]),
        ]);
        let map = ds.label_to_index();
        assert_eq!(map.get("et"), Some(&0));
        assert_eq!(map.get("fi"), Some(&1));
        assert_eq!(map.get("sv"), Some(&2));
    }

    #[test]
    fn label_fn_rejects_unknown_labels() {
        let ds = Dataset::new(vec![DataGroup::new("train", vec![entry("a.wav", "fi")])]);
        let f = ds.label_fn();
        assert_eq!(f("fi"), Some(0));
        assert_eq!(f("xx"), None);
    }

    #[test]
    fn group_lookup_by_name() {
        let ds = Dataset::new(vec![
            DataGroup::new("train", vec![]),
            DataGroup::new("test", vec![entry("a.wav", "fi")]),
        ]);
        assert!(ds.group("train").unwrap().is_empty());
        assert_eq!(ds.group("test").unwrap().len(), 1);
        assert!(ds.group("dev").is_none());
    }
}
