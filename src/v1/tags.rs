use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub type Tags = BTreeMap<String, String>;

/// Keys starting with this prefix are reserved by the provider.
pub const RESERVED_PREFIX: &str = "aws:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreTags {
    #[serde(default)]
    pub keys: BTreeSet<String>,
    #[serde(default)]
    pub key_prefixes: Vec<String>,
}

impl IgnoreTags {
    fn ignores(&self, key: &str) -> bool {
        key.starts_with(RESERVED_PREFIX)
            || self.keys.contains(key)
            || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// Provider-wide tag settings applied to every tag-bearing resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPolicy {
    pub default_tags: Tags,
    pub ignore: IgnoreTags,
}

/// The two views of remote tags kept in state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagViews {
    pub tags: Tags,
    pub tags_all: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    pub upsert: Tags,
    pub remove: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

impl TagPolicy {
    /// Full tag set to send: defaults overlaid by resource tags, reserved keys dropped.
    pub fn merge(&self, tags: Option<&Tags>) -> Tags {
        let mut merged = self.default_tags.clone();
        if let Some(tags) = tags {
            merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged.retain(|k, _| !k.starts_with(RESERVED_PREFIX));
        merged
    }

    /// Splits remote tags into managed and full views. Same input, same output.
    pub fn partition(&self, remote: &Tags) -> TagViews {
        let tags_all: Tags = remote
            .iter()
            .filter(|(k, _)| !self.ignore.ignores(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let tags = tags_all
            .iter()
            .filter(|(k, v)| self.default_tags.get(k.as_str()) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        TagViews { tags, tags_all }
    }
}

pub fn diff(old: &Tags, new: &Tags) -> TagDiff {
    TagDiff {
        upsert: new
            .iter()
            .filter(|(k, v)| old.get(k.as_str()) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        remove: old
            .keys()
            .filter(|k| !new.contains_key(k.as_str()))
            .cloned()
            .collect(),
    }
}
