//! Groups pad identifiers into per-class buckets by name suffix.

use std::collections::{BTreeMap, BTreeSet};

use super::policy::{DEFAULT_CLASS, RetentionPolicy, has_class_suffix};

/// A named group of pads, consumed by exactly one worker group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassBucket {
    pub class: String,
    pub pads: Vec<String>,
}

impl ClassBucket {
    pub fn new(class: impl Into<String>, pads: Vec<String>) -> Self {
        Self {
            class: class.into(),
            pads,
        }
    }

    pub fn len(&self) -> usize {
        self.pads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }
}

/// Sort pads into buckets keyed by suffix.
///
/// A pad is appended to the bucket of every suffix it ends with (`-<suffix>`);
/// pads matching none go to `default`. Order within a bucket follows the
/// input order and no pad is dropped. The `default` entry in `suffixes`, if
/// present, is ignored for matching, and repeated suffixes count once.
pub fn group_by_suffixes<S: AsRef<str>>(
    pads: &[String],
    suffixes: &[S],
) -> BTreeMap<String, Vec<String>> {
    let suffixes: BTreeSet<&str> = suffixes
        .iter()
        .map(AsRef::as_ref)
        .filter(|suffix| *suffix != DEFAULT_CLASS && !suffix.is_empty())
        .collect();
    let mut sorted: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for pad in pads {
        let mut found = false;
        for &suffix in &suffixes {
            if has_class_suffix(pad, suffix) {
                sorted.entry(suffix.to_string()).or_default().push(pad.clone());
                found = true;
            }
        }
        if !found {
            sorted
                .entry(DEFAULT_CLASS.to_string())
                .or_default()
                .push(pad.clone());
        }
    }

    sorted
}

/// Group pads by the classes of a retention policy.
pub fn group_pads(pads: &[String], policy: &RetentionPolicy) -> Vec<ClassBucket> {
    let classes: Vec<&str> = policy.class_names().collect();
    group_by_suffixes(pads, &classes)
        .into_iter()
        .map(|(class, pads)| ClassBucket { class, pads })
        .collect()
}
