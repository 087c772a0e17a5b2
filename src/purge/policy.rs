//! Retention policy: maps pad classes to retention windows.
//!
//! A policy is parsed from a comma-separated list of `class:duration` pairs:
//!
//! ```text
//! default:720h,temp:24h,keep:8760h
//! ```
//!
//! A pad belongs to a class when its identifier ends with `-<class>`
//! (`notes-temp` is in `temp`). Pads matching no class fall back to
//! [`DEFAULT_CLASS`], which every policy must define.

use std::{collections::BTreeMap, time::Duration};

/// Name of the mandatory fallback class.
pub const DEFAULT_CLASS: &str = "default";

/// Policy parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("input string is empty")]
    EmptyInput,

    #[error("missing default expiration duration")]
    MissingDefault,
}

/// Immutable mapping from class name to retention duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    classes: BTreeMap<String, Duration>,
}

impl RetentionPolicy {
    /// Parse a policy from `class:duration` pairs.
    ///
    /// Malformed pairs are logged and skipped. Parsing fails only when the
    /// input is empty or no `default` entry survives.
    pub fn parse(spec: &str) -> Result<Self, PolicyError> {
        if spec.trim().is_empty() {
            return Err(PolicyError::EmptyInput);
        }

        let mut classes = BTreeMap::new();
        for entry in spec.split(',') {
            let fields: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [class, duration] = fields.as_slice() else {
                tracing::warn!(entry = %entry, "Skipping malformed retention entry");
                continue;
            };
            if class.is_empty() {
                tracing::warn!(entry = %entry, "Skipping retention entry without class name");
                continue;
            }
            match humantime::parse_duration(duration) {
                Ok(duration) => {
                    classes.insert(class.to_string(), duration);
                }
                Err(e) => {
                    tracing::warn!(
                        entry = %entry,
                        duration = %duration,
                        error = %e,
                        "Unable to parse retention duration, skipping entry"
                    );
                }
            }
        }

        if !classes.contains_key(DEFAULT_CLASS) {
            return Err(PolicyError::MissingDefault);
        }

        let policy = Self { classes };
        for (a, b) in policy.overlapping_classes() {
            tracing::warn!(
                class = %a,
                overlaps = %b,
                "Retention class suffixes overlap; the longer suffix takes precedence"
            );
        }
        Ok(policy)
    }

    /// Class names in sorted order, including `default`.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Configured retention duration of a class.
    pub fn duration(&self, class: &str) -> Option<Duration> {
        self.classes.get(class).copied()
    }

    /// Class a pad belongs to for retention purposes.
    ///
    /// When several class suffixes match, the longest one wins so that the
    /// result does not depend on iteration order.
    pub fn class_of<'a>(&'a self, pad_id: &str) -> &'a str {
        self.classes
            .keys()
            .filter(|class| class.as_str() != DEFAULT_CLASS && has_class_suffix(pad_id, class))
            .max_by_key(|class| class.len())
            .map(String::as_str)
            .unwrap_or(DEFAULT_CLASS)
    }

    /// Effective retention window of a pad, negated.
    ///
    /// The value is negative so that `now + window` is the cutoff: pads last
    /// edited before it are expired.
    pub fn effective_window(&self, pad_id: &str) -> chrono::Duration {
        let duration = self
            .duration(self.class_of(pad_id))
            .or_else(|| self.duration(DEFAULT_CLASS))
            .unwrap_or_default();
        // Durations beyond chrono's range (~292 million years) never expire.
        -chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
    }

    /// Pairs of classes whose suffixes are not mutually exclusive, i.e. a
    /// pad named for the first class also matches the second.
    pub fn overlapping_classes(&self) -> Vec<(&str, &str)> {
        let named: Vec<&str> = self
            .class_names()
            .filter(|class| *class != DEFAULT_CLASS)
            .collect();
        let mut overlaps = Vec::new();
        for a in &named {
            for b in &named {
                if a != b && has_class_suffix(&format!("-{a}"), b) {
                    overlaps.push((*a, *b));
                }
            }
        }
        overlaps
    }
}

/// Whether `pad_id` ends with `-<class>`.
pub(crate) fn has_class_suffix(pad_id: &str, class: &str) -> bool {
    pad_id
        .strip_suffix(class)
        .is_some_and(|rest| rest.ends_with('-'))
}
