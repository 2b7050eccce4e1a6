//! Key diffing between a reference catalog and a target catalog.
//!
//! All result sets are `BTreeSet`s so reporting and batch contents come out
//! in path order on every run.

use crate::catalog::{Catalog, Group, Node};
use crate::error::SyncError;
use crate::flatten::{join_path, FlatCatalog, SEPARATOR};
use regex::Regex;
use std::collections::BTreeSet;

/// Paths in `reference` that `target` lacks.
pub fn missing(reference: &FlatCatalog, target: &FlatCatalog) -> BTreeSet<String> {
    reference
        .keys()
        .filter(|path| !target.contains_key(*path))
        .cloned()
        .collect()
}

/// Paths whose target text is byte-identical to the reference text.
///
/// Empty reference strings never count; there is nothing to translate.
/// Paths for which `is_excluded` returns true are left out.
pub fn fallback_equal<F>(
    reference: &FlatCatalog,
    target: &FlatCatalog,
    is_excluded: F,
) -> BTreeSet<String>
where
    F: Fn(&str) -> bool,
{
    fallback_candidates(reference, target)
        .filter(|path| !is_excluded(path))
        .map(str::to_string)
        .collect()
}

fn fallback_candidates<'a>(
    reference: &'a FlatCatalog,
    target: &'a FlatCatalog,
) -> impl Iterator<Item = &'a str> + 'a {
    reference.iter().filter_map(move |(path, text)| {
        let equal = !text.is_empty() && target.get(path) == Some(text);
        equal.then_some(path.as_str())
    })
}

/// Everything the pipeline needs to know about one target locale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDiff {
    pub missing: BTreeSet<String>,
    pub fallback_equal: BTreeSet<String>,
    /// Fallback-equal paths protected by the exclusion policy
    pub excluded: BTreeSet<String>,
}

impl KeyDiff {
    /// Diff `target` against `reference`.
    ///
    /// # Arguments
    /// * `reference` - Flattened reference catalog
    /// * `target` - Flattened target catalog
    /// * `policy` - Paths whose fallback-equal text is left alone
    /// * `detect_fallback` - When false only missing keys are reported
    pub fn compute(
        reference: &FlatCatalog,
        target: &FlatCatalog,
        policy: &ExclusionPolicy,
        detect_fallback: bool,
    ) -> Self {
        let missing = missing(reference, target);
        if !detect_fallback {
            return Self {
                missing,
                ..Self::default()
            };
        }

        let mut fallback_equal = BTreeSet::new();
        let mut excluded = BTreeSet::new();
        for path in fallback_candidates(reference, target) {
            if policy.matches(path) {
                excluded.insert(path.to_string());
            } else {
                fallback_equal.insert(path.to_string());
            }
        }

        Self {
            missing,
            fallback_equal,
            excluded,
        }
    }

    /// True when nothing needs resolving; excluded paths do not count.
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.fallback_equal.is_empty()
    }
}

/// Key path patterns whose fallback-equal text is intentionally untranslated
/// (product names and the like).
///
/// A pattern is a dotted prefix. A `*` inside a segment matches any run of
/// characters within that segment, so `products.*.name` covers
/// `products.p1.name` and everything below it.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    patterns: Vec<(String, Regex)>,
}

impl ExclusionPolicy {
    /// Compile `patterns`, skipping blank entries.
    ///
    /// Returns a configuration error for a pattern that fails to compile.
    pub fn new<I, S>(patterns: I) -> Result<Self, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            compiled.push((pattern.to_string(), compile_pattern(pattern)?));
        }
        Ok(Self { patterns: compiled })
    }

    /// True when no pattern was configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern covers `path`.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|(_, regex)| regex.is_match(path))
    }

    /// Patterns that match none of `paths`.
    pub fn unmatched<'a, I>(&self, paths: I) -> Vec<&str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let paths: Vec<&String> = paths.into_iter().collect();
        self.patterns
            .iter()
            .filter(|(_, regex)| !paths.iter().any(|path| regex.is_match(path)))
            .map(|(pattern, _)| pattern.as_str())
            .collect()
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, SyncError> {
    let segments: Vec<String> = pattern
        .split(SEPARATOR)
        .map(|segment| {
            segment
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join("[^.]*")
        })
        .collect();
    let source = format!(r"^{}(?:\..*)?$", segments.join(r"\."));
    Regex::new(&source).map_err(|e| {
        SyncError::configuration(format!("invalid exclusion pattern '{}': {}", pattern, e))
    })
}

/// Paths where the target holds a group but the reference holds a leaf or
/// nothing at all. These are leftovers of inconsistent writes.
///
/// Only the outermost offending group is reported.
pub fn find_drift(reference: &Group, target: &Group) -> Vec<String> {
    let mut drift = Vec::new();
    let mut stack: Vec<(String, &Group, &Group)> = vec![(String::new(), target, reference)];

    while let Some((prefix, target_group, reference_group)) = stack.pop() {
        for (key, node) in target_group {
            let Node::Group(child) = node else {
                continue;
            };
            let path = join_path(&prefix, key);
            match reference_group.get(key) {
                Some(Node::Group(reference_child)) => {
                    stack.push((path, child, reference_child));
                }
                Some(Node::Leaf(_)) | None => drift.push(path),
            }
        }
    }

    drift.sort();
    drift
}

/// Remove the given drift paths from `catalog`, returning how many existed.
pub fn prune_drift(catalog: &mut Catalog, paths: &[String]) -> usize {
    paths
        .iter()
        .filter(|path| catalog.remove(path).is_some())
        .count()
}
