//! Applying resolved values to a catalog.

use crate::catalog::Catalog;
use crate::flatten::{unflatten_into, StructuralConflict};
use tracing::warn;

/// What one [`apply`] call did to a catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Units written into the catalog
    pub applied: usize,
    /// Units whose write changed the catalog's content
    pub changed: usize,
    pub conflicts: Vec<StructuralConflict>,
}

impl MergeSummary {
    /// True when the catalog content is unchanged and need not be saved.
    pub fn is_noop(&self) -> bool {
        self.changed == 0
    }
}

/// Merge each `(path, value)` into `catalog` without touching other paths.
///
/// Applying nothing leaves the catalog, and therefore its serialized form,
/// untouched.
pub fn apply<I>(catalog: &mut Catalog, resolved: I) -> MergeSummary
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut summary = MergeSummary::default();
    for (path, value) in resolved {
        if catalog.leaf(&path) != Some(value.as_str()) {
            summary.changed += 1;
        }
        let conflicts = unflatten_into(catalog.root_mut(), &path, value);
        for conflict in &conflicts {
            warn!("{}: structural conflict, {}", catalog.locale(), conflict);
        }
        summary.conflicts.extend(conflicts);
        summary.applied += 1;
    }
    summary
}
