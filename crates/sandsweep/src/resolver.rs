//! Resource-type selection across configuration layers
//!
//! Targets and excludes arrive in three layers (command line, global config,
//! per-account config) and compose into the effective set of kinds the scan
//! considers. Names that match no registered kind abort the run; silently
//! ignoring a typo in an exclude would delete what the operator meant to
//! keep.

use thiserror::Error;

use sandsweep_common::Collection;

/// Errors from composing the effective kind set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Targets or excludes name kinds no adapter is registered for.
    #[error("unknown resource types: {0}")]
    UnknownKinds(Collection),
}

/// Compose the effective kind set.
///
/// Targets are the union of all non-empty target layers, defaulting to the
/// whole universe when every layer is empty. Excludes are the union of all
/// exclude layers. The result is `targets ∩ universe − excludes`.
pub fn resolve_resource_types(
    universe: &Collection,
    target_layers: &[Collection],
    exclude_layers: &[Collection],
) -> Result<Collection, ResolveError> {
    let mut targets = Collection::new();
    for layer in target_layers {
        targets = targets.union(layer);
    }
    let mut excludes = Collection::new();
    for layer in exclude_layers {
        excludes = excludes.union(layer);
    }

    let unknown = targets.union(&excludes).difference(universe);
    if !unknown.is_empty() {
        return Err(ResolveError::UnknownKinds(unknown));
    }

    if targets.is_empty() {
        targets = universe.clone();
    }

    Ok(targets.intersect(universe).difference(&excludes))
}
