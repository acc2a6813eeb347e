//! The scan queue and the per-item state machine
//!
//! Every discovered resource becomes one [`Item`]. Items are appended during
//! the scan and mutated in place by the run loop until each reaches a
//! terminal state (`filtered` or `finished`) or the loop gives up.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::region::Region;
use crate::resource::{PropertyError, Registry, Resource};

/// Lifecycle state of one queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// Discovered, no removal requested yet
    New,
    /// Removal requested this sweep
    Pending,
    /// Removal requested earlier; polling until the provider lets go
    Waiting,
    /// Last removal request or existence check failed; retried next sweep
    Failed,
    /// Excluded by self-filter or config filter (terminal)
    Filtered,
    /// Confirmed gone (terminal)
    Finished,
}

impl ItemState {
    /// Terminal states are never left once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Filtered | ItemState::Finished)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::New => "new",
            ItemState::Pending => "pending",
            ItemState::Waiting => "waiting",
            ItemState::Failed => "failed",
            ItemState::Filtered => "filtered",
            ItemState::Finished => "finished",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource instance in the queue.
pub struct Item {
    state: ItemState,
    reason: String,
    kind: String,
    region: Arc<Region>,
    resource: Box<dyn Resource>,
}

impl Item {
    pub fn new(kind: impl Into<String>, region: Arc<Region>, resource: Box<dyn Resource>) -> Self {
        Self {
            state: ItemState::New,
            reason: String::new(),
            kind: kind.into(),
            region,
            resource,
        }
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    pub fn resource(&self) -> &dyn Resource {
        self.resource.as_ref()
    }

    /// Move to a new state, recording why. Terminal states are sticky: a
    /// transition attempt on a filtered or finished item is ignored.
    pub fn transition(&mut self, state: ItemState, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
        self.reason = reason.into();
    }

    /// Deliver global feature flags to the resource, when it takes them.
    pub fn apply_feature_flags(&mut self, flags: &sandsweep_common::FeatureFlags) {
        self.resource.set_feature_flags(flags);
    }

    /// Extract a named property. An empty name means the resource identity;
    /// resources without the properties capability support nothing else.
    pub fn get_property(&self, name: &str) -> Result<String, PropertyError> {
        if name.is_empty() {
            return Ok(self.resource.id());
        }
        match self.resource.properties() {
            Some(properties) => properties.get(name),
            None => Err(PropertyError::Unsupported(name.to_string())),
        }
    }

    /// Whether another handle refers to the same instance.
    pub fn equals(&self, other: &dyn Resource) -> bool {
        self.resource.id() == other.id()
    }

    /// Enumerate the current instances of this item's kind in its region.
    pub async fn list(&self, registry: &Registry) -> Result<Vec<Box<dyn Resource>>> {
        let lister = registry
            .lister(&self.kind)
            .ok_or_else(|| anyhow!("no lister registered for kind {:?}", self.kind))?;
        lister.list(&self.region).await
    }

    /// Render the one-line report for this item.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - [{}]",
            self.region,
            self.kind,
            self.resource.id(),
            self.state
        )?;
        if !self.reason.is_empty() {
            write!(f, " - {}", self.reason)?;
        }
        Ok(())
    }
}

/// Insertion-ordered collection of items produced by one scan.
///
/// Append-only; items mutate in place and are never removed or reordered, so
/// output stays deterministic across sweeps.
#[derive(Default)]
pub struct Queue {
    items: Vec<Item>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn count_total(&self) -> usize {
        self.items.len()
    }

    /// Number of items whose state is in the given set.
    pub fn count(&self, states: &[ItemState]) -> usize {
        self.items
            .iter()
            .filter(|item| states.contains(&item.state))
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.iter_mut()
    }
}
