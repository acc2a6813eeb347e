//! The run loop
//!
//! Drives every queued item through its state machine: request removal,
//! poll for disappearance, retry failures, and stop when the queue reaches a
//! terminal composition or no further progress is possible. Deletion order
//! is deliberately unordered; cross-resource dependencies resolve because
//! failed removals are retried on later sweeps once their dependents are
//! gone.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use sandsweep_common::{Collection, Config, Filter};

use crate::aws::Account;
use crate::queue::{Item, ItemState, Queue};
use crate::region::Region;
use crate::resolver::resolve_resource_types;
use crate::resource::{PropertyError, Registry, Resource};
use crate::scan;

/// Pause between sweeps; provider teardown is rarely faster than this.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// No-progress sweeps tolerated before the remaining failures are declared
/// permanent. Dependencies may need a sweep or two to drain.
const FAIL_STALL_LIMIT: u32 = 2;

/// Terminal errors of the run loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("resources are stuck in failed state and nothing is left to delete")]
    FailStall,

    #[error("max wait retries of {0} exceeded")]
    WaitStall(u32),

    #[error("interrupted")]
    Cancelled,
}

/// Command-line layer of the run: kind selection and behavior switches.
#[derive(Debug, Clone, Default)]
pub struct SweeperParams {
    pub targets: Collection,
    pub excludes: Collection,
    /// Actually delete. Off by default: scan, print, exit.
    pub no_dry_run: bool,
    /// Suppress printing of filtered items.
    pub quiet: bool,
    /// Abort after this many sweeps that only poll (0 disables).
    pub max_wait_retries: u32,
}

/// The engine: owns the queue and drives it to termination.
pub struct Sweeper {
    params: SweeperParams,
    config: Config,
    account: Account,
    registry: Arc<Registry>,
    regions: Vec<Arc<Region>>,
    items: Queue,
}

/// Per-sweep cache of list results, keyed by (region, kind).
///
/// Rebuilt every sweep, so many items of one kind cost a single list call
/// and the next sweep still sees fresh state.
type ListCache = HashMap<(String, String), Vec<Box<dyn Resource>>>;

/// Outcome of one existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// The resource is still listed.
    Present,
    /// Still listed, and the adapter now declares it untouchable; the item
    /// must not be finished off on the provider's behalf.
    Protected,
    /// No longer listed; the item is finished.
    Gone,
    /// The list call failed; the item is marked failed instead.
    Unknown,
}

impl Sweeper {
    pub fn new(
        params: SweeperParams,
        config: Config,
        account: Account,
        registry: Arc<Registry>,
        regions: Vec<Arc<Region>>,
    ) -> Self {
        Self {
            params,
            config,
            account,
            registry,
            regions,
            items: Queue::new(),
        }
    }

    /// The queue produced by the last scan.
    pub fn queue(&self) -> &Queue {
        &self.items
    }

    /// Validate, scan, and (unless this is a dry run) delete until done.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.config
            .validate_account(self.account.id(), self.account.aliases())?;

        println!(
            "Sweeping account {} (alias '{}').",
            self.account.id(),
            self.account.alias()
        );
        println!();

        self.scan(cancel).await?;
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled.into());
        }

        if self.items.count(&[ItemState::New]) == 0 {
            println!("No resources to delete.");
            return Ok(());
        }

        if !self.params.no_dry_run {
            println!(
                "The above resources would be deleted with the supplied configuration. \
                 Provide --no-dry-run to actually destroy them."
            );
            return Ok(());
        }

        let mut fail_stall = 0u32;
        let mut wait_stall = 0u32;

        loop {
            self.sweep(cancel).await;
            if cancel.is_cancelled() {
                return Err(RunError::Cancelled.into());
            }

            // Only failures left and none of them budged: count down to a
            // permanent-failure abort, tolerating sweeps where a dependency
            // might still drain.
            if self
                .items
                .count(&[ItemState::Pending, ItemState::Waiting, ItemState::New])
                == 0
                && self.items.count(&[ItemState::Failed]) > 0
            {
                if fail_stall >= FAIL_STALL_LIMIT {
                    error!("Resources are stuck in failed state and nothing is left to delete");
                    println!();
                    for item in self.items.iter().filter(|i| i.state() == ItemState::Failed) {
                        item.print();
                        error!("{}", item.reason());
                    }
                    return Err(RunError::FailStall.into());
                }
                fail_stall += 1;
            } else {
                fail_stall = 0;
            }

            // Nothing new to request, only polling: the provider may simply
            // be slow, but the operator can bound the patience.
            if self.params.max_wait_retries != 0
                && self.items.count(&[ItemState::Waiting, ItemState::Pending]) > 0
                && self.items.count(&[ItemState::New]) == 0
            {
                if wait_stall >= self.params.max_wait_retries {
                    return Err(RunError::WaitStall(self.params.max_wait_retries).into());
                }
                wait_stall += 1;
            } else {
                wait_stall = 0;
            }

            if self.items.count(&[
                ItemState::New,
                ItemState::Pending,
                ItemState::Failed,
                ItemState::Waiting,
            ]) == 0
            {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                _ = cancel.cancelled() => return Err(RunError::Cancelled.into()),
            }
        }

        println!(
            "Sweep complete: {} failed, {} skipped, {} finished.",
            self.items.count(&[ItemState::Failed]),
            self.items.count(&[ItemState::Filtered]),
            self.items.count(&[ItemState::Finished]),
        );
        println!();

        Ok(())
    }

    /// Enumerate, filter, print, and queue everything the policy selects.
    async fn scan(&mut self, cancel: &CancellationToken) -> Result<()> {
        let account_selection = self.config.resource_types_for(self.account.id());
        let kinds = resolve_resource_types(
            &self.registry.lister_names(),
            &[
                self.params.targets.clone(),
                self.config.resource_types.targets.clone(),
                account_selection.targets,
            ],
            &[
                self.params.excludes.clone(),
                self.config.resource_types.excludes.clone(),
                account_selection.excludes,
            ],
        )?;
        debug!(kinds = %kinds, "Effective resource types");

        let filters = self.config.filters(self.account.id())?;

        let discovered =
            scan::scan(Arc::clone(&self.registry), &self.regions, &kinds, cancel).await;

        let mut queue = Queue::new();
        for mut item in discovered {
            item.apply_feature_flags(&self.config.feature_flags);
            filter_item(&mut item, &filters)?;
            if item.state() != ItemState::Filtered || !self.params.quiet {
                item.print();
            }
            queue.push(item);
        }

        println!();
        println!(
            "Scan complete: {} total, {} nukeable, {} filtered.",
            queue.count_total(),
            queue.count(&[ItemState::New]),
            queue.count(&[ItemState::Filtered]),
        );
        println!();

        self.items = queue;
        Ok(())
    }

    /// One pass over every item.
    async fn sweep(&mut self, cancel: &CancellationToken) {
        let mut cache = ListCache::new();
        let Self {
            items, registry, ..
        } = self;

        for item in items.iter_mut() {
            if cancel.is_cancelled() {
                break;
            }
            match item.state() {
                ItemState::New => {
                    request_removal(item).await;
                    item.print();
                }
                ItemState::Failed => {
                    // The earlier failure may have been transient, and the
                    // resource may meanwhile be gone through someone else's
                    // doing; both paths are checked every sweep.
                    request_removal(item).await;
                    check_presence(registry, item, &mut cache).await;
                    item.print();
                }
                ItemState::Pending => {
                    if check_presence(registry, item, &mut cache).await == Presence::Present {
                        item.transition(ItemState::Waiting, "waiting for provider deletion");
                    }
                    item.print();
                }
                ItemState::Waiting => {
                    check_presence(registry, item, &mut cache).await;
                    item.print();
                }
                ItemState::Filtered | ItemState::Finished => {}
            }
        }

        println!();
        println!(
            "Removal requested: {} waiting, {} failed, {} skipped, {} finished",
            self.items.count(&[ItemState::Waiting, ItemState::Pending]),
            self.items.count(&[ItemState::Failed]),
            self.items.count(&[ItemState::Filtered]),
            self.items.count(&[ItemState::Finished]),
        );
        println!();
    }
}

/// Scan-time filter pass: adapter self-filter first, then config rules.
fn filter_item(item: &mut Item, filters: &BTreeMap<String, Vec<Filter>>) -> Result<()> {
    if let Some(checker) = item.resource().self_filter() {
        match checker.protected() {
            Ok(Some(reason)) => {
                item.transition(ItemState::Filtered, reason);
                return Ok(());
            }
            Ok(None) => {}
            Err(err) => {
                // Could be a failed provider request; not grounds to block
                // the whole run.
                debug!(error = ?err, "Self-filter check failed, treating as not filtered");
            }
        }
    }

    let Some(rules) = filters.get(item.kind()) else {
        return Ok(());
    };
    for rule in rules {
        let value = match item.get_property(&rule.property) {
            Ok(value) => value,
            Err(PropertyError::Unsupported(property)) => {
                debug!(kind = %item.kind(), property = %property, "Property not supported, rule skipped");
                continue;
            }
            Err(PropertyError::Other(err)) => {
                return Err(err.context(format!(
                    "failed to read property {:?} of kind {:?}",
                    rule.property,
                    item.kind()
                )));
            }
        };

        let mut matched = rule
            .matches(&value)
            .with_context(|| format!("invalid filter for kind {:?}", item.kind()))?;
        if rule.invert {
            matched = !matched;
        }
        if matched {
            item.transition(ItemState::Filtered, "filtered by config");
            return Ok(());
        }
    }

    Ok(())
}

/// Issue the delete request and record the outcome.
async fn request_removal(item: &mut Item) {
    match item.resource().remove().await {
        Ok(()) => item.transition(ItemState::Pending, "removal requested"),
        Err(err) => item.transition(ItemState::Failed, format!("{err:#}")),
    }
}

/// Re-check whether the item's resource is still listed, going through the
/// per-sweep cache so each (region, kind) is listed at most once per sweep.
async fn check_presence(
    registry: &Arc<Registry>,
    item: &mut Item,
    cache: &mut ListCache,
) -> Presence {
    let key = (
        item.region().name().to_string(),
        item.kind().to_string(),
    );
    let current = match cache.entry(key) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => match item.list(registry).await {
            Ok(resources) => entry.insert(resources),
            Err(err) => {
                item.transition(ItemState::Failed, format!("{err:#}"));
                return Presence::Unknown;
            }
        },
    };

    for resource in current.iter() {
        if item.equals(resource.as_ref()) {
            if let Some(checker) = resource.self_filter() {
                if let Ok(Some(reason)) = checker.protected() {
                    debug!(id = %resource.id(), reason = %reason, "Resource is now provider-protected");
                    return Presence::Protected;
                }
            }
            return Presence::Present;
        }
    }

    item.transition(ItemState::Finished, "removed");
    Presence::Gone
}
