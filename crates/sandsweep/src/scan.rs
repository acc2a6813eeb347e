//! Concurrent resource enumeration
//!
//! Every (region, kind) pair is listed concurrently; results flow through a
//! bounded channel to a single aggregator which restores a deterministic
//! order before the items are filtered and printed. Ordering within a kind
//! is whatever the provider returned.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sandsweep_common::Collection;

use crate::queue::Item;
use crate::region::Region;
use crate::resource::{Registry, Resource};

type Batch = (usize, usize, Arc<Region>, String, Vec<Box<dyn Resource>>);

/// Enumerate all offered (region, kind) pairs and return the discovered
/// resources as items in discovery state, ordered by
/// (region index, kind index, provider order).
///
/// Listing failures are reported and skip that pair; kinds whose service is
/// not offered in a region are skipped silently.
pub async fn scan(
    registry: Arc<Registry>,
    regions: &[Arc<Region>],
    kinds: &Collection,
    cancel: &CancellationToken,
) -> Vec<Item> {
    let mut pairs: Vec<(usize, Arc<Region>, usize, String)> = Vec::new();
    for (region_idx, region) in regions.iter().enumerate() {
        for (kind_idx, kind) in kinds.iter().enumerate() {
            if !registry.offered_in(kind, region) {
                debug!(region = %region, kind = %kind, "Service not offered, skipping");
                continue;
            }
            pairs.push((region_idx, Arc::clone(region), kind_idx, kind.to_string()));
        }
    }

    // One worker per region is gentle enough on provider rate limits while
    // kinds within a region still interleave.
    let workers = regions.len().max(1);
    let (tx, mut rx) = mpsc::channel::<Batch>(workers);

    let producer = {
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        async move {
            futures::stream::iter(pairs)
                .for_each_concurrent(workers, |(region_idx, region, kind_idx, kind)| {
                    let tx = tx.clone();
                    let registry = Arc::clone(&registry);
                    let cancel = cancel.clone();
                    async move {
                        let Some(lister) = registry.lister(&kind) else {
                            return;
                        };
                        let result = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return,
                            result = lister.list(&region) => result,
                        };
                        match result {
                            Ok(resources) => {
                                let _ = tx
                                    .send((region_idx, kind_idx, region, kind, resources))
                                    .await;
                            }
                            Err(err) => {
                                warn!(
                                    region = %region,
                                    kind = %kind,
                                    error = ?err,
                                    "Listing failed, skipping"
                                );
                            }
                        }
                    }
                })
                .await;
        }
    };

    let aggregator = async {
        let mut batches: Vec<Batch> = Vec::new();
        while let Some(batch) = rx.recv().await {
            batches.push(batch);
        }
        batches
    };

    let ((), mut batches) = tokio::join!(producer, aggregator);

    batches.sort_by_key(|(region_idx, kind_idx, ..)| (*region_idx, *kind_idx));

    let mut items = Vec::new();
    for (_, _, region, kind, resources) in batches {
        for resource in resources {
            items.push(Item::new(kind.clone(), Arc::clone(&region), resource));
        }
    }
    items
}
