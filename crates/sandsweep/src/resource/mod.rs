//! Resource capability contract and adapter registry
//!
//! Every resource kind is backed by an adapter: a [`Lister`] that enumerates
//! instances in a region, producing [`Resource`] handles that can remove
//! themselves. Optional capabilities (self-filtering, typed properties, the
//! feature-flag sink) are probed at runtime, so each capability stays an
//! independent interface rather than a rung on an inheritance ladder.

pub mod ec2;
pub mod iam;
pub mod s3;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use thiserror::Error;

use sandsweep_common::{Collection, FeatureFlags};

use crate::region::Region;

/// One resource instance that can be deleted.
///
/// `remove` must be idempotent: the resource may already be mid-deletion or
/// gone entirely, and a "not found" answer from the provider counts as
/// success.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Request deletion of this instance.
    async fn remove(&self) -> Result<()>;

    /// Stable identity of this instance within its (region, kind).
    fn id(&self) -> String;

    /// Self-filter capability, when the adapter can declare instances
    /// untouchable (provider-managed defaults and the like).
    fn self_filter(&self) -> Option<&dyn SelfFilter> {
        None
    }

    /// Typed property capability for config filters.
    fn properties(&self) -> Option<&dyn Properties> {
        None
    }

    /// Feature-flag sink; adapters that care override this.
    fn set_feature_flags(&mut self, _flags: &FeatureFlags) {}
}

/// Optional capability: declare an instance untouchable.
pub trait SelfFilter: Send + Sync {
    /// `Ok(Some(reason))` when the provider refuses to delete this instance.
    /// Errors are swallowed by the engine and treated as "not protected" so
    /// a flaky provider call can never veto the run.
    fn protected(&self) -> Result<Option<String>>;
}

/// Property extraction failed.
#[derive(Debug, Error)]
pub enum PropertyError {
    /// The adapter does not know this property; the filter rule is skipped.
    #[error("unsupported property {0:?}")]
    Unsupported(String),

    /// The adapter failed to produce a value it should know; aborts the scan.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Optional capability: named scalar attributes for config filters.
pub trait Properties: Send + Sync {
    fn get(&self, name: &str) -> Result<String, PropertyError>;
}

/// Per-kind enumeration of all instances in a region.
#[async_trait]
pub trait Lister: Send + Sync {
    async fn list(&self, region: &Region) -> Result<Vec<Box<dyn Resource>>>;
}

/// Whether a kind's provider service is regional or account-global.
///
/// Global kinds are scanned once, through the `global` pseudo-region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceScope {
    Regional,
    Global,
}

/// A registered resource kind.
pub struct Registration {
    /// Kind name used in targets, excludes, and filters.
    pub name: &'static str,
    /// Provider service backing this kind.
    pub service: &'static str,
    pub scope: ServiceScope,
    pub lister: Arc<dyn Lister>,
}

/// Registry of resource kinds, keyed by kind name.
///
/// The builtin registry is populated once at startup and never mutated
/// afterwards; tests assemble their own.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<&'static str, Registration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind. Panics on duplicates, which are programming errors
    /// in adapter setup.
    pub fn register(&mut self, registration: Registration) {
        let name = registration.name;
        if self.entries.insert(name, registration).is_some() {
            panic!("resource kind {name:?} registered twice");
        }
    }

    /// All registered kind names, in deterministic order.
    pub fn lister_names(&self) -> Collection {
        self.entries.keys().copied().collect()
    }

    pub fn lister(&self, name: &str) -> Option<Arc<dyn Lister>> {
        self.entries.get(name).map(|r| r.lister.clone())
    }

    /// The provider service backing a kind, or `None` for unknown kinds.
    pub fn service_type(&self, name: &str) -> Option<&'static str> {
        self.entries.get(name).map(|r| r.service)
    }

    pub fn scope(&self, name: &str) -> Option<ServiceScope> {
        self.entries.get(name).map(|r| r.scope)
    }

    /// Whether a kind is offered in the given region.
    pub fn offered_in(&self, name: &str, region: &Region) -> bool {
        match self.scope(name) {
            Some(ServiceScope::Global) => region.is_global(),
            Some(ServiceScope::Regional) => !region.is_global(),
            None => false,
        }
    }
}

/// The process-wide registry of built-in adapters.
pub fn builtin() -> &'static Arc<Registry> {
    static BUILTIN: Lazy<Arc<Registry>> = Lazy::new(|| {
        let mut registry = Registry::new();
        registry.register(Registration {
            name: "EC2Instance",
            service: "ec2",
            scope: ServiceScope::Regional,
            lister: Arc::new(ec2::Ec2InstanceLister),
        });
        registry.register(Registration {
            name: "EC2SecurityGroup",
            service: "ec2",
            scope: ServiceScope::Regional,
            lister: Arc::new(ec2::Ec2SecurityGroupLister),
        });
        registry.register(Registration {
            name: "S3Bucket",
            service: "s3",
            scope: ServiceScope::Regional,
            lister: Arc::new(s3::S3BucketLister),
        });
        registry.register(Registration {
            name: "IAMRole",
            service: "iam",
            scope: ServiceScope::Global,
            lister: Arc::new(iam::IamRoleLister),
        });
        registry.register(Registration {
            name: "IAMInstanceProfile",
            service: "iam",
            scope: ServiceScope::Global,
            lister: Arc::new(iam::IamInstanceProfileLister),
        });
        Arc::new(registry)
    });
    &BUILTIN
}
