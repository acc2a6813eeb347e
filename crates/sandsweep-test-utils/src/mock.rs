//! Scripted mock resource kinds
//!
//! A [`MockKind`] owns the shared state of one fake resource kind: which
//! instances currently exist, how their `remove()` calls play out, and how
//! often listing and removal were invoked. Listers hand out fresh resource
//! handles on every call, the way real adapters do.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use sandsweep::resource::{
    Lister, Properties, PropertyError, Registration, Registry, Resource, SelfFilter, ServiceScope,
};
use sandsweep::Region;
use sandsweep_common::FeatureFlags;

/// Scripted definition of one mock instance.
#[derive(Debug, Clone)]
pub struct MockResourceSpec {
    id: String,
    properties: BTreeMap<String, String>,
    broken_properties: Vec<String>,
    protected: Option<String>,
    remove_script: Vec<Result<(), String>>,
    default_remove: Result<(), String>,
    linger: bool,
}

impl MockResourceSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
            broken_properties: Vec::new(),
            protected: None,
            remove_script: Vec::new(),
            default_remove: Ok(()),
            linger: false,
        }
    }

    /// Expose a named property to config filters.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Make extraction of a named property fail hard, unlike an unknown
    /// property which merely reports "unsupported".
    pub fn property_fails(mut self, name: impl Into<String>) -> Self {
        self.broken_properties.push(name.into());
        self
    }

    /// Make the adapter self-filter declare this instance untouchable.
    pub fn protected(mut self, reason: impl Into<String>) -> Self {
        self.protected = Some(reason.into());
        self
    }

    /// Script the outcomes of successive `remove()` calls; once drained the
    /// default outcome applies.
    pub fn remove_outcomes(mut self, outcomes: Vec<Result<(), String>>) -> Self {
        self.remove_script = outcomes;
        self
    }

    /// Every `remove()` call fails with this message.
    pub fn remove_always_fails(mut self, message: impl Into<String>) -> Self {
        self.default_remove = Err(message.into());
        self
    }

    /// `remove()` succeeds but the instance stays listed, like a provider
    /// whose teardown never completes.
    pub fn lingers(mut self) -> Self {
        self.linger = true;
        self
    }
}

struct InstanceState {
    spec: MockResourceSpec,
    exists: bool,
    remove_calls: u32,
    remove_script: VecDeque<Result<(), String>>,
    /// Protection reason that applies from the given list call onwards.
    protect_from: Option<(u32, String)>,
}

#[derive(Default)]
struct KindState {
    instances: Vec<InstanceState>,
    list_calls: u32,
    /// List call number to failure message.
    list_failures: BTreeMap<u32, String>,
    flags_seen: Vec<FeatureFlags>,
}

/// One fake resource kind with shared, scripted state.
#[derive(Clone, Default)]
pub struct MockKind {
    state: Arc<Mutex<KindState>>,
}

impl MockKind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance that currently exists.
    pub fn add(&self, spec: MockResourceSpec) {
        let remove_script = spec.remove_script.iter().cloned().collect();
        self.state.lock().unwrap().instances.push(InstanceState {
            spec,
            exists: true,
            remove_calls: 0,
            remove_script,
            protect_from: None,
        });
    }

    /// Make the nth `list()` call (1-indexed; the scan is call 1) fail.
    pub fn fail_list_call(&self, call: u32, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .list_failures
            .insert(call, message.into());
    }

    /// Number of `list()` calls so far, including failed ones.
    pub fn list_calls(&self) -> u32 {
        self.state.lock().unwrap().list_calls
    }

    /// Number of `remove()` calls the given instance received.
    pub fn remove_calls(&self, id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .instances
            .iter()
            .find(|i| i.spec.id == id)
            .map(|i| i.remove_calls)
            .unwrap_or(0)
    }

    /// Whether the instance still exists in the fake cloud.
    pub fn exists(&self, id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .instances
            .iter()
            .any(|i| i.spec.id == id && i.exists)
    }

    /// Feature flags delivered to resources of this kind during scans.
    pub fn flags_seen(&self) -> Vec<FeatureFlags> {
        self.state.lock().unwrap().flags_seen.clone()
    }

    /// Make an instance provider-protected starting with the nth `list()`
    /// call; earlier listings (typically the scan) hand out unprotected
    /// handles.
    pub fn protect_from_call(&self, id: &str, reason: impl Into<String>, call: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(instance) = state.instances.iter_mut().find(|i| i.spec.id == id) {
            instance.protect_from = Some((call, reason.into()));
        }
    }

    pub fn lister(&self) -> Arc<dyn Lister> {
        Arc::new(MockLister {
            state: Arc::clone(&self.state),
        })
    }
}

struct MockLister {
    state: Arc<Mutex<KindState>>,
}

#[async_trait]
impl Lister for MockLister {
    async fn list(&self, _region: &Region) -> Result<Vec<Box<dyn Resource>>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let call = state.list_calls;
        if let Some(message) = state.list_failures.remove(&call) {
            bail!(message);
        }
        let handles: Vec<Box<dyn Resource>> = state
            .instances
            .iter()
            .filter(|i| i.exists)
            .map(|i| {
                let protected = match &i.protect_from {
                    Some((from, reason)) if call >= *from => Some(reason.clone()),
                    _ => i.spec.protected.clone(),
                };
                Box::new(MockResource {
                    state: Arc::clone(&self.state),
                    id: i.spec.id.clone(),
                    properties: i.spec.properties.clone(),
                    broken_properties: i.spec.broken_properties.clone(),
                    protected,
                }) as Box<dyn Resource>
            })
            .collect();
        Ok(handles)
    }
}

struct MockResource {
    state: Arc<Mutex<KindState>>,
    id: String,
    properties: BTreeMap<String, String>,
    broken_properties: Vec<String>,
    protected: Option<String>,
}

#[async_trait]
impl Resource for MockResource {
    async fn remove(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let instance = state
            .instances
            .iter_mut()
            .find(|i| i.spec.id == self.id)
            .ok_or_else(|| anyhow!("unknown mock instance {:?}", self.id))?;
        instance.remove_calls += 1;
        let outcome = instance
            .remove_script
            .pop_front()
            .unwrap_or_else(|| instance.spec.default_remove.clone());
        match outcome {
            Ok(()) => {
                if !instance.spec.linger {
                    instance.exists = false;
                }
                Ok(())
            }
            Err(message) => Err(anyhow!(message)),
        }
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn self_filter(&self) -> Option<&dyn SelfFilter> {
        self.protected.as_ref().map(|_| self as &dyn SelfFilter)
    }

    fn properties(&self) -> Option<&dyn Properties> {
        Some(self)
    }

    fn set_feature_flags(&mut self, flags: &FeatureFlags) {
        self.state.lock().unwrap().flags_seen.push(*flags);
    }
}

impl SelfFilter for MockResource {
    fn protected(&self) -> Result<Option<String>> {
        Ok(self.protected.clone())
    }
}

impl Properties for MockResource {
    fn get(&self, name: &str) -> Result<String, PropertyError> {
        if self.broken_properties.iter().any(|n| n == name) {
            return Err(PropertyError::Other(anyhow!(
                "property {name:?} lookup failed"
            )));
        }
        self.properties
            .get(name)
            .cloned()
            .ok_or_else(|| PropertyError::Unsupported(name.to_string()))
    }
}

/// Assemble a registry of regional mock kinds.
pub fn registry_of(kinds: &[(&'static str, &MockKind)]) -> Arc<Registry> {
    let mut registry = Registry::new();
    for (name, kind) in kinds.iter().copied() {
        registry.register(Registration {
            name,
            service: "mock",
            scope: ServiceScope::Regional,
            lister: kind.lister(),
        });
    }
    Arc::new(registry)
}

/// A region handle that never opens a session.
pub fn test_region(name: &str) -> Arc<Region> {
    Arc::new(Region::new(name, None))
}
