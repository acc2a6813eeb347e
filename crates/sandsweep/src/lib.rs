//! sandsweep - sandbox account resource destroyer
//!
//! Scans every configured region for every known resource kind, applies the
//! layered target/exclude/filter policy, then repeatedly issues delete
//! requests until the account is empty or no further progress is possible.
//!
//! ## Modules
//!
//! - `aws`: lazy SDK sessions, account identity, error classification
//! - `resource`: capability contract, adapter registry, built-in adapters
//! - `region`: per-region handle with a lazily created session
//! - `queue`: the item state machine and the scan queue
//! - `resolver`: resource-type selection across configuration layers
//! - `scan`: concurrent per-(region, kind) enumeration
//! - `sweeper`: the run loop driving items to a terminal state

pub mod aws;
pub mod queue;
pub mod region;
pub mod resolver;
pub mod resource;
pub mod scan;
pub mod sweeper;

pub use queue::{Item, ItemState, Queue};
pub use region::Region;
pub use resolver::{resolve_resource_types, ResolveError};
pub use resource::{Lister, Properties, PropertyError, Registry, Resource, SelfFilter};
pub use sweeper::{RunError, Sweeper, SweeperParams};
