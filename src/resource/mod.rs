//! Resource abstraction layer
//!
//! Resources are described declaratively: each kind is a static
//! [`ResourceDef`] naming its endpoints, its fields and how each field is
//! expanded to and flattened from the wire. One generic [`Reconciler`] then
//! drives any kind through Create/Read/Update/Delete/Import.
//!
//! # Architecture
//!
//! - [`schema`] - Resource definitions (fields, endpoints, timeouts)
//! - [`template`] - `{{var}}` path templates and import-ID parsing
//! - [`diff`] - Field and keyed collection diffs
//! - [`reconciler`] - The lifecycle state machine
//! - [`registry`] - Supported kinds by key
//!
//! # Example
//!
//! ```ignore
//! use gcp_reconciler::resource::{Instance, Reconciler};
//! use gcp_reconciler::resources::network_edge_security_service::NETWORK_EDGE_SECURITY_SERVICE;
//!
//! let reconciler = Reconciler::new(&NETWORK_EDGE_SECURITY_SERVICE, transport, poller, defaults, base_paths);
//! let mut svc = Instance::new(spec);
//! reconciler.create(&mut svc).await?;
//! ```

pub mod diff;
pub mod reconciler;
pub mod registry;
pub mod schema;
pub mod template;

pub use reconciler::{Instance, Phase, ReadOutcome, Reconciler};
pub use registry::{all_kinds, get_kind, kinds_table, KindInfo};
pub use schema::{
    check_one_of, expand, flatten, no_validation, Behavior, Collection, DefaultKey, Endpoint,
    Field, KeyedItem, OperationScope, ResourceDef, Timeouts, UpdateEndpoint,
};
