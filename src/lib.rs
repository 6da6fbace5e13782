//! Declarative reconciler for Google Cloud resources
//!
//! A [`resource::Reconciler`] drives one kind of remote resource through
//! Create, Read, Update, Delete and Import against the Google REST APIs,
//! waiting on the asynchronous operations those APIs return. Kinds are
//! described declaratively in [`resources`].

pub mod config;
pub mod error;
pub mod gcp;
pub mod resource;
pub mod resources;
pub mod state;

pub use error::{PollError, ReconcileError, Result, TransportError};
pub use gcp::client::{BasePaths, GcpClient, ProviderDefaults, Transport};
pub use gcp::operation::{GcpOperationPoller, OperationPoller, PollSettings};
pub use resource::{Instance, Phase, ReadOutcome, Reconciler};
