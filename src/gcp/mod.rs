//! GCP API interaction module
//!
//! This module provides the collaborators the reconciler is built from:
//! authentication, the HTTP transport and asynchronous operation polling.
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens (ADC or a supplied token) and gcloud defaults
//! - [`client`] - The [`client::Transport`] trait and its production implementation
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operation`] - Generic operation polling
//!
//! # Example
//!
//! ```ignore
//! use gcp_reconciler::gcp::client::{GcpClient, Transport};
//! use gcp_reconciler::gcp::http::Method;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = GcpClient::from_environment().await?;
//!     let url = "https://compute.googleapis.com/compute/beta/projects/p/regions/r/securityPolicies/x";
//!     let policy = client.send(Method::Get, None, url, None).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operation;
