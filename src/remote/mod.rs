//! Resilient client for the homelab control API.
//!
//! This module provides:
//! - [`RemoteClient`]: timeout + retry around a [`Transport`], with accessors
//!   that fall back to simulated data instead of failing
//! - [`ConnectionState`]: the process-wide reachability state machine
//! - [`HttpTransport`]: the `reqwest` transport used in production

mod client;
mod connection;
mod retry;
pub mod simulated;
mod transport;
mod types;

pub use client::RemoteClient;
pub use connection::{ConnectionEvent, ConnectionState, ConnectionStatus};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Method, Request, Transport};
pub use types::{
  AlertSeverity, ScanReport, SecurityAlert, ServiceAction, ServiceActionResult, StoragePool,
  StorageSummary, SystemMetrics,
};

#[cfg(test)]
pub(crate) use transport::testing;
