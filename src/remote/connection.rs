//! Reachability state of the remote integration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Current reachability of the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
  #[default]
  Disconnected,
  /// Only while `initialize` is in flight
  Connecting,
  Connected,
  /// Remote unreachable at startup; simulated data is the steady state
  Mock,
  /// Requests started failing after a successful connection
  Error,
}

impl ConnectionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ConnectionStatus::Disconnected => "disconnected",
      ConnectionStatus::Connecting => "connecting",
      ConnectionStatus::Connected => "connected",
      ConnectionStatus::Mock => "mock",
      ConnectionStatus::Error => "error",
    }
  }

  /// Transition table.
  pub fn next(self, event: ConnectionEvent) -> ConnectionStatus {
    use ConnectionEvent as E;
    use ConnectionStatus as S;

    match (self, event) {
      (_, E::InitializeStarted) => S::Connecting,
      (S::Connecting, E::InitializeSucceeded) => S::Connected,
      (S::Connecting, E::InitializeFailed) => S::Mock,

      (S::Connected, E::RequestFailed) => S::Error,
      (S::Disconnected, E::RequestFailed) => S::Mock,
      (S::Error | S::Disconnected, E::RequestSucceeded) => S::Connected,

      (S::Connecting, E::RetestSucceeded | E::RetestFailed) => S::Connecting,
      (_, E::RetestSucceeded) => S::Connected,
      (S::Connected, E::RetestFailed) => S::Error,
      (S::Disconnected, E::RetestFailed) => S::Mock,

      (current, _) => current,
    }
  }
}

impl fmt::Display for ConnectionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Things that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
  InitializeStarted,
  InitializeSucceeded,
  InitializeFailed,
  /// A request succeeded (possibly after retries)
  RequestSucceeded,
  /// A request failed on every attempt
  RequestFailed,
  /// An explicit health re-check succeeded
  RetestSucceeded,
  RetestFailed,
}

/// Shared, observable connection status for one remote integration.
#[derive(Debug, Clone)]
pub struct ConnectionState {
  tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl Default for ConnectionState {
  fn default() -> Self {
    Self::new()
  }
}

impl ConnectionState {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(ConnectionStatus::Disconnected);
    Self { tx: Arc::new(tx) }
  }

  pub fn status(&self) -> ConnectionStatus {
    *self.tx.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
    self.tx.subscribe()
  }

  /// Apply `event` and return the resulting status.
  pub fn apply(&self, event: ConnectionEvent) -> ConnectionStatus {
    let mut from = ConnectionStatus::Disconnected;
    let mut to = ConnectionStatus::Disconnected;
    self.tx.send_if_modified(|status| {
      from = *status;
      to = status.next(event);
      *status = to;
      from != to
    });

    if from != to {
      tracing::info!(from = %from, to = %to, ?event, "connection status changed");
    }
    to
  }
}
