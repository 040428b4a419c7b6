use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::NetworkDevice;

/// Host resource usage snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
  pub cpu_percent: f64,
  pub memory_percent: f64,
  pub disk_percent: f64,
  pub network_rx_kbps: f64,
  pub network_tx_kbps: f64,
  pub load_average: [f64; 3],
  pub uptime_seconds: u64,
  pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoragePool {
  pub name: String,
  pub total_bytes: u64,
  pub used_bytes: u64,
  pub healthy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSummary {
  pub pools: Vec<StoragePool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
  Low,
  Medium,
  High,
  Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
  pub id: String,
  pub severity: AlertSeverity,
  pub message: String,
  pub source: String,
  pub timestamp: DateTime<Utc>,
  #[serde(default)]
  pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
  Start,
  Stop,
  Restart,
}

impl ServiceAction {
  pub fn as_str(&self) -> &'static str {
    match self {
      ServiceAction::Start => "start",
      ServiceAction::Stop => "stop",
      ServiceAction::Restart => "restart",
    }
  }
}

impl fmt::Display for ServiceAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceActionResult {
  pub service_id: String,
  pub action: ServiceAction,
  pub accepted: bool,
  #[serde(default)]
  pub message: String,
  /// Set when the result was produced locally because the remote was unreachable
  #[serde(default)]
  pub simulated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
  pub devices: Vec<NetworkDevice>,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
}
