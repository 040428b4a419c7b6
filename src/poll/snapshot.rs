use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{AutomationRule, NetworkDevice, ServiceDescriptor};
use crate::remote::{simulated, SecurityAlert, StorageSummary, SystemMetrics};

/// The independently polled remote resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
  SystemMetrics,
  Services,
  NetworkDevices,
  Storage,
  AutomationRules,
  SecurityAlerts,
}

impl ResourceClass {
  pub const ALL: [ResourceClass; 6] = [
    ResourceClass::SystemMetrics,
    ResourceClass::Services,
    ResourceClass::NetworkDevices,
    ResourceClass::Storage,
    ResourceClass::AutomationRules,
    ResourceClass::SecurityAlerts,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceClass::SystemMetrics => "system_metrics",
      ResourceClass::Services => "services",
      ResourceClass::NetworkDevices => "network_devices",
      ResourceClass::Storage => "storage",
      ResourceClass::AutomationRules => "automation_rules",
      ResourceClass::SecurityAlerts => "security_alerts",
    }
  }
}

impl fmt::Display for ResourceClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where a snapshot entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
  Live,
  Simulated,
  /// Loaded from the local store at startup
  Stored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamped<T> {
  pub data: T,
  pub fetched_at: DateTime<Utc>,
  pub source: DataSource,
}

/// One fetched resource, tagged by class.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
  SystemMetrics(SystemMetrics),
  Services(Vec<ServiceDescriptor>),
  NetworkDevices(Vec<NetworkDevice>),
  Storage(StorageSummary),
  AutomationRules(Vec<AutomationRule>),
  SecurityAlerts(Vec<SecurityAlert>),
}

impl ResourceData {
  pub fn class(&self) -> ResourceClass {
    match self {
      ResourceData::SystemMetrics(_) => ResourceClass::SystemMetrics,
      ResourceData::Services(_) => ResourceClass::Services,
      ResourceData::NetworkDevices(_) => ResourceClass::NetworkDevices,
      ResourceData::Storage(_) => ResourceClass::Storage,
      ResourceData::AutomationRules(_) => ResourceClass::AutomationRules,
      ResourceData::SecurityAlerts(_) => ResourceClass::SecurityAlerts,
    }
  }

  pub fn simulated<R: Rng + ?Sized>(class: ResourceClass, rng: &mut R) -> Self {
    match class {
      ResourceClass::SystemMetrics => ResourceData::SystemMetrics(simulated::system_metrics(rng)),
      ResourceClass::Services => ResourceData::Services(simulated::services(rng)),
      ResourceClass::NetworkDevices => ResourceData::NetworkDevices(simulated::devices(rng)),
      ResourceClass::Storage => ResourceData::Storage(simulated::storage(rng)),
      ResourceClass::AutomationRules => {
        ResourceData::AutomationRules(simulated::automation_rules(rng))
      }
      ResourceClass::SecurityAlerts => ResourceData::SecurityAlerts(simulated::security_alerts(rng)),
    }
  }
}

/// Aggregate read model the UI renders from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
  pub metrics: Option<Stamped<SystemMetrics>>,
  pub services: Option<Stamped<Vec<ServiceDescriptor>>>,
  pub devices: Option<Stamped<Vec<NetworkDevice>>>,
  pub storage: Option<Stamped<StorageSummary>>,
  pub automations: Option<Stamped<Vec<AutomationRule>>>,
  pub alerts: Option<Stamped<Vec<SecurityAlert>>>,
  /// Last failure per class; cleared by the class's next success
  pub errors: BTreeMap<ResourceClass, String>,
  pub last_refresh: Option<DateTime<Utc>>,
}

impl DashboardSnapshot {
  pub fn has(&self, class: ResourceClass) -> bool {
    match class {
      ResourceClass::SystemMetrics => self.metrics.is_some(),
      ResourceClass::Services => self.services.is_some(),
      ResourceClass::NetworkDevices => self.devices.is_some(),
      ResourceClass::Storage => self.storage.is_some(),
      ResourceClass::AutomationRules => self.automations.is_some(),
      ResourceClass::SecurityAlerts => self.alerts.is_some(),
    }
  }

  pub fn source(&self, class: ResourceClass) -> Option<DataSource> {
    match class {
      ResourceClass::SystemMetrics => self.metrics.as_ref().map(|s| s.source),
      ResourceClass::Services => self.services.as_ref().map(|s| s.source),
      ResourceClass::NetworkDevices => self.devices.as_ref().map(|s| s.source),
      ResourceClass::Storage => self.storage.as_ref().map(|s| s.source),
      ResourceClass::AutomationRules => self.automations.as_ref().map(|s| s.source),
      ResourceClass::SecurityAlerts => self.alerts.as_ref().map(|s| s.source),
    }
  }

  pub fn set(&mut self, data: ResourceData, source: DataSource, at: DateTime<Utc>) {
    fn stamp<T>(data: T, source: DataSource, at: DateTime<Utc>) -> Option<Stamped<T>> {
      Some(Stamped {
        data,
        fetched_at: at,
        source,
      })
    }

    match data {
      ResourceData::SystemMetrics(d) => self.metrics = stamp(d, source, at),
      ResourceData::Services(d) => self.services = stamp(d, source, at),
      ResourceData::NetworkDevices(d) => self.devices = stamp(d, source, at),
      ResourceData::Storage(d) => self.storage = stamp(d, source, at),
      ResourceData::AutomationRules(d) => self.automations = stamp(d, source, at),
      ResourceData::SecurityAlerts(d) => self.alerts = stamp(d, source, at),
    }
  }

  /// Record a live result and clear the class's error.
  pub fn record_success(&mut self, data: ResourceData, at: DateTime<Utc>) {
    self.errors.remove(&data.class());
    self.set(data, DataSource::Live, at);
  }

  /// Record a failure. The last good entry stays; an empty slot gets simulated data.
  pub fn record_failure<R: Rng + ?Sized>(
    &mut self,
    class: ResourceClass,
    error: String,
    at: DateTime<Utc>,
    rng: &mut R,
  ) {
    self.errors.insert(class, error);
    if !self.has(class) {
      self.set(ResourceData::simulated(class, rng), DataSource::Simulated, at);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  #[test]
  fn test_failure_keeps_last_good_entry() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut snapshot = DashboardSnapshot::default();
    let t0 = Utc::now();
    snapshot.record_success(ResourceData::Services(Vec::new()), t0);

    snapshot.record_failure(ResourceClass::Services, "HTTP 500".to_string(), Utc::now(), &mut rng);
    let services = snapshot.services.as_ref().unwrap();
    assert_eq!(services.source, DataSource::Live);
    assert_eq!(services.fetched_at, t0);
    assert!(services.data.is_empty());
    assert_eq!(snapshot.errors[&ResourceClass::Services], "HTTP 500");
  }

  #[test]
  fn test_failure_without_data_simulates_and_success_clears_error() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut snapshot = DashboardSnapshot::default();
    snapshot.record_failure(ResourceClass::Storage, "timeout".to_string(), Utc::now(), &mut rng);
    assert_eq!(snapshot.source(ResourceClass::Storage), Some(DataSource::Simulated));

    snapshot.record_success(
      ResourceData::Storage(StorageSummary { pools: Vec::new() }),
      Utc::now(),
    );
    assert_eq!(snapshot.source(ResourceClass::Storage), Some(DataSource::Live));
    assert!(snapshot.errors.is_empty());
  }
}
