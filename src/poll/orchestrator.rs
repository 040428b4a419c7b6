use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::snapshot::{DashboardSnapshot, DataSource, ResourceClass, ResourceData};
use crate::error::RemoteError;
use crate::remote::{ConnectionEvent, ConnectionStatus, RemoteClient, Transport};

/// Poll period per resource class, plus the recovery probe period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingIntervals {
  pub system_metrics: Duration,
  pub services: Duration,
  pub network_devices: Duration,
  pub storage: Duration,
  pub automation_rules: Duration,
  pub security_alerts: Duration,
  pub recovery_probe: Duration,
}

impl Default for PollingIntervals {
  fn default() -> Self {
    Self {
      system_metrics: Duration::from_secs(5),
      services: Duration::from_secs(30),
      network_devices: Duration::from_secs(60),
      storage: Duration::from_secs(60),
      automation_rules: Duration::from_secs(60),
      security_alerts: Duration::from_secs(30),
      recovery_probe: Duration::from_secs(30),
    }
  }
}

impl PollingIntervals {
  pub fn of(&self, class: ResourceClass) -> Duration {
    match class {
      ResourceClass::SystemMetrics => self.system_metrics,
      ResourceClass::Services => self.services,
      ResourceClass::NetworkDevices => self.network_devices,
      ResourceClass::Storage => self.storage,
      ResourceClass::AutomationRules => self.automation_rules,
      ResourceClass::SecurityAlerts => self.security_alerts,
    }
  }
}

/// Outcome of one `refresh_all` batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
  pub succeeded: Vec<ResourceClass>,
  pub failed: BTreeMap<ResourceClass, String>,
  pub status: ConnectionStatus,
}

/// Periodic refresh of every resource class into a shared [`DashboardSnapshot`].
///
/// Pollers only fetch while the connection is `connected`. While it is `error`
/// the recovery probe runs a health check instead, so the remote is not hit on
/// every resource endpoint while it is down.
pub struct PollingOrchestrator<T: Transport> {
  client: Arc<RemoteClient<T>>,
  intervals: PollingIntervals,
  model: Arc<watch::Sender<DashboardSnapshot>>,
  pollers: Mutex<BTreeMap<ResourceClass, CancellationToken>>,
  probe: Mutex<Option<CancellationToken>>,
  root: CancellationToken,
}

impl<T: Transport> PollingOrchestrator<T> {
  pub fn new(client: Arc<RemoteClient<T>>, intervals: PollingIntervals) -> Self {
    let (tx, _rx) = watch::channel(DashboardSnapshot::default());
    Self {
      client,
      intervals,
      model: Arc::new(tx),
      pollers: Mutex::new(BTreeMap::new()),
      probe: Mutex::new(None),
      root: CancellationToken::new(),
    }
  }

  pub fn client(&self) -> &Arc<RemoteClient<T>> {
    &self.client
  }

  pub fn snapshot(&self) -> DashboardSnapshot {
    self.model.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
    self.model.subscribe()
  }

  pub fn is_polling(&self, class: ResourceClass) -> bool {
    self.lock_pollers().contains_key(&class)
  }

  /// Put data into the snapshot without fetching, e.g. stored inventories at startup.
  /// Classes that already hold data are left alone.
  pub fn seed(&self, data: ResourceData, source: DataSource) {
    let class = data.class();
    self.model.send_if_modified(|snapshot| {
      if snapshot.has(class) {
        return false;
      }
      snapshot.set(data, source, Utc::now());
      true
    });
  }

  /// Fill every empty class with simulated data.
  pub fn seed_simulated(&self) {
    let mut rng = rand::thread_rng();
    for class in ResourceClass::ALL {
      self.seed(ResourceData::simulated(class, &mut rng), DataSource::Simulated);
    }
  }

  pub fn start_polling(&self, class: ResourceClass) {
    let mut pollers = self.lock_pollers();
    if pollers.contains_key(&class) {
      return;
    }

    let token = self.root.child_token();
    let period = self.intervals.of(class);
    tokio::spawn(poll_loop(
      Arc::clone(&self.client),
      Arc::clone(&self.model),
      class,
      period,
      token.clone(),
    ));
    pollers.insert(class, token);
    tracing::debug!(resource = %class, period_secs = period.as_secs_f64(), "polling started");
  }

  /// Cancel the class's timer. A fetch already in flight finishes but its result is dropped.
  pub fn stop_polling(&self, class: ResourceClass) {
    if let Some(token) = self.lock_pollers().remove(&class) {
      token.cancel();
      tracing::debug!(resource = %class, "polling stopped");
    }
  }

  /// Start every class and the recovery probe.
  pub fn start_all(&self) {
    for class in ResourceClass::ALL {
      self.start_polling(class);
    }
    self.start_probe();
  }

  pub fn stop_all(&self) {
    for class in ResourceClass::ALL {
      self.stop_polling(class);
    }
    if let Some(token) = self.lock_probe().take() {
      token.cancel();
    }
  }

  fn start_probe(&self) {
    let mut probe = self.lock_probe();
    if probe.is_some() {
      return;
    }
    let token = self.root.child_token();
    tokio::spawn(probe_loop(
      Arc::clone(&self.client),
      self.intervals.recovery_probe,
      token.clone(),
    ));
    *probe = Some(token);
  }

  /// Fetch every class once, concurrently, regardless of the connection status.
  ///
  /// Any success leaves the connection `connected`; only a batch where every
  /// class failed counts as a failure. Each failing class keeps its last good
  /// entry and its own error.
  pub async fn refresh_all(&self) -> RefreshReport {
    let fetches = ResourceClass::ALL.map(|class| {
      let client = Arc::clone(&self.client);
      async move { (class, fetch(&client, class).await) }
    });
    let results = join_all(fetches).await;

    let now = Utc::now();
    let mut succeeded = Vec::new();
    let mut failed = BTreeMap::new();
    self.model.send_modify(|snapshot| {
      let mut rng = rand::thread_rng();
      for (class, result) in results {
        match result {
          Ok(data) => {
            snapshot.record_success(data, now);
            succeeded.push(class);
          }
          Err(e) => {
            snapshot.record_failure(class, e.to_string(), now, &mut rng);
            failed.insert(class, e.to_string());
          }
        }
      }
      snapshot.last_refresh = Some(now);
    });

    let event = if succeeded.is_empty() {
      ConnectionEvent::RetestFailed
    } else {
      ConnectionEvent::RetestSucceeded
    };
    let status = self.client.state().apply(event);
    tracing::info!(ok = succeeded.len(), failed = failed.len(), status = %status, "refresh complete");

    RefreshReport {
      succeeded,
      failed,
      status,
    }
  }

  fn lock_pollers(&self) -> std::sync::MutexGuard<'_, BTreeMap<ResourceClass, CancellationToken>> {
    self.pollers.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn lock_probe(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
    self.probe.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<T: Transport> Drop for PollingOrchestrator<T> {
  fn drop(&mut self) {
    self.root.cancel();
  }
}

async fn fetch<T: Transport>(
  client: &RemoteClient<T>,
  class: ResourceClass,
) -> Result<ResourceData, RemoteError> {
  Ok(match class {
    ResourceClass::SystemMetrics => ResourceData::SystemMetrics(client.try_system_metrics().await?),
    ResourceClass::Services => ResourceData::Services(client.try_services().await?),
    ResourceClass::NetworkDevices => ResourceData::NetworkDevices(client.try_devices().await?),
    ResourceClass::Storage => ResourceData::Storage(client.try_storage().await?),
    ResourceClass::AutomationRules => {
      ResourceData::AutomationRules(client.try_automation_rules().await?)
    }
    ResourceClass::SecurityAlerts => {
      ResourceData::SecurityAlerts(client.try_security_alerts().await?)
    }
  })
}

async fn poll_loop<T: Transport>(
  client: Arc<RemoteClient<T>>,
  model: Arc<watch::Sender<DashboardSnapshot>>,
  class: ResourceClass,
  period: Duration,
  cancel: CancellationToken,
) {
  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {}
    }

    let status = client.status();
    if status != ConnectionStatus::Connected {
      tracing::trace!(resource = %class, status = %status, "poll suspended");
      continue;
    }

    let result = fetch(&client, class).await;
    if cancel.is_cancelled() {
      tracing::debug!(resource = %class, "discarding result fetched after stop");
      break;
    }

    let now = Utc::now();
    model.send_modify(|snapshot| match result {
      Ok(data) => snapshot.record_success(data, now),
      Err(e) => {
        tracing::debug!(resource = %class, error = %e, "poll failed");
        snapshot.record_failure(class, e.to_string(), now, &mut rand::thread_rng());
      }
    });
  }
}

async fn probe_loop<T: Transport>(client: Arc<RemoteClient<T>>, period: Duration, cancel: CancellationToken) {
  let mut ticker = tokio::time::interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
  ticker.tick().await;

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {
        if client.status() == ConnectionStatus::Error {
          tracing::debug!("probing control API");
          client.retest().await;
        }
      }
    }
  }
}
