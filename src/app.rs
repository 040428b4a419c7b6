//! The dashboard facade the UI talks to.
//!
//! [`Dashboard`] owns the collections, the remote client, the polling
//! orchestrator and the autosave scheduler for one execution context, and
//! gives them an explicit `start`/`shutdown` lifecycle.

use color_eyre::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::autosave::AutosaveScheduler;
use crate::backend::{KvBackend, SqliteBackend};
use crate::config::Config;
use crate::model::{AutomationRule, Entity, NetworkDevice, Note, ServiceDescriptor, Task};
use crate::poll::{
  DashboardSnapshot, DataSource, PollingIntervals, PollingOrchestrator, RefreshReport,
  ResourceClass, ResourceData,
};
use crate::remote::{
  ConnectionStatus, HttpTransport, RemoteClient, ServiceAction, ServiceActionResult, Transport,
};
use crate::store::{Collection, EntityStore, ErrorLog, ErrorLogEntry};
use crate::sync::{spawn_reconciler, ChangeBus, ContextId, NotifyingBackend};

pub const TASKS_KEY: &str = "tasks";
pub const NOTES_KEY: &str = "notes";
pub const SERVICES_KEY: &str = "services";
pub const DEVICES_KEY: &str = "network_devices";
pub const AUTOMATIONS_KEY: &str = "automation_rules";

/// Backend as seen by this context's collections.
pub type Shared<B> = NotifyingBackend<B>;

/// Tunables that are not part of the remote client itself.
#[derive(Debug, Clone)]
pub struct DashboardOptions {
  pub intervals: PollingIntervals,
  pub autosave_interval: Duration,
  pub cache_ttl: chrono::Duration,
  pub error_log_capacity: usize,
}

impl Default for DashboardOptions {
  fn default() -> Self {
    Self {
      intervals: PollingIntervals::default(),
      autosave_interval: Duration::from_secs(60),
      cache_ttl: chrono::Duration::minutes(5),
      error_log_capacity: 100,
    }
  }
}

impl DashboardOptions {
  pub fn from_config(config: &Config) -> Self {
    Self {
      intervals: config.polling.intervals(),
      autosave_interval: config.autosave.interval(),
      cache_ttl: chrono::Duration::seconds(config.storage.cache_ttl_secs),
      error_log_capacity: config.storage.error_log_capacity,
    }
  }
}

/// Collections the poller keeps in step with the remote inventories.
struct Inventories<B: KvBackend> {
  services: Arc<Collection<ServiceDescriptor, Shared<B>>>,
  devices: Arc<Collection<NetworkDevice, Shared<B>>>,
  automations: Arc<Collection<AutomationRule, Shared<B>>>,
}

impl<B: KvBackend> Clone for Inventories<B> {
  fn clone(&self) -> Self {
    Self {
      services: Arc::clone(&self.services),
      devices: Arc::clone(&self.devices),
      automations: Arc::clone(&self.automations),
    }
  }
}

pub struct Dashboard<B: KvBackend, T: Transport> {
  context: ContextId,
  bus: ChangeBus,
  store: Arc<EntityStore<Shared<B>>>,
  tasks: Arc<Collection<Task, Shared<B>>>,
  notes: Arc<Collection<Note, Shared<B>>>,
  inventories: Inventories<B>,
  poller: PollingOrchestrator<T>,
  autosave: AutosaveScheduler,
  cancel: CancellationToken,
  background: Vec<JoinHandle<()>>,
}

impl Dashboard<SqliteBackend, HttpTransport> {
  /// Wire everything from configuration: SQLite on disk, HTTP to the control API.
  pub fn from_config(config: &Config) -> Result<Self> {
    let backend = match &config.storage.path {
      Some(path) => SqliteBackend::open(path)?,
      None => SqliteBackend::open_default()?,
    }
    .with_quota(config.storage.quota_bytes);

    let transport = HttpTransport::new(
      config.remote.base_url()?,
      config.remote.api_key.clone(),
      config.remote.timeout(),
    )?;
    let client = RemoteClient::new(transport)
      .with_retry_policy(config.remote.retry_policy())
      .with_timeout(config.remote.timeout());

    Ok(Self::new(
      backend,
      ChangeBus::new(),
      client,
      DashboardOptions::from_config(config),
    ))
  }
}

impl<B: KvBackend, T: Transport> Dashboard<B, T> {
  /// Open every collection and seed the read model from what is stored.
  ///
  /// Contexts sharing `backend` should share `bus` so they see each other's writes.
  pub fn new(backend: B, bus: ChangeBus, client: RemoteClient<T>, options: DashboardOptions) -> Self {
    let context = ContextId::new();
    let store = Arc::new(
      EntityStore::new(NotifyingBackend::new(backend, bus.clone(), context))
        .with_cache_ttl(options.cache_ttl)
        .with_error_log(ErrorLog::new(options.error_log_capacity)),
    );

    let tasks = Arc::new(Collection::open(Arc::clone(&store), TASKS_KEY));
    let notes = Arc::new(Collection::open(Arc::clone(&store), NOTES_KEY));
    let inventories = Inventories {
      services: Arc::new(Collection::open(Arc::clone(&store), SERVICES_KEY)),
      devices: Arc::new(Collection::open(Arc::clone(&store), DEVICES_KEY)),
      automations: Arc::new(Collection::open(Arc::clone(&store), AUTOMATIONS_KEY)),
    };

    let poller = PollingOrchestrator::new(Arc::new(client), options.intervals);
    seed_stored(&poller, &inventories);

    let mut autosave = AutosaveScheduler::new(options.autosave_interval);
    autosave.register(tasks.clone());
    autosave.register(notes.clone());
    autosave.register(inventories.services.clone());
    autosave.register(inventories.devices.clone());
    autosave.register(inventories.automations.clone());

    tracing::info!(context = %context, "dashboard opened");
    Self {
      context,
      bus,
      store,
      tasks,
      notes,
      inventories,
      poller,
      autosave,
      cancel: CancellationToken::new(),
      background: Vec::new(),
    }
  }

  pub fn context(&self) -> ContextId {
    self.context
  }

  pub fn bus(&self) -> &ChangeBus {
    &self.bus
  }

  pub fn tasks(&self) -> &Collection<Task, Shared<B>> {
    &self.tasks
  }

  pub fn notes(&self) -> &Collection<Note, Shared<B>> {
    &self.notes
  }

  pub fn services(&self) -> &Collection<ServiceDescriptor, Shared<B>> {
    &self.inventories.services
  }

  pub fn devices(&self) -> &Collection<NetworkDevice, Shared<B>> {
    &self.inventories.devices
  }

  pub fn automations(&self) -> &Collection<AutomationRule, Shared<B>> {
    &self.inventories.automations
  }

  pub fn client(&self) -> &RemoteClient<T> {
    self.poller.client()
  }

  pub fn connection_status(&self) -> ConnectionStatus {
    self.poller.client().status()
  }

  pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
    self.poller.client().state().subscribe()
  }

  pub fn snapshot(&self) -> DashboardSnapshot {
    self.poller.snapshot()
  }

  pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
    self.poller.subscribe()
  }

  pub fn error_log(&self) -> Vec<ErrorLogEntry> {
    self.store.error_log().entries(self.store.backend())
  }

  /// Health-check the remote. In mock mode every empty view gets simulated data.
  pub async fn initialize(&self) -> ConnectionStatus {
    let status = self.poller.client().initialize().await;
    if status == ConnectionStatus::Mock {
      self.poller.seed_simulated();
    }
    status
  }

  pub async fn retest(&self) -> ConnectionStatus {
    self.poller.client().retest().await
  }

  pub async fn refresh_all(&self) -> RefreshReport {
    self.poller.refresh_all().await
  }

  pub async fn service_action(&self, service_id: &str, action: ServiceAction) -> ServiceActionResult {
    self.poller.client().service_action(service_id, action).await
  }

  /// Start polling, autosave, cross-context reconciliation and inventory mirroring.
  pub fn start(&mut self) {
    if !self.background.is_empty() {
      return;
    }

    self.cancel = CancellationToken::new();
    self.background = vec![
      spawn_reconciler(Arc::clone(&self.tasks), &self.bus, self.context, self.cancel.clone()),
      spawn_reconciler(Arc::clone(&self.notes), &self.bus, self.context, self.cancel.clone()),
      spawn_reconciler(
        Arc::clone(&self.inventories.services),
        &self.bus,
        self.context,
        self.cancel.clone(),
      ),
      spawn_reconciler(
        Arc::clone(&self.inventories.devices),
        &self.bus,
        self.context,
        self.cancel.clone(),
      ),
      spawn_reconciler(
        Arc::clone(&self.inventories.automations),
        &self.bus,
        self.context,
        self.cancel.clone(),
      ),
      spawn_mirror(self.poller.subscribe(), self.inventories.clone(), self.cancel.clone()),
    ];

    self.autosave.start();
    self.poller.start_all();
    tracing::info!(context = %self.context, "dashboard started");
  }

  /// Stop every timer, then flush whatever is still unsaved.
  pub async fn shutdown(&mut self) {
    self.poller.stop_all();
    self.autosave.stop();
    self.cancel.cancel();
    for handle in self.background.drain(..) {
      if let Err(e) = handle.await {
        tracing::error!(error = %e, "background task panicked");
      }
    }

    let flushed = self.autosave.flush_now().await;
    tracing::info!(context = %self.context, flushed, "dashboard shut down");
  }
}

impl<B: KvBackend, T: Transport> Drop for Dashboard<B, T> {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

fn seed_stored<B: KvBackend, T: Transport>(poller: &PollingOrchestrator<T>, inventories: &Inventories<B>) {
  let services = inventories.services.list();
  if !services.is_empty() {
    poller.seed(ResourceData::Services(services), DataSource::Stored);
  }
  let devices = inventories.devices.list();
  if !devices.is_empty() {
    poller.seed(ResourceData::NetworkDevices(devices), DataSource::Stored);
  }
  let automations = inventories.automations.list();
  if !automations.is_empty() {
    poller.seed(ResourceData::AutomationRules(automations), DataSource::Stored);
  }
}

/// Live inventories newer than the last ones mirrored.
#[derive(Default)]
struct LiveInventories {
  services: Option<Vec<ServiceDescriptor>>,
  devices: Option<Vec<NetworkDevice>>,
  automations: Option<Vec<AutomationRule>>,
}

impl LiveInventories {
  fn collect(
    snapshot: &DashboardSnapshot,
    seen: &mut BTreeMap<ResourceClass, chrono::DateTime<chrono::Utc>>,
  ) -> Self {
    let mut fresh = |class: ResourceClass, stamp: Option<(DataSource, chrono::DateTime<chrono::Utc>)>| {
      match stamp {
        Some((DataSource::Live, at)) if seen.get(&class).map_or(true, |last| at > *last) => {
          seen.insert(class, at);
          true
        }
        _ => false,
      }
    };

    let mut live = LiveInventories::default();
    if let Some(s) = &snapshot.services {
      if fresh(ResourceClass::Services, Some((s.source, s.fetched_at))) {
        live.services = Some(s.data.clone());
      }
    }
    if let Some(s) = &snapshot.devices {
      if fresh(ResourceClass::NetworkDevices, Some((s.source, s.fetched_at))) {
        live.devices = Some(s.data.clone());
      }
    }
    if let Some(s) = &snapshot.automations {
      if fresh(ResourceClass::AutomationRules, Some((s.source, s.fetched_at))) {
        live.automations = Some(s.data.clone());
      }
    }
    live
  }

  fn is_empty(&self) -> bool {
    self.services.is_none() && self.devices.is_none() && self.automations.is_none()
  }
}

impl<B: KvBackend> Inventories<B> {
  fn apply(&self, live: LiveInventories) {
    if let Some(services) = live.services {
      mirror_into(&self.services, services);
    }
    if let Some(devices) = live.devices {
      mirror_into(&self.devices, devices);
    }
    if let Some(automations) = live.automations {
      mirror_into(&self.automations, automations);
    }
  }
}

fn mirror_into<E: Entity, B: KvBackend>(collection: &Collection<E, Shared<B>>, items: Vec<E>) {
  match collection.replace_all(items) {
    Ok(true) => tracing::debug!(key = %collection.key(), "mirrored live inventory"),
    Ok(false) => {}
    Err(e) => tracing::warn!(key = %collection.key(), error = %e, "failed to mirror live inventory"),
  }
}

/// Persist each new live inventory so it survives a restart in mock mode.
fn spawn_mirror<B: KvBackend>(
  mut rx: watch::Receiver<DashboardSnapshot>,
  inventories: Inventories<B>,
  cancel: CancellationToken,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut seen = BTreeMap::new();
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        changed = rx.changed() => if changed.is_err() { break },
      }

      let live = LiveInventories::collect(&rx.borrow_and_update(), &mut seen);
      if live.is_empty() {
        continue;
      }
      let target = inventories.clone();
      if let Err(e) = tokio::task::spawn_blocking(move || target.apply(live)).await {
        tracing::error!(error = %e, "inventory mirror panicked");
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::MemoryBackend;
  use crate::model::ServiceStatus;
  use crate::remote::testing::ScriptedTransport;
  use crate::remote::RetryPolicy;
  use crate::store::StorageRecord;
  use serde_json::json;

  type TestDashboard = Dashboard<Arc<MemoryBackend>, Arc<ScriptedTransport>>;

  fn dashboard(backend: &Arc<MemoryBackend>, transport: &Arc<ScriptedTransport>) -> TestDashboard {
    let client = RemoteClient::new(Arc::clone(transport)).with_retry_policy(RetryPolicy::once());
    Dashboard::new(
      Arc::clone(backend),
      ChangeBus::new(),
      client,
      DashboardOptions::default(),
    )
  }

  fn serve_everything(transport: &ScriptedTransport) {
    transport
      .always("/health", Ok(json!({"status": "ok"})))
      .always(
        "/system/metrics",
        Ok(json!({
          "cpuPercent": 20.0, "memoryPercent": 40.0, "diskPercent": 50.0,
          "networkRxKbps": 1.0, "networkTxKbps": 1.0, "loadAverage": [0.1, 0.1, 0.1],
          "uptimeSeconds": 60, "timestamp": "2024-05-01T12:00:00Z"
        })),
      )
      .always("/services", Ok(json!([{"id": "svc-1", "name": "plex", "status": "running"}])))
      .always("/network/devices", Ok(json!([])))
      .always("/storage", Ok(json!({"pools": []})))
      .always("/automation/rules", Ok(json!([])))
      .always("/security/alerts", Ok(json!([])));
  }

  #[tokio::test(start_paused = true)]
  async fn test_mock_mode_serves_stored_then_simulated() {
    let backend = Arc::new(MemoryBackend::new());
    let stored = vec![json!({"id": "svc-9", "name": "nas", "status": "stopped"})];
    backend
      .set(SERVICES_KEY, &StorageRecord::new(stored).unwrap().encode().unwrap())
      .unwrap();

    let transport = Arc::new(ScriptedTransport::new());
    let dash = dashboard(&backend, &transport);
    assert_eq!(dash.initialize().await, ConnectionStatus::Mock);

    let snapshot = dash.snapshot();
    assert_eq!(snapshot.source(ResourceClass::Services), Some(DataSource::Stored));
    assert_eq!(snapshot.services.as_ref().unwrap().data[0].id, "svc-9");
    assert_eq!(snapshot.source(ResourceClass::SystemMetrics), Some(DataSource::Simulated));
  }

  #[tokio::test]
  async fn test_live_inventory_is_mirrored_into_store() {
    let backend = Arc::new(MemoryBackend::new());
    let transport = Arc::new(ScriptedTransport::new());
    serve_everything(&transport);

    let mut dash = dashboard(&backend, &transport);
    assert_eq!(dash.initialize().await, ConnectionStatus::Connected);
    dash.start();
    dash.refresh_all().await;

    for _ in 0..200 {
      if !dash.services().is_empty() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let services = dash.services().list();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].status, ServiceStatus::Running);
    assert!(services[0].updated_at.is_some());

    dash.shutdown().await;
    let reopened = dashboard(&backend, &transport);
    assert_eq!(reopened.services().list(), services);
  }

  #[tokio::test]
  async fn test_shutdown_flushes_unsaved_changes() {
    let backend = Arc::new(MemoryBackend::new());
    let transport = Arc::new(ScriptedTransport::new());
    let mut dash = dashboard(&backend, &transport);

    backend.fail_writes_to(TASKS_KEY);
    assert!(dash.tasks().add(Task::new("Buy milk")).is_err());
    assert!(dash.tasks().is_dirty());
    backend.clear_write_failures();

    dash.shutdown().await;
    assert!(!dash.tasks().is_dirty());
    let reopened = dashboard(&backend, &transport);
    assert_eq!(reopened.tasks().list()[0].title, "Buy milk");
  }

  #[tokio::test]
  async fn test_failed_write_lands_in_error_log() {
    let backend = Arc::new(MemoryBackend::new());
    let transport = Arc::new(ScriptedTransport::new());
    let dash = dashboard(&backend, &transport);

    backend.fail_writes_to("notes_backup");
    dash.notes().add(Note::new("Router", "admin page at .1")).unwrap();
    let log = dash.error_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].key, "notes_backup");
  }
}
