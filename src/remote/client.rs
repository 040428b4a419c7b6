use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::connection::{ConnectionEvent, ConnectionState, ConnectionStatus};
use super::retry::RetryPolicy;
use super::simulated;
use super::transport::{Method, Request, Transport};
use super::types::{
  ScanReport, SecurityAlert, ServiceAction, ServiceActionResult, StorageSummary, SystemMetrics,
};
use crate::error::RemoteError;
use crate::model::{AutomationRule, NetworkDevice, ServiceDescriptor};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const HEALTH: &str = "/health";
const METRICS: &str = "/system/metrics";
const SERVICES: &str = "/services";
const DEVICES: &str = "/network/devices";
const SCAN: &str = "/network/scan";
const STORAGE: &str = "/storage";
const RULES: &str = "/automation/rules";
const ALERTS: &str = "/security/alerts";

/// Control API client.
///
/// Every request gets a per-attempt timeout and the configured retries. The
/// `try_*` accessors return the final error; the plain accessors never fail
/// and answer with simulated data instead.
pub struct RemoteClient<T: Transport> {
  transport: T,
  policy: RetryPolicy,
  timeout: Duration,
  state: ConnectionState,
}

impl<T: Transport> RemoteClient<T> {
  pub fn new(transport: T) -> Self {
    Self {
      transport,
      policy: RetryPolicy::default(),
      timeout: DEFAULT_TIMEOUT,
      state: ConnectionState::new(),
    }
  }

  pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Share an existing state, e.g. one observed by the UI before the client exists.
  pub fn with_state(mut self, state: ConnectionState) -> Self {
    self.state = state;
    self
  }

  pub fn state(&self) -> &ConnectionState {
    &self.state
  }

  pub fn status(&self) -> ConnectionStatus {
    self.state.status()
  }

  /// Run the startup health check.
  ///
  /// An unreachable remote puts the client in mock mode; that is a supported
  /// steady state, so this reports the resulting status rather than an error.
  pub async fn initialize(&self) -> ConnectionStatus {
    self.state.apply(ConnectionEvent::InitializeStarted);
    match self.health_check().await {
      Ok(()) => self.state.apply(ConnectionEvent::InitializeSucceeded),
      Err(e) => {
        tracing::warn!(error = %e, "control API unreachable, using simulated data");
        self.state.apply(ConnectionEvent::InitializeFailed)
      }
    }
  }

  /// Re-check the remote explicitly. The only way out of mock mode besides `refresh_all`.
  pub async fn retest(&self) -> ConnectionStatus {
    match self.health_check().await {
      Ok(()) => self.state.apply(ConnectionEvent::RetestSucceeded),
      Err(e) => {
        tracing::debug!(error = %e, "retest failed");
        self.state.apply(ConnectionEvent::RetestFailed)
      }
    }
  }

  /// Single attempt at `GET /health`, without touching the connection state.
  pub async fn health_check(&self) -> Result<(), RemoteError> {
    self.attempt(&Request::get(HEALTH)).await.map(|_| ())
  }

  /// Send a request with timeout and retries, updating the connection state
  /// from the final outcome.
  pub async fn request(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
  ) -> Result<Value, RemoteError> {
    let request = Request::with_body(method, endpoint, body);
    let max_attempts = self.policy.max_attempts();
    let mut attempt = 1;

    loop {
      match self.attempt(&request).await {
        Ok(value) => {
          if attempt > 1 {
            tracing::debug!(endpoint, attempt, "request succeeded after retry");
          }
          self.state.apply(ConnectionEvent::RequestSucceeded);
          return Ok(value);
        }
        Err(e @ RemoteError::Decode { .. }) => {
          // The remote answered, only its body was unusable
          tracing::warn!(endpoint, error = %e, "undecodable response");
          self.state.apply(ConnectionEvent::RequestSucceeded);
          return Err(e);
        }
        Err(e) if attempt >= max_attempts => {
          tracing::warn!(endpoint, method = method.as_str(), attempts = attempt, error = %e, "request failed");
          self.state.apply(ConnectionEvent::RequestFailed);
          return Err(e);
        }
        Err(e) => {
          let delay = self.policy.delay_after(attempt);
          tracing::debug!(endpoint, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying request");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }

  async fn attempt(&self, request: &Request) -> Result<Value, RemoteError> {
    match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
      Ok(result) => result,
      Err(_) => Err(RemoteError::Timeout {
        endpoint: request.path.clone(),
        timeout_ms: self.timeout.as_millis() as u64,
      }),
    }
  }

  async fn fetch<D: DeserializeOwned>(
    &self,
    method: Method,
    endpoint: &str,
    body: Option<Value>,
  ) -> Result<D, RemoteError> {
    let value = self.request(method, endpoint, body).await?;
    serde_json::from_value(value).map_err(|e| RemoteError::Decode {
      endpoint: endpoint.to_string(),
      message: e.to_string(),
    })
  }

  pub async fn try_system_metrics(&self) -> Result<SystemMetrics, RemoteError> {
    self.fetch(Method::Get, METRICS, None).await
  }

  pub async fn try_services(&self) -> Result<Vec<ServiceDescriptor>, RemoteError> {
    self.fetch(Method::Get, SERVICES, None).await
  }

  /// An empty response body counts as an accepted action.
  pub async fn try_service_action(
    &self,
    service_id: &str,
    action: ServiceAction,
  ) -> Result<ServiceActionResult, RemoteError> {
    let endpoint = format!("{}/{}/{}", SERVICES, service_id, action);
    let value = self.request(Method::Post, &endpoint, None).await?;
    if value.is_null() {
      return Ok(ServiceActionResult {
        service_id: service_id.to_string(),
        action,
        accepted: true,
        message: String::new(),
        simulated: false,
      });
    }
    serde_json::from_value(value).map_err(|e| RemoteError::Decode {
      endpoint,
      message: e.to_string(),
    })
  }

  pub async fn try_devices(&self) -> Result<Vec<NetworkDevice>, RemoteError> {
    self.fetch(Method::Get, DEVICES, None).await
  }

  pub async fn try_add_device(&self, device: &NetworkDevice) -> Result<NetworkDevice, RemoteError> {
    self.fetch(Method::Post, DEVICES, Some(to_body(device)?)).await
  }

  pub async fn try_scan_network(&self) -> Result<ScanReport, RemoteError> {
    self.fetch(Method::Post, SCAN, None).await
  }

  pub async fn try_storage(&self) -> Result<StorageSummary, RemoteError> {
    self.fetch(Method::Get, STORAGE, None).await
  }

  pub async fn try_automation_rules(&self) -> Result<Vec<AutomationRule>, RemoteError> {
    self.fetch(Method::Get, RULES, None).await
  }

  pub async fn try_create_automation_rule(
    &self,
    rule: &AutomationRule,
  ) -> Result<AutomationRule, RemoteError> {
    self.fetch(Method::Post, RULES, Some(to_body(rule)?)).await
  }

  pub async fn try_update_automation_rule(
    &self,
    rule: &AutomationRule,
  ) -> Result<AutomationRule, RemoteError> {
    self.fetch(Method::Patch, RULES, Some(to_body(rule)?)).await
  }

  pub async fn try_security_alerts(&self) -> Result<Vec<SecurityAlert>, RemoteError> {
    self.fetch(Method::Get, ALERTS, None).await
  }

  pub async fn get_system_metrics(&self) -> SystemMetrics {
    or_simulated(METRICS, self.try_system_metrics().await, || {
      simulated::system_metrics(&mut rand::thread_rng())
    })
  }

  pub async fn get_services(&self) -> Vec<ServiceDescriptor> {
    or_simulated(SERVICES, self.try_services().await, || {
      simulated::services(&mut rand::thread_rng())
    })
  }

  pub async fn service_action(&self, service_id: &str, action: ServiceAction) -> ServiceActionResult {
    or_simulated(SERVICES, self.try_service_action(service_id, action).await, || {
      simulated::service_action_result(service_id, action)
    })
  }

  pub async fn get_devices(&self) -> Vec<NetworkDevice> {
    or_simulated(DEVICES, self.try_devices().await, || {
      simulated::devices(&mut rand::thread_rng())
    })
  }

  /// Falls back to echoing the device back unchanged.
  pub async fn add_device(&self, device: NetworkDevice) -> NetworkDevice {
    match self.try_add_device(&device).await {
      Ok(added) => added,
      Err(e) => {
        tracing::debug!(endpoint = DEVICES, error = %e, "serving simulated data");
        device
      }
    }
  }

  pub async fn scan_network(&self) -> ScanReport {
    or_simulated(SCAN, self.try_scan_network().await, || {
      simulated::scan_report(&mut rand::thread_rng())
    })
  }

  pub async fn get_storage(&self) -> StorageSummary {
    or_simulated(STORAGE, self.try_storage().await, || {
      simulated::storage(&mut rand::thread_rng())
    })
  }

  pub async fn get_automation_rules(&self) -> Vec<AutomationRule> {
    or_simulated(RULES, self.try_automation_rules().await, || {
      simulated::automation_rules(&mut rand::thread_rng())
    })
  }

  /// Falls back to echoing the rule back unchanged.
  pub async fn create_automation_rule(&self, rule: AutomationRule) -> AutomationRule {
    match self.try_create_automation_rule(&rule).await {
      Ok(created) => created,
      Err(e) => {
        tracing::debug!(endpoint = RULES, error = %e, "serving simulated data");
        rule
      }
    }
  }

  /// Falls back to echoing the rule back unchanged.
  pub async fn update_automation_rule(&self, rule: AutomationRule) -> AutomationRule {
    match self.try_update_automation_rule(&rule).await {
      Ok(updated) => updated,
      Err(e) => {
        tracing::debug!(endpoint = RULES, error = %e, "serving simulated data");
        rule
      }
    }
  }

  pub async fn get_security_alerts(&self) -> Vec<SecurityAlert> {
    or_simulated(ALERTS, self.try_security_alerts().await, || {
      simulated::security_alerts(&mut rand::thread_rng())
    })
  }
}

fn or_simulated<D>(endpoint: &str, result: Result<D, RemoteError>, simulate: impl FnOnce() -> D) -> D {
  match result {
    Ok(data) => data,
    Err(e) => {
      tracing::debug!(endpoint, error = %e, "serving simulated data");
      simulate()
    }
  }
}

fn to_body<S: Serialize>(value: &S) -> Result<Value, RemoteError> {
  serde_json::to_value(value).map_err(|e| RemoteError::Decode {
    endpoint: "request body".to_string(),
    message: e.to_string(),
  })
}
