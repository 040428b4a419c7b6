use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use super::traits::{Entity, EntityClass};

fn new_id() -> String {
  Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Todo,
  InProgress,
  Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  Low,
  #[default]
  Medium,
  High,
}

/// A to-do item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub status: TaskStatus,
  #[serde(default)]
  pub priority: TaskPriority,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub due_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Task {
  pub fn new(title: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id: new_id(),
      title: title.into(),
      description: None,
      status: TaskStatus::default(),
      priority: TaskPriority::default(),
      due_date: None,
      created_at: now,
      updated_at: now,
    }
  }
}

impl Entity for Task {
  fn id(&self) -> &str {
    &self.id
  }

  fn title(&self) -> &str {
    &self.title
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    Some(self.updated_at)
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }

  fn class() -> EntityClass {
    EntityClass::Task
  }
}

/// A free-form note
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub pinned: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Note {
  pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      id: new_id(),
      title: title.into(),
      content: content.into(),
      tags: Vec::new(),
      pinned: false,
      created_at: now,
      updated_at: now,
    }
  }
}

impl Entity for Note {
  fn id(&self) -> &str {
    &self.id
  }

  fn title(&self) -> &str {
    &self.title
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    Some(self.updated_at)
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = now;
  }

  fn class() -> EntityClass {
    EntityClass::Note
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
  Running,
  Stopped,
  Error,
  #[default]
  Unknown,
}

/// A service running somewhere in the homelab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
  pub id: String,
  pub name: String,
  pub status: ServiceStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub host: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub port: Option<u16>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uptime_seconds: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for ServiceDescriptor {
  fn id(&self) -> &str {
    &self.id
  }

  fn title(&self) -> &str {
    &self.name
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.updated_at
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = Some(now);
  }

  fn class() -> EntityClass {
    EntityClass::Service
  }
}

/// A device discovered on the local network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDevice {
  pub id: String,
  pub name: String,
  pub ip: IpAddr,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mac: Option<String>,
  pub device_type: String,
  #[serde(default)]
  pub online: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_seen: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for NetworkDevice {
  fn id(&self) -> &str {
    &self.id
  }

  fn title(&self) -> &str {
    &self.name
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.updated_at
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = Some(now);
  }

  fn class() -> EntityClass {
    EntityClass::Device
  }
}

/// A trigger/action pair evaluated by the homelab automation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
  pub id: String,
  pub name: String,
  pub trigger: String,
  pub action: String,
  pub enabled: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_run: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl AutomationRule {
  pub fn new(
    name: impl Into<String>,
    trigger: impl Into<String>,
    action: impl Into<String>,
  ) -> Self {
    let now = Utc::now();
    Self {
      id: new_id(),
      name: name.into(),
      trigger: trigger.into(),
      action: action.into(),
      enabled: true,
      last_run: None,
      created_at: Some(now),
      updated_at: Some(now),
    }
  }
}

impl Entity for AutomationRule {
  fn id(&self) -> &str {
    &self.id
  }

  fn title(&self) -> &str {
    &self.name
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.updated_at
  }

  fn touch(&mut self, now: DateTime<Utc>) {
    self.updated_at = Some(now);
  }

  fn class() -> EntityClass {
    EntityClass::Automation
  }
}
