//! Plausible stand-in data for when the control API is unreachable.
//!
//! Every generator takes the RNG explicitly so tests can seed it.

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};

use super::types::{
  AlertSeverity, ScanReport, SecurityAlert, ServiceAction, ServiceActionResult, StoragePool,
  StorageSummary, SystemMetrics,
};
use crate::model::{AutomationRule, NetworkDevice, ServiceDescriptor, ServiceStatus};

const GIB: u64 = 1024 * 1024 * 1024;

const SERVICES: &[(&str, &str, u16)] = &[
  ("plex", "media.lan", 32400),
  ("home-assistant", "hass.lan", 8123),
  ("pihole", "dns.lan", 80),
  ("grafana", "monitor.lan", 3000),
  ("nextcloud", "cloud.lan", 443),
];

const DEVICES: &[(&str, &str)] = &[
  ("nas", "storage"),
  ("router", "network"),
  ("living-room-tv", "media"),
  ("thermostat", "iot"),
  ("workstation", "computer"),
  ("phone", "mobile"),
];

pub fn system_metrics<R: Rng + ?Sized>(rng: &mut R) -> SystemMetrics {
  SystemMetrics {
    cpu_percent: rng.gen_range(30.0..=60.0),
    memory_percent: rng.gen_range(40.0..=80.0),
    disk_percent: rng.gen_range(20.0..=90.0),
    network_rx_kbps: rng.gen_range(0.0..=5000.0),
    network_tx_kbps: rng.gen_range(0.0..=2000.0),
    load_average: [
      rng.gen_range(0.2..=2.0),
      rng.gen_range(0.2..=2.0),
      rng.gen_range(0.2..=2.0),
    ],
    uptime_seconds: rng.gen_range(3_600..=60 * 86_400),
    timestamp: Utc::now(),
  }
}

pub fn services<R: Rng + ?Sized>(rng: &mut R) -> Vec<ServiceDescriptor> {
  SERVICES
    .iter()
    .enumerate()
    .map(|(i, (name, host, port))| {
      let running = rng.gen_bool(0.85);
      ServiceDescriptor {
        id: format!("svc-{}", i + 1),
        name: name.to_string(),
        status: if running {
          ServiceStatus::Running
        } else {
          ServiceStatus::Stopped
        },
        host: Some(host.to_string()),
        port: Some(*port),
        uptime_seconds: running.then(|| rng.gen_range(60..=30 * 86_400)),
        created_at: None,
        updated_at: None,
      }
    })
    .collect()
}

/// The remote never saw the action, so it is never reported as accepted.
pub fn service_action_result(service_id: &str, action: ServiceAction) -> ServiceActionResult {
  ServiceActionResult {
    service_id: service_id.to_string(),
    action,
    accepted: false,
    message: format!("control API unreachable, {} not sent", action),
    simulated: true,
  }
}

pub fn devices<R: Rng + ?Sized>(rng: &mut R) -> Vec<NetworkDevice> {
  let now = Utc::now();
  DEVICES
    .iter()
    .enumerate()
    .map(|(i, (name, device_type))| {
      let online = rng.gen_bool(0.8);
      NetworkDevice {
        id: format!("dev-{}", i + 1),
        name: name.to_string(),
        ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10 + i as u8)),
        mac: Some(format!(
          "02:00:00:{:02x}:{:02x}:{:02x}",
          rng.gen::<u8>(),
          rng.gen::<u8>(),
          i as u8
        )),
        device_type: device_type.to_string(),
        online,
        last_seen: Some(if online {
          now
        } else {
          now - Duration::minutes(rng.gen_range(5..=600))
        }),
        created_at: None,
        updated_at: None,
      }
    })
    .collect()
}

pub fn scan_report<R: Rng + ?Sized>(rng: &mut R) -> ScanReport {
  let finished_at = Utc::now();
  let mut found = devices(rng);
  found.retain(|d| d.online);
  ScanReport {
    devices: found,
    started_at: finished_at - Duration::seconds(rng.gen_range(2..=15)),
    finished_at,
  }
}

pub fn storage<R: Rng + ?Sized>(rng: &mut R) -> StorageSummary {
  let pools = [("tank", 8 * 1024), ("fast", 1024), ("backup", 4 * 1024)]
    .into_iter()
    .map(|(name, total_gib)| {
      let total_bytes = total_gib * GIB;
      let used = rng.gen_range(0.1..=0.9);
      StoragePool {
        name: name.to_string(),
        total_bytes,
        used_bytes: (total_bytes as f64 * used) as u64,
        healthy: rng.gen_bool(0.95),
      }
    })
    .collect();
  StorageSummary { pools }
}

pub fn automation_rules<R: Rng + ?Sized>(rng: &mut R) -> Vec<AutomationRule> {
  let now = Utc::now();
  [
    ("Nightly backup", "cron: 0 3 * * *", "backup.run"),
    ("Lights off at midnight", "cron: 0 0 * * *", "lights.off"),
    ("Restart stuck media server", "service.plex.error", "service.plex.restart"),
  ]
  .into_iter()
  .enumerate()
  .map(|(i, (name, trigger, action))| AutomationRule {
    id: format!("rule-{}", i + 1),
    name: name.to_string(),
    trigger: trigger.to_string(),
    action: action.to_string(),
    enabled: rng.gen_bool(0.75),
    last_run: Some(now - Duration::hours(rng.gen_range(1..=48))),
    created_at: None,
    updated_at: None,
  })
  .collect()
}

pub fn security_alerts<R: Rng + ?Sized>(rng: &mut R) -> Vec<SecurityAlert> {
  const MESSAGES: &[(&str, &str, AlertSeverity)] = &[
    ("Failed SSH login burst", "sshd", AlertSeverity::High),
    ("New device joined the network", "dhcp", AlertSeverity::Low),
    ("Certificate expires in 7 days", "nginx", AlertSeverity::Medium),
    ("Outbound traffic spike", "firewall", AlertSeverity::Medium),
  ];

  let now = Utc::now();
  let count = rng.gen_range(0..=MESSAGES.len());
  MESSAGES
    .choose_multiple(rng, count)
    .enumerate()
    .map(|(i, (message, source, severity))| SecurityAlert {
      id: format!("alert-{}", i + 1),
      severity: *severity,
      message: message.to_string(),
      source: source.to_string(),
      timestamp: now - Duration::minutes(rng.gen_range(1..=240)),
      acknowledged: false,
    })
    .collect()
}
