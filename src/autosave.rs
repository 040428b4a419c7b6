//! Periodic flushing of unsaved collection changes.
//!
//! Explicit saves cover the common case; the scheduler bounds data loss to
//! one interval when a write failed earlier or the process is closing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// Something the scheduler can flush to durable storage.
pub trait Flushable: Send + Sync + 'static {
  /// Logical key, one flush at a time per key
  fn key(&self) -> &str;

  /// Whether there are changes not yet written
  fn is_dirty(&self) -> bool;

  /// Write pending changes. Returns whether anything was written.
  fn flush(&self) -> Result<bool, StoreError>;
}

struct Target {
  flushable: Arc<dyn Flushable>,
  guard: Arc<Mutex<()>>,
}

/// Counts from one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundStats {
  pub launched: usize,
  pub skipped_busy: usize,
  pub clean: usize,
}

/// Fires on a fixed interval and flushes dirty targets on the blocking pool.
pub struct AutosaveScheduler {
  interval: Duration,
  targets: Arc<Vec<Target>>,
  skipped: Arc<AtomicU64>,
  cancel: CancellationToken,
  handle: Option<JoinHandle<()>>,
}

impl AutosaveScheduler {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      targets: Arc::new(Vec::new()),
      skipped: Arc::new(AtomicU64::new(0)),
      cancel: CancellationToken::new(),
      handle: None,
    }
  }

  /// Add a target. Targets registered after `start` are picked up on restart.
  pub fn register(&mut self, flushable: Arc<dyn Flushable>) {
    let mut targets: Vec<Target> = self
      .targets
      .iter()
      .map(|t| Target {
        flushable: Arc::clone(&t.flushable),
        guard: Arc::clone(&t.guard),
      })
      .collect();
    targets.push(Target {
      flushable,
      guard: Arc::new(Mutex::new(())),
    });
    self.targets = Arc::new(targets);
  }

  pub fn is_running(&self) -> bool {
    self.handle.is_some()
  }

  /// Ticks skipped so far because a flush for the same key was still running.
  pub fn skipped_busy(&self) -> u64 {
    self.skipped.load(Ordering::Relaxed)
  }

  pub fn start(&mut self) {
    if self.handle.is_some() {
      return;
    }

    self.cancel = CancellationToken::new();
    let cancel = self.cancel.clone();
    let targets = Arc::clone(&self.targets);
    let skipped = Arc::clone(&self.skipped);
    let period = self.interval;

    tracing::info!(interval_secs = period.as_secs(), targets = targets.len(), "autosave started");
    self.handle = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      // The first tick completes immediately
      ticker.tick().await;

      loop {
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = ticker.tick() => {
            let stats = launch_round(&targets);
            skipped.fetch_add(stats.skipped_busy as u64, Ordering::Relaxed);
          }
        }
      }
    }));
  }

  /// Stop ticking. Flushes already running are left to finish.
  pub fn stop(&mut self) {
    self.cancel.cancel();
    if self.handle.take().is_some() {
      tracing::info!("autosave stopped");
    }
  }

  /// Flush every dirty target now, waiting for running flushes first.
  pub async fn flush_now(&self) -> usize {
    let mut written = 0;
    for target in self.targets.iter() {
      let guard = Arc::clone(&target.guard).lock_owned().await;
      if !target.flushable.is_dirty() {
        continue;
      }
      if let Ok(true) = run_flush(Arc::clone(&target.flushable), guard).await {
        written += 1;
      }
    }
    written
  }
}

impl Drop for AutosaveScheduler {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Start a flush for every dirty target whose key is not already being flushed.
fn launch_round(targets: &[Target]) -> RoundStats {
  let mut stats = RoundStats::default();

  for target in targets {
    let guard = match Arc::clone(&target.guard).try_lock_owned() {
      Ok(guard) => guard,
      Err(_) => {
        tracing::debug!(key = target.flushable.key(), "flush still running, skipping tick");
        stats.skipped_busy += 1;
        continue;
      }
    };

    if !target.flushable.is_dirty() {
      stats.clean += 1;
      continue;
    }

    stats.launched += 1;
    let flushable = Arc::clone(&target.flushable);
    tokio::spawn(run_flush(flushable, guard));
  }

  stats
}

async fn run_flush(flushable: Arc<dyn Flushable>, guard: OwnedMutexGuard<()>) -> Result<bool, StoreError> {
  let key = flushable.key().to_string();
  let result = tokio::task::spawn_blocking(move || {
    let _guard = guard;
    flushable.flush()
  })
  .await;

  match result {
    Ok(Ok(written)) => {
      if written {
        tracing::debug!(key = %key, "autosave flushed");
      }
      Ok(written)
    }
    Ok(Err(e)) => {
      tracing::warn!(key = %key, error = %e, "autosave flush failed");
      Err(e)
    }
    Err(e) => {
      tracing::error!(key = %key, error = %e, "autosave flush panicked");
      Ok(false)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicBool;
  use std::sync::mpsc;

  struct Blocking {
    key: String,
    dirty: AtomicBool,
    flushes: AtomicU64,
    release: std::sync::Mutex<mpsc::Receiver<()>>,
  }

  impl Blocking {
    fn new(key: &str) -> (Arc<Self>, mpsc::Sender<()>) {
      let (tx, rx) = mpsc::channel();
      let target = Arc::new(Self {
        key: key.to_string(),
        dirty: AtomicBool::new(true),
        flushes: AtomicU64::new(0),
        release: std::sync::Mutex::new(rx),
      });
      (target, tx)
    }
  }

  impl Flushable for Blocking {
    fn key(&self) -> &str {
      &self.key
    }

    fn is_dirty(&self) -> bool {
      self.dirty.load(Ordering::SeqCst)
    }

    fn flush(&self) -> Result<bool, StoreError> {
      let _ = self.release.lock().unwrap().recv();
      self.flushes.fetch_add(1, Ordering::SeqCst);
      self.dirty.store(false, Ordering::SeqCst);
      Ok(true)
    }
  }

  #[tokio::test]
  async fn test_busy_key_is_skipped() {
    let (target, release) = Blocking::new("tasks");
    let mut scheduler = AutosaveScheduler::new(Duration::from_secs(60));
    scheduler.register(target.clone());

    let first = launch_round(&scheduler.targets);
    assert_eq!(first.launched, 1);

    // The first flush owns the key's guard until it is released
    let second = launch_round(&scheduler.targets);
    assert_eq!(second.skipped_busy, 1);
    assert_eq!(second.launched, 0);

    release.send(()).unwrap();
    // flush_now waits for the running flush, then finds nothing dirty
    assert_eq!(scheduler.flush_now().await, 0);
    assert_eq!(target.flushes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_clean_targets_are_not_flushed() {
    let (target, _release) = Blocking::new("notes");
    target.dirty.store(false, Ordering::SeqCst);
    let mut scheduler = AutosaveScheduler::new(Duration::from_secs(60));
    scheduler.register(target.clone());

    let stats = launch_round(&scheduler.targets);
    assert_eq!(stats.clean, 1);
    assert_eq!(stats.launched, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_ticks_flush_dirty_targets() {
    let (target, release) = Blocking::new("tasks");
    release.send(()).unwrap();
    let mut scheduler = AutosaveScheduler::new(Duration::from_secs(60));
    scheduler.register(target.clone());
    scheduler.start();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(target.flushes.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(31)).await;
    // Waits for the tick's flush to release its guard; nothing is left dirty
    assert_eq!(scheduler.flush_now().await, 0);
    assert_eq!(target.flushes.load(Ordering::SeqCst), 1);

    scheduler.stop();
    assert!(!scheduler.is_running());
  }
}
