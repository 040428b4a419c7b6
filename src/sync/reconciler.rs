use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::bus::{ChangeBus, ChangeEvent, ContextId};
use crate::backend::KvBackend;
use crate::model::Entity;
use crate::store::{Collection, Reconciliation};

/// Apply one bus event to `collection` if it concerns it.
///
/// Returns `None` for events from `own` context, for other keys, and for
/// malformed payloads (logged, local state kept).
pub fn handle_event<T: Entity, B: KvBackend>(
  collection: &Collection<T, B>,
  own: ContextId,
  event: &ChangeEvent,
) -> Option<Reconciliation> {
  if event.origin == own || event.key != collection.key() {
    return None;
  }

  match collection.reconcile(event.value.as_deref()) {
    Ok(outcome) => Some(outcome),
    Err(e) => {
      tracing::warn!(key = %event.key, origin = %event.origin, error = %e, "ignoring malformed change signal");
      None
    }
  }
}

/// Keep `collection` in sync with writes other contexts make to its key.
pub fn spawn_reconciler<T: Entity, B: KvBackend>(
  collection: Arc<Collection<T, B>>,
  bus: &ChangeBus,
  own: ContextId,
  cancel: CancellationToken,
) -> JoinHandle<()> {
  let mut rx = bus.subscribe();

  tokio::spawn(async move {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        received = rx.recv() => match received {
          Ok(event) => {
            let target = Arc::clone(&collection);
            if let Err(e) = tokio::task::spawn_blocking(move || handle_event(&target, own, &event)).await {
              tracing::error!(key = %collection.key(), error = %e, "reconcile panicked");
            }
          }
          Err(RecvError::Lagged(missed)) => {
            tracing::warn!(key = %collection.key(), missed, "change bus lagged, reloading");
            let target = Arc::clone(&collection);
            if let Err(e) = tokio::task::spawn_blocking(move || target.resync()).await {
              tracing::error!(key = %collection.key(), error = %e, "resync panicked");
            }
          }
          Err(RecvError::Closed) => break,
        }
      }
    }
    tracing::debug!(key = %collection.key(), "reconciler stopped");
  })
}
