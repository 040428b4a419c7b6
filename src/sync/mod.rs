//! Cross-context change notification.
//!
//! Each execution context (window, process, thread) writes through its own
//! [`NotifyingBackend`], which publishes a [`ChangeEvent`] on a shared
//! [`ChangeBus`]. Other contexts run a reconciler per collection that applies
//! events originating elsewhere.

mod bus;
mod reconciler;

pub use bus::{ChangeBus, ChangeEvent, ContextId, NotifyingBackend};
pub use reconciler::{handle_event, spawn_reconciler};
