//! Timed refresh of remote resources into one dashboard read model.

mod orchestrator;
mod snapshot;

pub use orchestrator::{PollingIntervals, PollingOrchestrator, RefreshReport};
pub use snapshot::{DashboardSnapshot, DataSource, ResourceClass, ResourceData, Stamped};
