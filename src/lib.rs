//! Client-side resilience layer for a homelab dashboard.
//!
//! - [`store`]: validated collections written with a backup copy and read back
//!   with self-healing, over a [`backend::KvBackend`]
//! - [`sync`]: keeps collections in step across execution contexts
//! - [`remote`]: control API client with timeout, retries and simulated fallback
//! - [`poll`]: per-resource polling into one [`poll::DashboardSnapshot`]
//! - [`app`]: the [`app::Dashboard`] facade wiring all of it together

pub mod app;
pub mod autosave;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod poll;
pub mod remote;
pub mod store;
pub mod sync;
pub mod validate;

pub use app::{Dashboard, DashboardOptions};
pub use config::Config;
pub use error::{RemoteError, StorageError, StoreError, ValidationError};
