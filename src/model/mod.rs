//! Domain entities persisted by the entity store.
//!
//! Every collection the store manages is a `Vec<T>` where `T: Entity`. The
//! [`EntityClass`] tag is what the validator registry resolves keys to.

mod traits;
mod types;

pub use traits::{Entity, EntityClass};
pub use types::{
  AutomationRule, NetworkDevice, Note, ServiceDescriptor, ServiceStatus, Task, TaskPriority,
  TaskStatus,
};
