//! One adapter per optional subsystem. Adapters are built per call from
//! whatever the host currently exposes and hold nothing else.

mod components;
mod configurations;
mod device_tree;
mod events;
mod health;
mod heap;
mod http;
mod logger;
mod roles;

pub use components::{ComponentSelector, ComponentsAdapter};
pub use configurations::ConfigurationsAdapter;
pub use device_tree::DeviceTreeAdapter;
pub use events::EventsAdapter;
pub use health::HealthAdapter;
pub use heap::HeapAdapter;
pub use http::HttpAdapter;
pub use logger::LoggerAdapter;
pub use roles::RolesAdapter;

use crate::capability::Capability;
use crate::dto::OpResult;

/// The interface package is wired but no service is registered.
pub(crate) fn service_missing(capability: Capability) -> OpResult {
    OpResult::error(format!("{capability} service is currently unavailable"))
}
