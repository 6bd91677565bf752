use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::host::{ServiceEvent, ServiceWatcher};
use crate::values::{Payload, PayloadShape, TypedValue};

/// Service property naming an extension.
pub const EXTENSION_NAME_PROPERTY: &str = "agent.extension.name";

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Conversion(#[from] crate::values::ConversionError),
}

/// Named handler invoked by the controller with a generic payload.
pub trait Extension: Send + Sync {
    fn input_shape(&self) -> PayloadShape;
    fn execute(&self, input: Payload) -> Result<Payload, ExtensionError>;
}

/// Live name-keyed extension table.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: RwLock<HashMap<String, Arc<dyn Extension>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn Extension>>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<dyn Extension>>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn extension_name(event: &ServiceEvent) -> Option<String> {
    match event.property(EXTENSION_NAME_PROPERTY)? {
        TypedValue::String(name) => Some(name.clone()),
        other => Some(other.to_json().to_string()),
    }
}

impl ServiceWatcher for ExtensionRegistry {
    fn added(&self, event: &ServiceEvent) {
        let (Some(name), Some(extension)) = (extension_name(event), event.extension.clone()) else {
            tracing::debug!(service_id = event.service_id, "ignoring extension without a name");
            return;
        };
        tracing::info!(extension = %name, "agent extension registered");
        self.write().insert(name, extension);
    }

    // Swap under a single write lock so lookups see the old or the new
    // handler, never a gap.
    fn modified(&self, previous: &ServiceEvent, current: &ServiceEvent) {
        let mut entries = self.write();
        if let Some(name) = extension_name(previous) {
            entries.remove(&name);
        }
        if let (Some(name), Some(extension)) = (extension_name(current), current.extension.clone()) {
            tracing::info!(extension = %name, "agent extension re-registered");
            entries.insert(name, extension);
        }
    }

    fn removed(&self, event: &ServiceEvent) {
        if let Some(name) = extension_name(event) {
            tracing::info!(extension = %name, "agent extension unregistered");
            self.write().remove(&name);
        }
    }
}
