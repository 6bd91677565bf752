use std::collections::HashSet;
use std::sync::Arc;

use crate::dto::{ConfigurationInfo, OpResult};
use crate::host::{ConfigAdmin, MetatypeProvider, Properties};

/// Configuration store plus metatype declarations. Either side may be absent.
pub struct ConfigurationsAdapter {
    store: Option<Arc<dyn ConfigAdmin>>,
    metatype: Option<Arc<dyn MetatypeProvider>>,
}

impl ConfigurationsAdapter {
    pub fn new(store: Option<Arc<dyn ConfigAdmin>>, metatype: Option<Arc<dyn MetatypeProvider>>) -> Self {
        Self { store, metatype }
    }

    /// Stored configurations first, then metatype declarations that have no
    /// stored counterpart.
    pub fn list(&self) -> Vec<ConfigurationInfo> {
        let mut configurations = self
            .store
            .as_ref()
            .map(|store| store.configurations())
            .unwrap_or_default();
        if let Some(metatype) = &self.metatype {
            let stored: HashSet<String> = configurations.iter().map(|config| config.pid.clone()).collect();
            configurations.extend(
                metatype
                    .declared()
                    .into_iter()
                    .filter(|declared| !stored.contains(&declared.pid)),
            );
        }
        configurations
    }

    pub fn create_or_update(&self, pid: &str, properties: Properties) -> Option<OpResult> {
        let store = self.store.as_ref()?;
        Some(match store.create_or_update(pid, properties) {
            Ok(true) => OpResult::success(format!("Configuration with PID '{pid}' has been created")),
            Ok(false) => OpResult::success(format!("Configuration with PID '{pid}' has been updated")),
            Err(err) => OpResult::error(format!("Configuration with PID '{pid}' cannot be updated: {err}")),
        })
    }

    pub fn delete(&self, pid: &str) -> Option<OpResult> {
        let store = self.store.as_ref()?;
        Some(match store.delete(pid) {
            Ok(true) => OpResult::success(format!("Configuration with PID '{pid}' has been deleted")),
            Ok(false) => OpResult::error(format!("Configuration with PID '{pid}' cannot be found")),
            Err(err) => OpResult::error(format!("Configuration with PID '{pid}' cannot be deleted: {err}")),
        })
    }

    pub fn create_factory(&self, factory_pid: &str, properties: Properties) -> Option<OpResult> {
        let store = self.store.as_ref()?;
        Some(match store.create_factory(factory_pid, properties) {
            Ok(pid) => OpResult::success(format!(
                "Factory configuration with PID '{pid}' has been created for '{factory_pid}'"
            )),
            Err(err) => OpResult::error(format!(
                "Factory configuration for '{factory_pid}' cannot be created: {err}"
            )),
        })
    }
}
