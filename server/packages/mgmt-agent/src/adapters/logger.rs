use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dto::{LoggerContextInfo, OpResult};
use crate::host::LoggerAdmin;

pub struct LoggerAdapter {
    admin: Arc<dyn LoggerAdmin>,
    config_wired: bool,
}

impl LoggerAdapter {
    /// `config_wired` decides whether level changes are persisted.
    pub fn new(admin: Arc<dyn LoggerAdmin>, config_wired: bool) -> Self {
        Self {
            admin,
            config_wired,
        }
    }

    pub fn contexts(&self) -> Vec<LoggerContextInfo> {
        self.admin
            .contexts()
            .into_iter()
            .map(|mut context| {
                context.persisted = self.config_wired;
                context
            })
            .collect()
    }

    pub fn update(&self, name: &str, levels: &BTreeMap<String, String>) -> OpResult {
        match self.admin.update_context(name, levels, self.config_wired) {
            Ok(()) if self.config_wired => {
                OpResult::success(format!("Logger context '{name}' has been updated"))
            }
            Ok(()) => OpResult::success(format!(
                "Logger context '{name}' has been updated; levels are not persisted"
            )),
            Err(err) => OpResult::error(format!("Logger context '{name}' cannot be updated: {err}")),
        }
    }
}
