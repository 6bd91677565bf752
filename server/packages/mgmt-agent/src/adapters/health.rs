use std::sync::Arc;

use crate::dto::{HealthCheckInfo, HealthCheckResult};
use crate::host::HealthCheckExecutor;

pub struct HealthAdapter {
    executor: Arc<dyn HealthCheckExecutor>,
}

impl HealthAdapter {
    pub fn new(executor: Arc<dyn HealthCheckExecutor>) -> Self {
        Self { executor }
    }

    pub fn list(&self) -> Vec<HealthCheckInfo> {
        self.executor.checks()
    }

    /// Empty `tags` and `names` select every check.
    pub fn execute(&self, tags: &[String], names: &[String]) -> Vec<HealthCheckResult> {
        self.executor.execute(tags, names)
    }
}
