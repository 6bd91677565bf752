use std::sync::Arc;

use crate::dto::{DeviceNode, DeviceValueType, OpResult};
use crate::host::DeviceTree;

pub struct DeviceTreeAdapter {
    tree: Arc<dyn DeviceTree>,
}

impl DeviceTreeAdapter {
    pub fn new(tree: Arc<dyn DeviceTree>) -> Self {
        Self { tree }
    }

    pub fn read(&self, uri: &str) -> Option<DeviceNode> {
        match self.tree.read(uri) {
            Ok(node) => Some(node),
            Err(err) => {
                tracing::debug!(uri = %uri, error = %err, "device tree node not readable");
                None
            }
        }
    }

    pub fn update(&self, uri: &str, value: &str, value_type: DeviceValueType) -> OpResult {
        match self.tree.update(uri, value, value_type) {
            Ok(()) => OpResult::success(format!("Device tree node '{uri}' has been updated")),
            Err(err) => OpResult::error(format!("Device tree node '{uri}' cannot be updated: {err}")),
        }
    }
}
