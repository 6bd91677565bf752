use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::{ComponentInfo, OpResult};
use crate::host::ComponentRuntime;

/// Components are addressed either by runtime id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ComponentSelector {
    Id(u64),
    Name(String),
}

impl fmt::Display for ComponentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentSelector::Id(id) => write!(f, "id {id}"),
            ComponentSelector::Name(name) => write!(f, "name '{name}'"),
        }
    }
}

pub struct ComponentsAdapter {
    runtime: Arc<dyn ComponentRuntime>,
}

impl ComponentsAdapter {
    pub fn new(runtime: Arc<dyn ComponentRuntime>) -> Self {
        Self { runtime }
    }

    pub fn list(&self) -> Vec<ComponentInfo> {
        self.runtime.components()
    }

    pub fn enable(&self, selector: &ComponentSelector) -> OpResult {
        let outcome = match selector {
            ComponentSelector::Id(id) => self.runtime.enable_by_id(*id),
            ComponentSelector::Name(name) => self.runtime.enable_by_name(name),
        };
        match outcome {
            Ok(()) => OpResult::success(format!("Component with {selector} has been enabled")),
            Err(err) => OpResult::error(format!("Component with {selector} cannot be enabled: {err}")),
        }
    }

    pub fn disable(&self, selector: &ComponentSelector) -> OpResult {
        let outcome = match selector {
            ComponentSelector::Id(id) => self.runtime.disable_by_id(*id),
            ComponentSelector::Name(name) => self.runtime.disable_by_name(name),
        };
        match outcome {
            Ok(()) => OpResult::success(format!("Component with {selector} has been disabled")),
            Err(err) => OpResult::error(format!("Component with {selector} cannot be disabled: {err}")),
        }
    }
}
