use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::host::{ServiceEvent, ServiceWatcher};
use crate::values::TypedValue;

pub const COMMAND_SCOPE_PROPERTY: &str = "command.scope";
pub const COMMAND_FUNCTION_PROPERTY: &str = "command.function";

/// Live set of `scope:function` shell commands contributed by command
/// providers.
#[derive(Default)]
pub struct CommandCatalog {
    commands: RwLock<BTreeSet<String>>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.commands
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

fn as_text(value: &TypedValue) -> String {
    match value {
        TypedValue::String(text) => text.clone(),
        other => other.to_json().to_string(),
    }
}

fn qualified_commands(event: &ServiceEvent) -> Vec<String> {
    let Some(scope) = event.property(COMMAND_SCOPE_PROPERTY).map(as_text) else {
        return Vec::new();
    };
    let functions = match event.property(COMMAND_FUNCTION_PROPERTY) {
        Some(TypedValue::List(items)) => items.iter().map(as_text).collect(),
        Some(single) => vec![as_text(single)],
        None => Vec::new(),
    };
    functions
        .into_iter()
        .map(|function| format!("{scope}:{function}"))
        .collect()
}

impl ServiceWatcher for CommandCatalog {
    fn added(&self, event: &ServiceEvent) {
        let added = qualified_commands(event);
        if added.is_empty() {
            return;
        }
        tracing::debug!(commands = ?added, "shell commands added");
        self.commands
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(added);
    }

    fn removed(&self, event: &ServiceEvent) {
        let removed = qualified_commands(event);
        let mut commands = self
            .commands
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for command in removed {
            commands.remove(&command);
        }
    }
}
