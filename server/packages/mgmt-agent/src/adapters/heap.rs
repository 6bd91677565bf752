use std::sync::Arc;

use crate::dto::{HeapDump, HeapUsage};
use crate::host::{HeapInspector, HostError};

pub struct HeapAdapter {
    inspector: Arc<dyn HeapInspector>,
}

impl HeapAdapter {
    pub fn new(inspector: Arc<dyn HeapInspector>) -> Self {
        Self { inspector }
    }

    pub fn usage(&self) -> HeapUsage {
        self.inspector.usage()
    }

    pub fn dump(&self) -> Result<HeapDump, HostError> {
        let dump = self.inspector.dump()?;
        tracing::info!(location = %dump.location, size = dump.size, "heap dump written");
        Ok(dump)
    }
}
