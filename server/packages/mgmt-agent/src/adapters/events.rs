use std::sync::Arc;

use crate::dto::OpResult;
use crate::host::{EventBus, Properties};

pub struct EventsAdapter {
    bus: Arc<dyn EventBus>,
}

impl EventsAdapter {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Delivers synchronously to every matching handler.
    pub fn send(&self, topic: &str, properties: Properties) -> OpResult {
        match self.bus.send(topic, properties) {
            Ok(()) => OpResult::success("Event has been sent successfully"),
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "event send failed");
                OpResult::error("Event could not be sent successfully")
            }
        }
    }

    pub fn post(&self, topic: &str, properties: Properties) -> OpResult {
        match self.bus.post(topic, properties) {
            Ok(()) => OpResult::success("Event has been sent successfully"),
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "event post failed");
                OpResult::error("Event could not be sent successfully")
            }
        }
    }
}
