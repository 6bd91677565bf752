use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::host::{HostRuntime, ServiceEvent, ServiceWatcher};

/// Optional subsystem of the managed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    #[serde(rename = "CM")]
    Cm,
    Scr,
    EventAdmin,
    Dmt,
    UserAdmin,
    #[serde(rename = "R7_LOGGER")]
    R7Logger,
    HealthCheck,
    HttpRuntime,
    #[serde(rename = "JMX")]
    Jmx,
    Metatype,
    Log,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Cm,
        Capability::Scr,
        Capability::EventAdmin,
        Capability::Dmt,
        Capability::UserAdmin,
        Capability::R7Logger,
        Capability::HealthCheck,
        Capability::HttpRuntime,
        Capability::Jmx,
        Capability::Metatype,
        Capability::Log,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::Cm => "CM",
            Capability::Scr => "SCR",
            Capability::EventAdmin => "EVENT_ADMIN",
            Capability::Dmt => "DMT",
            Capability::UserAdmin => "USER_ADMIN",
            Capability::R7Logger => "R7_LOGGER",
            Capability::HealthCheck => "HEALTH_CHECK",
            Capability::HttpRuntime => "HTTP_RUNTIME",
            Capability::Jmx => "JMX",
            Capability::Metatype => "METATYPE",
            Capability::Log => "LOG",
        }
    }

    /// Interface package whose resolution decides whether the subsystem is
    /// usable.
    pub fn package(self) -> &'static str {
        match self {
            Capability::Cm => "runtime.service.cm",
            Capability::Scr => "runtime.service.component.runtime",
            Capability::EventAdmin => "runtime.service.event",
            Capability::Dmt => "runtime.service.dmt",
            Capability::UserAdmin => "runtime.service.useradmin",
            Capability::R7Logger => "runtime.service.log.admin",
            Capability::HealthCheck => "runtime.hc.execution",
            Capability::HttpRuntime => "runtime.service.http.runtime",
            Capability::Jmx => "runtime.management",
            Capability::Metatype => "runtime.service.metatype",
            Capability::Log => "runtime.service.log",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|capability| capability.name() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn not_wired_message(capability: Capability) -> String {
    format!("{capability} bundle is not installed or wired")
}

/// Read-only presence probe. Holds nothing but the host handle, so every call
/// asks the host again.
#[derive(Clone)]
pub struct CapabilityRegistry {
    host: Arc<dyn HostRuntime>,
}

impl CapabilityRegistry {
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self { host }
    }

    pub fn is_wired(&self, capability: Capability) -> bool {
        self.host.is_package_wired(capability.package())
    }

    pub fn wired(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| self.is_wired(*capability))
            .collect()
    }
}

type PresenceCallback = Box<dyn Fn(Capability, &ServiceEvent) + Send + Sync>;

/// Observer reacting to one subsystem's service appearing or disappearing.
pub struct CapabilityWatcher {
    capability: Capability,
    appeared: PresenceCallback,
    disappeared: PresenceCallback,
}

impl CapabilityWatcher {
    pub fn new<A, D>(capability: Capability, appeared: A, disappeared: D) -> Self
    where
        A: Fn(Capability, &ServiceEvent) + Send + Sync + 'static,
        D: Fn(Capability, &ServiceEvent) + Send + Sync + 'static,
    {
        Self {
            capability,
            appeared: Box::new(appeared),
            disappeared: Box::new(disappeared),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }
}

impl ServiceWatcher for CapabilityWatcher {
    fn added(&self, event: &ServiceEvent) {
        (self.appeared)(self.capability, event);
    }

    fn removed(&self, event: &ServiceEvent) {
        (self.disappeared)(self.capability, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for capability in Capability::ALL {
            let encoded = serde_json::to_value(capability).unwrap();
            assert_eq!(encoded, capability.name());
            assert_eq!(Capability::from_name(capability.name()), Some(capability));
        }
    }

    #[test]
    fn not_wired_message_names_subsystem() {
        assert_eq!(
            not_wired_message(Capability::EventAdmin),
            "EVENT_ADMIN bundle is not installed or wired"
        );
    }
}
