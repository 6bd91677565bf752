//! In-process host runtime used by the standalone server and by tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tokio::sync::oneshot;

use crate::capability::Capability;
use crate::descriptor::{self, UnitIdentity};
use crate::dto::{
    ConfigurationInfo, ConfigurationSource, MemoryInfo, PropertyInfo, PropertyKind, RoleInfo,
    RoleType, ServiceInfo, ThreadInfo, UnitInfo, UnitState,
};
use crate::extensions::Extension;
use crate::host::subsystems::*;
use crate::host::{
    HostError, HostRuntime, ListenerId, NamespaceEntry, RevisionDescriptor, ServiceEvent,
    ServiceKind, ServiceWatcher, WatchId,
};
use crate::values::TypedValue;

pub const SYSTEM_UNIT_ID: u64 = 0;
const IMPORTS_HEADER: &str = "Unit-Imports";

static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Subsystem services currently registered with the host.
#[derive(Default, Clone)]
pub struct Subsystems {
    pub component_runtime: Option<Arc<dyn ComponentRuntime>>,
    pub config_admin: Option<Arc<dyn ConfigAdmin>>,
    pub metatype: Option<Arc<dyn MetatypeProvider>>,
    pub event_bus: Option<Arc<dyn EventBus>>,
    pub user_admin: Option<Arc<dyn UserAdmin>>,
    pub logger_admin: Option<Arc<dyn LoggerAdmin>>,
    pub device_tree: Option<Arc<dyn DeviceTree>>,
    pub health_checks: Option<Arc<dyn HealthCheckExecutor>>,
    pub http_runtime: Option<Arc<dyn HttpRuntime>>,
    pub heap: Option<Arc<dyn HeapInspector>>,
    pub command_shell: Option<Arc<dyn CommandShell>>,
    pub log_reader: Option<Arc<dyn LogReader>>,
}

struct StoredUnit {
    info: UnitInfo,
    revision: RevisionDescriptor,
}

struct RegisteredService {
    kind: ServiceKind,
    unit_id: u64,
    event: ServiceEvent,
}

#[derive(Default)]
struct HostState {
    units: BTreeMap<u64, StoredUnit>,
    wired: HashSet<String>,
    watchers: BTreeMap<WatchId, (ServiceKind, Arc<dyn ServiceWatcher>)>,
    services: BTreeMap<u64, RegisteredService>,
    subsystems: Subsystems,
}

pub struct InMemoryHost {
    state: Mutex<HostState>,
    next_unit_id: AtomicU64,
    next_service_id: AtomicU64,
    next_watch_id: AtomicU64,
    refresh_delay: Mutex<Option<Duration>>,
    refresh_count: AtomicU64,
    gc_count: AtomicU64,
    started_at: Instant,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    /// Host with only the system unit installed and nothing wired.
    pub fn new() -> Self {
        let mut state = HostState::default();
        state.units.insert(
            SYSTEM_UNIT_ID,
            StoredUnit {
                info: UnitInfo {
                    id: SYSTEM_UNIT_ID,
                    symbolic_name: "runtime.system".to_string(),
                    version: "1.0.0".to_string(),
                    location: "System Unit".to_string(),
                    state: UnitState::Active,
                    start_level: 0,
                    last_modified: now_millis(),
                },
                revision: RevisionDescriptor {
                    symbolic_name: "runtime.system".to_string(),
                    version: "1.0.0".to_string(),
                    requirements: Vec::new(),
                    capabilities: vec![identity_capability("runtime.system", "1.0.0")],
                },
            },
        );
        Self {
            state: Mutex::new(state),
            next_unit_id: AtomicU64::new(1),
            next_service_id: AtomicU64::new(1),
            next_watch_id: AtomicU64::new(1),
            refresh_delay: Mutex::new(None),
            refresh_count: AtomicU64::new(0),
            gc_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Host with the in-memory configuration store, event bus, user store,
    /// log reader and command shell wired in.
    pub fn standalone() -> Arc<Self> {
        let host = Arc::new(Self::new());
        host.configure(|subsystems| {
            subsystems.config_admin = Some(Arc::new(MemoryConfigAdmin::default()));
            subsystems.event_bus = Some(Arc::new(MemoryEventBus::default()));
            subsystems.user_admin = Some(Arc::new(MemoryUserAdmin::default()));
            subsystems.log_reader = Some(Arc::new(MemoryLogReader::default()));
            subsystems.command_shell = Some(Arc::new(MemoryShell::new(Arc::downgrade(&host))));
        });
        for capability in [
            Capability::Cm,
            Capability::EventAdmin,
            Capability::UserAdmin,
            Capability::Log,
        ] {
            host.wire(capability);
        }
        host
    }

    pub fn configure(&self, apply: impl FnOnce(&mut Subsystems)) {
        let mut state = lock(&self.state);
        apply(&mut state.subsystems);
    }

    pub fn wire(&self, capability: Capability) {
        lock(&self.state).wired.insert(capability.package().to_string());
    }

    pub fn unwire(&self, capability: Capability) {
        lock(&self.state).wired.remove(capability.package());
    }

    /// Delays the refresh completion signal, to observe synchronous waits.
    pub fn set_refresh_delay(&self, delay: Option<Duration>) {
        *lock(&self.refresh_delay) = delay;
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    pub fn gc_count(&self) -> u64 {
        self.gc_count.load(Ordering::SeqCst)
    }

    pub fn register_service(
        &self,
        kind: ServiceKind,
        properties: BTreeMap<String, TypedValue>,
        extension: Option<Arc<dyn Extension>>,
    ) -> u64 {
        let service_id = self.next_service_id.fetch_add(1, Ordering::SeqCst);
        let event = ServiceEvent {
            service_id,
            properties,
            extension,
        };
        let watchers = {
            let mut state = lock(&self.state);
            state.services.insert(
                service_id,
                RegisteredService {
                    kind,
                    unit_id: SYSTEM_UNIT_ID,
                    event: event.clone(),
                },
            );
            watchers_for(&state, kind)
        };
        for watcher in watchers {
            watcher.added(&event);
        }
        service_id
    }

    pub fn modify_service(&self, service_id: u64, properties: BTreeMap<String, TypedValue>) -> bool {
        let (kind, previous, current) = {
            let mut state = lock(&self.state);
            let Some(service) = state.services.get_mut(&service_id) else {
                return false;
            };
            let previous = service.event.clone();
            service.event.properties = properties;
            (service.kind, previous, service.event.clone())
        };
        let watchers = watchers_for(&lock(&self.state), kind);
        for watcher in watchers {
            watcher.modified(&previous, &current);
        }
        true
    }

    pub fn unregister_service(&self, service_id: u64) -> bool {
        let (removed, watchers) = {
            let mut state = lock(&self.state);
            let Some(removed) = state.services.remove(&service_id) else {
                return false;
            };
            let watchers = watchers_for(&state, removed.kind);
            (removed, watchers)
        };
        for watcher in watchers {
            watcher.removed(&removed.event);
        }
        true
    }

    pub fn watcher_count(&self) -> usize {
        lock(&self.state).watchers.len()
    }
}

fn watchers_for(state: &HostState, kind: ServiceKind) -> Vec<Arc<dyn ServiceWatcher>> {
    state
        .watchers
        .values()
        .filter(|(watched, _)| *watched == kind)
        .map(|(_, watcher)| watcher.clone())
        .collect()
}

/// Rejects an identity already held by a unit other than `except`.
fn ensure_identity_free(
    state: &HostState,
    symbolic_name: &str,
    version: &str,
    except: Option<u64>,
) -> Result<(), HostError> {
    let holder = state.units.values().find(|unit| {
        Some(unit.info.id) != except
            && unit.info.symbolic_name == symbolic_name
            && unit.info.version == version
    });
    match holder {
        Some(unit) => Err(HostError::IdentityTaken {
            symbolic_name: symbolic_name.to_string(),
            version: version.to_string(),
            id: unit.info.id,
        }),
        None => Ok(()),
    }
}

fn identity_capability(symbolic_name: &str, version: &str) -> NamespaceEntry {
    let mut attributes = BTreeMap::new();
    attributes.insert("unit.identity".to_string(), symbolic_name.to_string());
    attributes.insert("version".to_string(), version.to_string());
    NamespaceEntry {
        namespace: "unit.identity".to_string(),
        directives: BTreeMap::new(),
        attributes,
    }
}

fn read_unit(image: &[u8]) -> Result<(UnitIdentity, RevisionDescriptor), HostError> {
    let identity = descriptor::identify(image).map_err(|err| HostError::Rejected(err.to_string()))?;
    let headers = descriptor::read_manifest(image).map_err(|err| HostError::Rejected(err.to_string()))?;
    let version = identity.version.to_string();
    let requirements = headers
        .get(IMPORTS_HEADER)
        .map(|imports| {
            imports
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    let mut attributes = BTreeMap::new();
                    attributes.insert("unit.package".to_string(), name.to_string());
                    NamespaceEntry {
                        namespace: "unit.package".to_string(),
                        directives: BTreeMap::new(),
                        attributes,
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    let revision = RevisionDescriptor {
        symbolic_name: identity.symbolic_name.clone(),
        version: version.clone(),
        requirements,
        capabilities: vec![identity_capability(&identity.symbolic_name, &version)],
    };
    Ok((identity, revision))
}

impl HostRuntime for InMemoryHost {
    fn units(&self) -> Vec<UnitInfo> {
        lock(&self.state)
            .units
            .values()
            .map(|unit| unit.info.clone())
            .collect()
    }

    fn unit(&self, id: u64) -> Option<UnitInfo> {
        lock(&self.state).units.get(&id).map(|unit| unit.info.clone())
    }

    fn unit_by_location(&self, location: &str) -> Option<UnitInfo> {
        lock(&self.state)
            .units
            .values()
            .find(|unit| unit.info.location == location)
            .map(|unit| unit.info.clone())
    }

    fn install(&self, location: &str, image: &[u8]) -> Result<UnitInfo, HostError> {
        let (identity, revision) = read_unit(image)?;
        let mut state = lock(&self.state);
        if state.units.values().any(|unit| unit.info.location == location) {
            return Err(HostError::LocationTaken(location.to_string()));
        }
        let version = identity.version.to_string();
        ensure_identity_free(&state, &identity.symbolic_name, &version, None)?;
        let id = self.next_unit_id.fetch_add(1, Ordering::SeqCst);
        let info = UnitInfo {
            id,
            symbolic_name: identity.symbolic_name,
            version,
            location: location.to_string(),
            state: UnitState::Installed,
            start_level: 1,
            last_modified: now_millis(),
        };
        state.units.insert(
            id,
            StoredUnit {
                info: info.clone(),
                revision,
            },
        );
        tracing::debug!(unit_id = id, location = %location, "unit installed");
        Ok(info)
    }

    fn update(&self, id: u64, image: &[u8]) -> Result<UnitInfo, HostError> {
        let (identity, revision) = read_unit(image)?;
        let mut state = lock(&self.state);
        let version = identity.version.to_string();
        ensure_identity_free(&state, &identity.symbolic_name, &version, Some(id))?;
        let unit = state.units.get_mut(&id).ok_or(HostError::UnknownUnit(id))?;
        unit.info.symbolic_name = identity.symbolic_name;
        unit.info.version = version;
        unit.info.last_modified = now_millis();
        unit.revision = revision;
        Ok(unit.info.clone())
    }

    fn set_start_level(&self, id: u64, level: i32) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        let unit = state.units.get_mut(&id).ok_or(HostError::UnknownUnit(id))?;
        unit.info.start_level = level;
        Ok(())
    }

    fn start(&self, id: u64) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        let unit = state.units.get_mut(&id).ok_or(HostError::UnknownUnit(id))?;
        unit.info.state = UnitState::Active;
        Ok(())
    }

    fn stop(&self, id: u64) -> Result<(), HostError> {
        if id == SYSTEM_UNIT_ID {
            return Err(HostError::Rejected(
                "the system unit cannot be stopped".to_string(),
            ));
        }
        let mut state = lock(&self.state);
        let unit = state.units.get_mut(&id).ok_or(HostError::UnknownUnit(id))?;
        unit.info.state = UnitState::Resolved;
        Ok(())
    }

    fn uninstall(&self, id: u64) -> Result<(), HostError> {
        if id == SYSTEM_UNIT_ID {
            return Err(HostError::Rejected(
                "the system unit cannot be uninstalled".to_string(),
            ));
        }
        lock(&self.state)
            .units
            .remove(&id)
            .map(|_| ())
            .ok_or(HostError::UnknownUnit(id))
    }

    fn revision(&self, id: u64) -> Option<RevisionDescriptor> {
        lock(&self.state).units.get(&id).map(|unit| unit.revision.clone())
    }

    fn refresh(&self, done: oneshot::Sender<()>) -> Result<(), HostError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        match *lock(&self.refresh_delay) {
            Some(delay) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    let _ = done.send(());
                });
            }
            None => {
                let _ = done.send(());
            }
        }
        Ok(())
    }

    fn is_package_wired(&self, package: &str) -> bool {
        lock(&self.state).wired.contains(package)
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        let mut properties = vec![
            PropertyInfo {
                name: "runtime.vendor".to_string(),
                value: "mgmt-agent".to_string(),
                kind: PropertyKind::Framework,
            },
            PropertyInfo {
                name: "runtime.version".to_string(),
                value: env!("CARGO_PKG_VERSION").to_string(),
                kind: PropertyKind::Framework,
            },
        ];
        properties.extend(std::env::vars().map(|(name, value)| PropertyInfo {
            name,
            value,
            kind: PropertyKind::System,
        }));
        properties
    }

    fn services(&self) -> Vec<ServiceInfo> {
        lock(&self.state)
            .services
            .values()
            .map(|service| ServiceInfo {
                id: service.event.service_id,
                unit_id: service.unit_id,
                interfaces: vec![match service.kind {
                    ServiceKind::Extension => "agent.extension".to_string(),
                    ServiceKind::CommandProvider => "command.provider".to_string(),
                    ServiceKind::Subsystem(capability) => capability.package().to_string(),
                }],
                properties: service
                    .event
                    .properties
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json().to_string()))
                    .collect(),
                using_units: Vec::new(),
            })
            .collect()
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        let current = std::thread::current();
        vec![ThreadInfo {
            id: 1,
            name: current.name().unwrap_or("unnamed").to_string(),
            state: "RUNNABLE".to_string(),
            daemon: false,
        }]
    }

    fn memory(&self) -> MemoryInfo {
        MemoryInfo::default()
    }

    fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn gc(&self) {
        self.gc_count.fetch_add(1, Ordering::SeqCst);
    }

    fn watch(&self, kind: ServiceKind, watcher: Arc<dyn ServiceWatcher>) -> WatchId {
        let id = WatchId(self.next_watch_id.fetch_add(1, Ordering::SeqCst));
        let existing: Vec<ServiceEvent> = {
            let mut state = lock(&self.state);
            state.watchers.insert(id, (kind, watcher.clone()));
            state
                .services
                .values()
                .filter(|service| service.kind == kind)
                .map(|service| service.event.clone())
                .collect()
        };
        for event in &existing {
            watcher.added(event);
        }
        id
    }

    fn unwatch(&self, id: WatchId) {
        lock(&self.state).watchers.remove(&id);
    }

    fn component_runtime(&self) -> Option<Arc<dyn ComponentRuntime>> {
        lock(&self.state).subsystems.component_runtime.clone()
    }

    fn config_admin(&self) -> Option<Arc<dyn ConfigAdmin>> {
        lock(&self.state).subsystems.config_admin.clone()
    }

    fn metatype(&self) -> Option<Arc<dyn MetatypeProvider>> {
        lock(&self.state).subsystems.metatype.clone()
    }

    fn event_bus(&self) -> Option<Arc<dyn EventBus>> {
        lock(&self.state).subsystems.event_bus.clone()
    }

    fn user_admin(&self) -> Option<Arc<dyn UserAdmin>> {
        lock(&self.state).subsystems.user_admin.clone()
    }

    fn logger_admin(&self) -> Option<Arc<dyn LoggerAdmin>> {
        lock(&self.state).subsystems.logger_admin.clone()
    }

    fn device_tree(&self) -> Option<Arc<dyn DeviceTree>> {
        lock(&self.state).subsystems.device_tree.clone()
    }

    fn health_checks(&self) -> Option<Arc<dyn HealthCheckExecutor>> {
        lock(&self.state).subsystems.health_checks.clone()
    }

    fn http_runtime(&self) -> Option<Arc<dyn HttpRuntime>> {
        lock(&self.state).subsystems.http_runtime.clone()
    }

    fn heap(&self) -> Option<Arc<dyn HeapInspector>> {
        lock(&self.state).subsystems.heap.clone()
    }

    fn command_shell(&self) -> Option<Arc<dyn CommandShell>> {
        lock(&self.state).subsystems.command_shell.clone()
    }

    fn log_reader(&self) -> Option<Arc<dyn LogReader>> {
        lock(&self.state).subsystems.log_reader.clone()
    }
}

#[derive(Default)]
pub struct MemoryConfigAdmin {
    entries: Mutex<BTreeMap<String, (Option<String>, Properties)>>,
    factory_counter: AtomicU64,
}

impl ConfigAdmin for MemoryConfigAdmin {
    fn configurations(&self) -> Vec<ConfigurationInfo> {
        lock(&self.entries)
            .iter()
            .map(|(pid, (factory_pid, properties))| ConfigurationInfo {
                pid: pid.clone(),
                factory_pid: factory_pid.clone(),
                properties: properties
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
                source: ConfigurationSource::Store,
            })
            .collect()
    }

    fn create_or_update(&self, pid: &str, properties: Properties) -> Result<bool, HostError> {
        let mut entries = lock(&self.entries);
        match entries.get_mut(pid) {
            Some((_, existing)) => {
                *existing = properties;
                Ok(false)
            }
            None => {
                entries.insert(pid.to_string(), (None, properties));
                Ok(true)
            }
        }
    }

    fn delete(&self, pid: &str) -> Result<bool, HostError> {
        Ok(lock(&self.entries).remove(pid).is_some())
    }

    fn create_factory(&self, factory_pid: &str, properties: Properties) -> Result<String, HostError> {
        let sequence = self.factory_counter.fetch_add(1, Ordering::SeqCst);
        let pid = format!("{factory_pid}~{sequence}");
        lock(&self.entries).insert(pid.clone(), (Some(factory_pid.to_string()), properties));
        Ok(pid)
    }
}

#[derive(Default)]
pub struct MemoryEventBus {
    subscribers: Mutex<BTreeMap<ListenerId, (String, BusSink)>>,
}

impl MemoryEventBus {
    fn matching(&self, topic: &str) -> Vec<BusSink> {
        lock(&self.subscribers)
            .values()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, sink)| sink.clone())
            .collect()
    }
}

fn topic_matches(filter: &str, topic: &str) -> bool {
    match filter.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => filter == topic,
    }
}

fn bus_event(topic: &str, properties: &Properties) -> BusEvent {
    BusEvent {
        topic: topic.to_string(),
        properties: properties
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect(),
    }
}

impl EventBus for MemoryEventBus {
    fn send(&self, topic: &str, properties: Properties) -> Result<(), HostError> {
        let event = bus_event(topic, &properties);
        for sink in self.matching(topic) {
            sink(event.clone());
        }
        Ok(())
    }

    fn post(&self, topic: &str, properties: Properties) -> Result<(), HostError> {
        let event = bus_event(topic, &properties);
        let sinks = self.matching(topic);
        std::thread::spawn(move || {
            for sink in sinks {
                sink(event.clone());
            }
        });
        Ok(())
    }

    fn subscribe(&self, topic_filter: &str, sink: BusSink) -> ListenerId {
        let id = next_listener_id();
        lock(&self.subscribers).insert(id, (topic_filter.to_string(), sink));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        lock(&self.subscribers).remove(&id);
    }
}

#[derive(Default)]
pub struct MemoryUserAdmin {
    roles: Mutex<BTreeMap<String, RoleInfo>>,
}

impl UserAdmin for MemoryUserAdmin {
    fn roles(&self) -> Vec<RoleInfo> {
        lock(&self.roles).values().cloned().collect()
    }

    fn create_role(&self, name: &str, role_type: RoleType) -> Result<bool, HostError> {
        let mut roles = lock(&self.roles);
        if roles.contains_key(name) {
            return Ok(false);
        }
        roles.insert(name.to_string(), RoleInfo::new(name, role_type));
        Ok(true)
    }

    fn update_role(&self, role: &RoleInfo) -> Result<(), HostError> {
        let mut roles = lock(&self.roles);
        let existing = roles
            .get_mut(&role.name)
            .ok_or_else(|| HostError::Rejected(format!("role {} does not exist", role.name)))?;
        if existing.role_type != role.role_type {
            return Err(HostError::Rejected(format!(
                "role {} cannot change its type",
                role.name
            )));
        }
        *existing = role.clone();
        Ok(())
    }

    fn remove_role(&self, name: &str) -> Result<bool, HostError> {
        Ok(lock(&self.roles).remove(name).is_some())
    }
}

#[derive(Default)]
pub struct MemoryLogReader {
    listeners: Mutex<BTreeMap<ListenerId, LogSink>>,
}

impl MemoryLogReader {
    /// Delivers a record to every registered listener.
    pub fn log(&self, record: LogRecord) {
        let listeners: Vec<LogSink> = lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener(record.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

impl LogReader for MemoryLogReader {
    fn add_listener(&self, sink: LogSink) -> ListenerId {
        let id = next_listener_id();
        lock(&self.listeners).insert(id, sink);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        lock(&self.listeners).remove(&id);
    }
}

/// Minimal shell: `echo`, `lb` (list units) and `help`.
pub struct MemoryShell {
    host: std::sync::Weak<InMemoryHost>,
}

impl MemoryShell {
    pub fn new(host: std::sync::Weak<InMemoryHost>) -> Self {
        Self { host }
    }
}

impl CommandShell for MemoryShell {
    fn open_session(&self) -> Result<Box<dyn ShellSession>, HostError> {
        Ok(Box::new(MemoryShellSession {
            host: self.host.clone(),
            closed: false,
        }))
    }
}

struct MemoryShellSession {
    host: std::sync::Weak<InMemoryHost>,
    closed: bool,
}

impl ShellSession for MemoryShellSession {
    fn execute(&mut self, line: &str) -> Result<String, HostError> {
        if self.closed {
            return Err(HostError::Unavailable("shell session".to_string()));
        }
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "echo" => Ok(rest.to_string()),
            "help" => Ok("echo <text>\nlb\nhelp".to_string()),
            "lb" => {
                let host = self
                    .host
                    .upgrade()
                    .ok_or_else(|| HostError::Unavailable("host".to_string()))?;
                Ok(host
                    .units()
                    .iter()
                    .map(|unit| {
                        format!(
                            "{:>4}|{:?}|{} ({})",
                            unit.id, unit.state, unit.symbolic_name, unit.version
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            other => Err(HostError::Rejected(format!("command not found: {other}"))),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
