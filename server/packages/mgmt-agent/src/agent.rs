//! The management surface exposed to the remote controller.
//!
//! Every operation follows the same shape: validate inputs, check the
//! capability it needs, delegate, and wrap the outcome. A missing capability
//! is reported as `SKIPPED`; only caller contract violations become errors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use mgmt_agent_error::AgentError;
use serde_json::{Map, Value};

use crate::adapters::{
    ComponentSelector, ComponentsAdapter, ConfigurationsAdapter, DeviceTreeAdapter,
    EventsAdapter, HealthAdapter, HeapAdapter, HttpAdapter, LoggerAdapter, RolesAdapter,
};
use crate::capability::{not_wired_message, Capability, CapabilityRegistry, CapabilityWatcher};
use crate::commands::CommandCatalog;
use crate::config::AgentConfig;
use crate::dto::{
    ComponentInfo, ConfigurationInfo, DeviceNode, DeviceValueType, Gated, HealthCheckInfo,
    HealthCheckResult, HeapDump, HeapUsage, HttpComponentInfo, LoggerContextInfo, MemoryInfo,
    NamespaceRecord, OpResult, PropertyInfo, RoleInfo, RoleType, ServiceInfo, ThreadInfo,
    UnitInfo, UnitRevision,
};
use crate::extensions::ExtensionRegistry;
use crate::host::{
    EventBus, HostError, HostRuntime, LeakDetector, LeakSink, ListenerId, LogReader,
    NamespaceEntry, Properties, ServiceKind, ServiceWatcher, WatchId,
};
use crate::install::InstallPipeline;
use crate::lifecycle::Lifecycle;
use crate::push::{PushChannel, PushEvent};
use crate::redirector::Redirector;
use crate::system_command;
use crate::values::{convert_properties, convert_untyped, payload_to_json, ConfigValue};

/// Identifiers for derived revision records. Never reused within a process.
static REVISION_SEQUENCE: AtomicU64 = AtomicU64::new(1000);

const CONVERSION_FAILED: &str =
    "One or more configuration properties cannot be converted to the requested type";

fn require(value: &str, what: &str) -> Result<(), AgentError> {
    if value.trim().is_empty() {
        return Err(AgentError::invalid_request(format!("{what} cannot be empty")));
    }
    Ok(())
}

fn skipped<T>(capability: Capability) -> Gated<T> {
    Gated::Skipped {
        message: not_wired_message(capability),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Push forwarders registered while the link is open.
struct Forwarding {
    host: Arc<dyn HostRuntime>,
    push: PushChannel,
    log: Mutex<Option<(Arc<dyn LogReader>, ListenerId)>>,
    bus: Mutex<Option<(Arc<dyn EventBus>, ListenerId)>>,
}

impl Forwarding {
    fn attach_log(&self) {
        if !CapabilityRegistry::new(self.host.clone()).is_wired(Capability::Log) {
            return;
        }
        let mut slot = lock(&self.log);
        if slot.is_some() {
            return;
        }
        let Some(reader) = self.host.log_reader() else {
            return;
        };
        let push = self.push.clone();
        let id = reader.add_listener(Arc::new(move |record| {
            push.publish(PushEvent::Log(record));
        }));
        tracing::debug!("log forwarding attached");
        *slot = Some((reader, id));
    }

    fn detach_log(&self) {
        if let Some((reader, id)) = lock(&self.log).take() {
            reader.remove_listener(id);
        }
    }

    fn attach_bus(&self) {
        if !CapabilityRegistry::new(self.host.clone()).is_wired(Capability::EventAdmin) {
            return;
        }
        let mut slot = lock(&self.bus);
        if slot.is_some() {
            return;
        }
        let Some(bus) = self.host.event_bus() else {
            return;
        };
        let push = self.push.clone();
        let id = bus.subscribe(
            "*",
            Arc::new(move |event| {
                push.publish(PushEvent::Event(event));
            }),
        );
        tracing::debug!("event forwarding attached");
        *slot = Some((bus, id));
    }

    fn detach_bus(&self) {
        if let Some((bus, id)) = lock(&self.bus).take() {
            bus.unsubscribe(id);
        }
    }
}

pub struct AgentServer {
    host: Arc<dyn HostRuntime>,
    config: AgentConfig,
    extensions: Arc<ExtensionRegistry>,
    commands: Arc<CommandCatalog>,
    redirector: Redirector,
    installer: InstallPipeline,
    push: PushChannel,
    lifecycle: Lifecycle,
    leak_detector: Option<Arc<dyn LeakDetector>>,
    forwarding: Arc<Forwarding>,
    watches: Mutex<Vec<WatchId>>,
}

impl AgentServer {
    /// Creates the agent, starts watching the host and opens the link.
    pub fn new(
        host: Arc<dyn HostRuntime>,
        config: AgentConfig,
        leak_detector: Option<Arc<dyn LeakDetector>>,
    ) -> Arc<Self> {
        let push = PushChannel::new(config.ring_size);
        let forwarding = Arc::new(Forwarding {
            host: host.clone(),
            push: push.clone(),
            log: Mutex::new(None),
            bus: Mutex::new(None),
        });
        let agent = Arc::new(Self {
            host: host.clone(),
            extensions: Arc::new(ExtensionRegistry::new()),
            commands: Arc::new(CommandCatalog::new()),
            redirector: Redirector::new(host.clone(), push.clone()),
            installer: InstallPipeline::new(host),
            push,
            lifecycle: Lifecycle::new(),
            leak_detector,
            forwarding,
            watches: Mutex::new(Vec::new()),
            config,
        });
        agent.open_watches();
        agent.attach_link();
        agent
    }

    fn open_watches(&self) {
        let mut watches = lock(&self.watches);
        watches.push(self.host.watch(
            ServiceKind::Extension,
            self.extensions.clone() as Arc<dyn ServiceWatcher>,
        ));
        watches.push(self.host.watch(
            ServiceKind::CommandProvider,
            self.commands.clone() as Arc<dyn ServiceWatcher>,
        ));
        for capability in Capability::ALL {
            let appeared = self.forwarding.clone();
            let disappeared = self.forwarding.clone();
            let watcher = CapabilityWatcher::new(
                capability,
                move |capability, event| {
                    tracing::info!(capability = %capability, service_id = event.service_id, "subsystem appeared");
                    match capability {
                        Capability::Log => appeared.attach_log(),
                        Capability::EventAdmin => appeared.attach_bus(),
                        _ => {}
                    }
                },
                move |capability, event| {
                    tracing::info!(capability = %capability, service_id = event.service_id, "subsystem disappeared");
                    match capability {
                        Capability::Log => disappeared.detach_log(),
                        Capability::EventAdmin => disappeared.detach_bus(),
                        _ => {}
                    }
                },
            );
            watches.push(
                self.host
                    .watch(ServiceKind::Subsystem(capability), Arc::new(watcher)),
            );
        }
    }

    fn attach_link(&self) {
        self.forwarding.attach_log();
        self.forwarding.attach_bus();
        if let Some(detector) = &self.leak_detector {
            let push = self.push.clone();
            let sink: LeakSink = Arc::new(move |units| {
                push.publish(PushEvent::LeakAlert(units));
            });
            detector.set_alert_sink(Some(sink));
        }
    }

    pub fn push_channel(&self) -> &PushChannel {
        &self.push
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.lifecycle.is_running()
    }

    fn capabilities(&self) -> CapabilityRegistry {
        CapabilityRegistry::new(self.host.clone())
    }

    fn gate(&self, capability: Capability) -> bool {
        let wired = self.capabilities().is_wired(capability);
        if !wired {
            tracing::debug!(capability = %capability, "capability not wired; skipping");
        }
        wired
    }

    // Unit lifecycle

    pub async fn install(
        &self,
        location: Option<&str>,
        image: &[u8],
        start_level: i32,
    ) -> Result<UnitInfo, AgentError> {
        if let Some(location) = location {
            require(location, "unit location")?;
        }
        self.installer.install(location, image, start_level, true).await
    }

    pub async fn install_from_url(&self, location: &str, url: &str) -> Result<UnitInfo, AgentError> {
        require(location, "unit location")?;
        require(url, "unit URL")?;
        self.installer.install_from_url(location, url).await
    }

    pub async fn install_batch(&self, images: &[Vec<u8>], start_level: i32) -> OpResult {
        self.installer.install_batch(images, start_level).await
    }

    /// Like [`AgentServer::install_batch`], with entries that may already carry
    /// a decode failure.
    pub async fn install_batch_entries(
        &self,
        entries: &[Result<Vec<u8>, AgentError>],
        start_level: i32,
    ) -> OpResult {
        let entries: Vec<Result<&[u8], AgentError>> = entries
            .iter()
            .map(|entry| match entry {
                Ok(image) => Ok(image.as_slice()),
                Err(err) => Err(err.clone()),
            })
            .collect();
        self.installer.install_entries(entries, start_level).await
    }

    /// Starts every id; returns the collected failures, one per line.
    pub fn start(&self, ids: &[u64]) -> Option<String> {
        self.for_each_unit(ids, "start", |id| self.host.start(id))
    }

    pub fn stop(&self, ids: &[u64]) -> Option<String> {
        self.for_each_unit(ids, "stop", |id| self.host.stop(id))
    }

    pub async fn uninstall(&self, ids: &[u64]) -> Option<String> {
        let mut failures = String::new();
        for &id in ids {
            let location = self.host.unit(id).map(|unit| unit.location);
            match self.host.uninstall(id) {
                Ok(()) => {
                    tracing::info!(unit_id = id, "unit uninstalled");
                    if let Some(location) = location {
                        self.installer.forget(&location).await;
                    }
                }
                Err(err) => {
                    tracing::warn!(unit_id = id, error = %err, "unit uninstall failed");
                    failures.push_str(&err.to_string());
                    failures.push('\n');
                }
            }
        }
        (!failures.is_empty()).then_some(failures)
    }

    fn for_each_unit<F>(&self, ids: &[u64], action: &str, apply: F) -> Option<String>
    where
        F: Fn(u64) -> Result<(), HostError>,
    {
        let mut failures = String::new();
        for &id in ids {
            match apply(id) {
                Ok(()) => tracing::info!(unit_id = id, action = action, "unit transitioned"),
                Err(err) => {
                    tracing::warn!(unit_id = id, action = action, error = %err, "unit transition failed");
                    failures.push_str(&err.to_string());
                    failures.push('\n');
                }
            }
        }
        (!failures.is_empty()).then_some(failures)
    }

    pub fn list_units(&self) -> Vec<UnitInfo> {
        self.host.units()
    }

    /// Empty `ids` lists every unit. Unknown ids are a caller error.
    pub fn list_unit_revisions(&self, ids: &[u64]) -> Result<Vec<UnitRevision>, AgentError> {
        let ids: Vec<u64> = if ids.is_empty() {
            self.host.units().into_iter().map(|unit| unit.id).collect()
        } else {
            for &id in ids {
                if self.host.unit(id).is_none() {
                    return Err(AgentError::UnitNotFound { id });
                }
            }
            ids.to_vec()
        };

        ids.into_iter()
            .map(|id| {
                let revision = self.host.revision(id).ok_or(AgentError::UnitNotFound { id })?;
                let revision_id = REVISION_SEQUENCE.fetch_add(1, Ordering::SeqCst);
                Ok(UnitRevision {
                    id: revision_id,
                    unit: id,
                    symbolic_name: revision.symbolic_name,
                    version: revision.version,
                    requirements: revision
                        .requirements
                        .into_iter()
                        .map(|entry| namespace_record(revision_id, entry))
                        .collect(),
                    capabilities: revision
                        .capabilities
                        .into_iter()
                        .map(|entry| namespace_record(revision_id, entry))
                        .collect(),
                })
            })
            .collect()
    }

    pub async fn refresh(&self, asynchronous: bool) {
        self.installer.refresh(asynchronous).await;
    }

    // Introspection

    pub fn list_components(&self) -> Gated<Vec<ComponentInfo>> {
        if !self.gate(Capability::Scr) {
            return skipped(Capability::Scr);
        }
        Gated::Success {
            value: self
                .host
                .component_runtime()
                .map(|runtime| ComponentsAdapter::new(runtime).list())
                .unwrap_or_default(),
        }
    }

    /// Skipped only when neither the store nor metatype is wired.
    pub fn list_configurations(&self) -> Gated<Vec<ConfigurationInfo>> {
        let store_wired = self.gate(Capability::Cm);
        let metatype_wired = self.gate(Capability::Metatype);
        if !store_wired && !metatype_wired {
            return skipped(Capability::Cm);
        }
        let adapter = ConfigurationsAdapter::new(
            store_wired.then(|| self.host.config_admin()).flatten(),
            metatype_wired.then(|| self.host.metatype()).flatten(),
        );
        Gated::Success {
            value: adapter.list(),
        }
    }

    pub fn list_properties(&self) -> Vec<PropertyInfo> {
        self.host.properties()
    }

    pub fn list_services(&self) -> Vec<ServiceInfo> {
        self.host.services()
    }

    pub fn list_threads(&self) -> Vec<ThreadInfo> {
        self.host.threads()
    }

    pub fn list_roles(&self) -> Gated<Vec<RoleInfo>> {
        if !self.gate(Capability::UserAdmin) {
            return skipped(Capability::UserAdmin);
        }
        Gated::Success {
            value: self
                .host
                .user_admin()
                .map(|admin| RolesAdapter::new(admin).list())
                .unwrap_or_default(),
        }
    }

    pub fn list_health_checks(&self) -> Gated<Vec<HealthCheckInfo>> {
        if !self.gate(Capability::HealthCheck) {
            return skipped(Capability::HealthCheck);
        }
        Gated::Success {
            value: self
                .host
                .health_checks()
                .map(|executor| HealthAdapter::new(executor).list())
                .unwrap_or_default(),
        }
    }

    pub fn execute_health_checks(&self, tags: &[String], names: &[String]) -> Gated<Vec<HealthCheckResult>> {
        if !self.gate(Capability::HealthCheck) {
            return skipped(Capability::HealthCheck);
        }
        Gated::Success {
            value: self
                .host
                .health_checks()
                .map(|executor| HealthAdapter::new(executor).execute(tags, names))
                .unwrap_or_default(),
        }
    }

    pub fn list_http_components(&self) -> Gated<Vec<HttpComponentInfo>> {
        if !self.gate(Capability::HttpRuntime) {
            return skipped(Capability::HttpRuntime);
        }
        Gated::Success {
            value: HttpAdapter::new(self.host.http_runtime()).list(),
        }
    }

    pub fn list_logger_contexts(&self) -> Gated<Vec<LoggerContextInfo>> {
        if !self.gate(Capability::R7Logger) {
            return skipped(Capability::R7Logger);
        }
        let config_wired = self.capabilities().is_wired(Capability::Cm);
        Gated::Success {
            value: self
                .host
                .logger_admin()
                .map(|admin| LoggerAdapter::new(admin, config_wired).contexts())
                .unwrap_or_default(),
        }
    }

    pub fn list_shell_commands(&self) -> BTreeSet<String> {
        self.commands.snapshot()
    }

    // Mutation

    pub fn enable_component(&self, selector: &ComponentSelector) -> Result<OpResult, AgentError> {
        if let ComponentSelector::Name(name) = selector {
            require(name, "component name")?;
        }
        if !self.gate(Capability::Scr) {
            return Ok(OpResult::skipped(not_wired_message(Capability::Scr)));
        }
        Ok(match self.host.component_runtime() {
            Some(runtime) => ComponentsAdapter::new(runtime).enable(selector),
            None => crate::adapters::service_missing(Capability::Scr),
        })
    }

    pub fn disable_component(&self, selector: &ComponentSelector) -> Result<OpResult, AgentError> {
        if let ComponentSelector::Name(name) = selector {
            require(name, "component name")?;
        }
        if !self.gate(Capability::Scr) {
            return Ok(OpResult::skipped(not_wired_message(Capability::Scr)));
        }
        Ok(match self.host.component_runtime() {
            Some(runtime) => ComponentsAdapter::new(runtime).disable(selector),
            None => crate::adapters::service_missing(Capability::Scr),
        })
    }

    fn configurations(&self) -> Option<ConfigurationsAdapter> {
        if !self.gate(Capability::Cm) {
            return None;
        }
        Some(ConfigurationsAdapter::new(
            self.host.config_admin(),
            None,
        ))
    }

    pub fn create_or_update_configuration(
        &self,
        pid: &str,
        properties: &[ConfigValue],
    ) -> Result<OpResult, AgentError> {
        require(pid, "configuration PID")?;
        let properties = match convert_properties(properties) {
            Ok(properties) => properties,
            Err(err) => return Ok(OpResult::error(format!("{CONVERSION_FAILED}: {err}"))),
        };
        let Some(adapter) = self.configurations() else {
            return Ok(OpResult::skipped(not_wired_message(Capability::Cm)));
        };
        Ok(adapter
            .create_or_update(pid, properties)
            .unwrap_or_else(|| crate::adapters::service_missing(Capability::Cm)))
    }

    /// Each entry is gated and converted on its own.
    pub fn create_or_update_configurations(
        &self,
        configurations: &BTreeMap<String, Map<String, Value>>,
    ) -> BTreeMap<String, OpResult> {
        configurations
            .iter()
            .map(|(pid, properties)| {
                let result = match convert_untyped(properties) {
                    Err(err) => OpResult::error(format!("{CONVERSION_FAILED}: {err}")),
                    Ok(properties) => match self.configurations() {
                        None => OpResult::skipped(not_wired_message(Capability::Cm)),
                        Some(adapter) => adapter
                            .create_or_update(pid, properties)
                            .unwrap_or_else(|| crate::adapters::service_missing(Capability::Cm)),
                    },
                };
                (pid.clone(), result)
            })
            .collect()
    }

    pub fn delete_configuration(&self, pid: &str) -> Result<OpResult, AgentError> {
        require(pid, "configuration PID")?;
        let Some(adapter) = self.configurations() else {
            return Ok(OpResult::skipped(not_wired_message(Capability::Cm)));
        };
        Ok(adapter
            .delete(pid)
            .unwrap_or_else(|| crate::adapters::service_missing(Capability::Cm)))
    }

    pub fn create_factory_configuration(
        &self,
        factory_pid: &str,
        properties: &[ConfigValue],
    ) -> Result<OpResult, AgentError> {
        require(factory_pid, "configuration factory PID")?;
        let Some(adapter) = self.configurations() else {
            return Ok(OpResult::skipped(not_wired_message(Capability::Cm)));
        };
        let properties = match convert_properties(properties) {
            Ok(properties) => properties,
            Err(err) => return Ok(OpResult::error(format!("{CONVERSION_FAILED}: {err}"))),
        };
        Ok(adapter
            .create_factory(factory_pid, properties)
            .unwrap_or_else(|| crate::adapters::service_missing(Capability::Cm)))
    }

    fn roles(&self) -> Result<RolesAdapter, OpResult> {
        if !self.gate(Capability::UserAdmin) {
            return Err(OpResult::skipped(not_wired_message(Capability::UserAdmin)));
        }
        self.host
            .user_admin()
            .map(RolesAdapter::new)
            .ok_or_else(|| crate::adapters::service_missing(Capability::UserAdmin))
    }

    pub fn create_role(&self, name: &str, role_type: RoleType) -> Result<OpResult, AgentError> {
        require(name, "role name")?;
        Ok(match self.roles() {
            Ok(adapter) => adapter.create(name, role_type),
            Err(result) => result,
        })
    }

    pub fn update_role(&self, role: &RoleInfo) -> Result<OpResult, AgentError> {
        require(&role.name, "role name")?;
        Ok(match self.roles() {
            Ok(adapter) => adapter.update(role),
            Err(result) => result,
        })
    }

    pub fn remove_role(&self, name: &str) -> Result<OpResult, AgentError> {
        require(name, "role name")?;
        Ok(match self.roles() {
            Ok(adapter) => adapter.remove(name),
            Err(result) => result,
        })
    }

    pub fn update_logger_context(
        &self,
        name: &str,
        levels: &BTreeMap<String, String>,
    ) -> Result<OpResult, AgentError> {
        require(name, "logger context name")?;
        if !self.gate(Capability::R7Logger) {
            return Ok(OpResult::skipped(not_wired_message(Capability::R7Logger)));
        }
        let config_wired = self.capabilities().is_wired(Capability::Cm);
        Ok(match self.host.logger_admin() {
            Some(admin) => LoggerAdapter::new(admin, config_wired).update(name, levels),
            None => crate::adapters::service_missing(Capability::R7Logger),
        })
    }

    pub fn read_device_tree_node(&self, uri: &str) -> Result<Gated<Option<DeviceNode>>, AgentError> {
        require(uri, "device tree node URI")?;
        if !self.gate(Capability::Dmt) {
            return Ok(skipped(Capability::Dmt));
        }
        Ok(Gated::Success {
            value: self
                .host
                .device_tree()
                .and_then(|tree| DeviceTreeAdapter::new(tree).read(uri)),
        })
    }

    pub fn update_device_tree_node(
        &self,
        uri: &str,
        value: &str,
        value_type: DeviceValueType,
    ) -> Result<OpResult, AgentError> {
        require(uri, "device tree node URI")?;
        if !self.gate(Capability::Dmt) {
            return Ok(OpResult::skipped(not_wired_message(Capability::Dmt)));
        }
        Ok(match self.host.device_tree() {
            Some(tree) => DeviceTreeAdapter::new(tree).update(uri, value, value_type),
            None => crate::adapters::service_missing(Capability::Dmt),
        })
    }

    fn prepare_event(
        &self,
        topic: &str,
        properties: &[ConfigValue],
    ) -> Result<(EventsAdapter, Properties), OpResult> {
        if !self.gate(Capability::EventAdmin) {
            return Err(OpResult::skipped(not_wired_message(Capability::EventAdmin)));
        }
        let bus = self
            .host
            .event_bus()
            .ok_or_else(|| crate::adapters::service_missing(Capability::EventAdmin))?;
        let properties = convert_properties(properties).map_err(|err| {
            tracing::debug!(topic = %topic, error = %err, "event properties rejected");
            OpResult::error("Event could not be sent successfully")
        })?;
        Ok((EventsAdapter::new(bus), properties))
    }

    /// Delivers synchronously.
    pub fn send_event(&self, topic: &str, properties: &[ConfigValue]) -> Result<OpResult, AgentError> {
        require(topic, "event topic")?;
        Ok(match self.prepare_event(topic, properties) {
            Ok((adapter, properties)) => adapter.send(topic, properties),
            Err(result) => result,
        })
    }

    /// Fire-and-forget.
    pub fn post_event(&self, topic: &str, properties: &[ConfigValue]) -> Result<OpResult, AgentError> {
        require(topic, "event topic")?;
        Ok(match self.prepare_event(topic, properties) {
            Ok((adapter, properties)) => adapter.post(topic, properties),
            Err(result) => result,
        })
    }

    // Diagnostics

    /// Uptime is reported only while the management interface is wired.
    pub fn memory_info(&self) -> MemoryInfo {
        let mut info = self.host.memory();
        info.uptime_ms = if self.capabilities().is_wired(Capability::Jmx) {
            self.host.uptime_ms()
        } else {
            0
        };
        info
    }

    pub fn gc(&self) {
        self.host.gc();
    }

    pub fn heap_usage(&self) -> Gated<HeapUsage> {
        if !self.gate(Capability::Jmx) {
            return skipped(Capability::Jmx);
        }
        match self.host.heap() {
            Some(inspector) => Gated::Success {
                value: HeapAdapter::new(inspector).usage(),
            },
            None => skipped(Capability::Jmx),
        }
    }

    pub fn heap_dump(&self) -> Result<Gated<HeapDump>, AgentError> {
        if !self.gate(Capability::Jmx) {
            return Ok(skipped(Capability::Jmx));
        }
        let Some(inspector) = self.host.heap() else {
            return Ok(skipped(Capability::Jmx));
        };
        let dump = HeapAdapter::new(inspector)
            .dump()
            .map_err(|err| AgentError::HostFailure {
                message: err.to_string(),
            })?;
        Ok(Gated::Success { value: dump })
    }

    pub fn classloader_leaks(&self) -> Vec<UnitInfo> {
        self.leak_detector
            .as_ref()
            .map(|detector| detector.suspicious_units())
            .unwrap_or_default()
    }

    // Session

    /// `true` when the target changed.
    pub async fn redirect(&self, port: i32) -> Result<bool, AgentError> {
        Ok(self.redirector.redirect(port).await?.switched())
    }

    pub async fn stdin(&self, text: &str) -> Result<bool, AgentError> {
        self.redirector.stdin(text).await
    }

    pub async fn exec_shell_command(&self, command: &str) -> Result<Option<String>, AgentError> {
        require(command, "shell command")?;
        self.redirector.exec_shell_command(command).await
    }

    pub async fn exec_system_command(&self, command: &str) -> Result<String, AgentError> {
        require(command, "system command")?;
        Ok(system_command::exec_system_command(
            command,
            self.config.result_timeout,
            self.config.watchdog_timeout,
        )
        .await)
    }

    // Extensions

    pub fn execute_extension(
        &self,
        name: &str,
        context: &Map<String, Value>,
    ) -> Result<Map<String, Value>, AgentError> {
        require(name, "agent extension name")?;
        let extension = self
            .extensions
            .get(name)
            .ok_or_else(|| AgentError::ExtensionNotFound {
                name: name.to_string(),
            })?;
        let failed = |message: String| AgentError::ExtensionFailed {
            name: name.to_string(),
            message,
        };
        let input = extension
            .input_shape()
            .conform(context)
            .map_err(|err| failed(err.to_string()))?;
        let output = extension.execute(input).map_err(|err| failed(err.to_string()))?;
        Ok(payload_to_json(&output))
    }

    pub fn extension_names(&self) -> Vec<String> {
        self.extensions.names()
    }

    // Liveness and teardown

    pub fn ping(&self) -> bool {
        self.is_open()
    }

    /// Tears everything down once; later calls return `false` and do nothing.
    pub async fn shutdown(&self) -> bool {
        if !self.lifecycle.begin_shutdown() {
            return false;
        }
        tracing::info!("agent shutting down");
        self.redirector.close().await;
        for id in lock(&self.watches).drain(..) {
            self.host.unwatch(id);
        }
        self.forwarding.detach_log();
        self.forwarding.detach_bus();
        if let Some(detector) = &self.leak_detector {
            detector.set_alert_sink(None);
        }
        self.lifecycle.finish_shutdown();
        tracing::info!("agent link closed");
        true
    }

    /// Explicit abort from the controller.
    pub async fn abort(&self) -> bool {
        self.shutdown().await
    }

    /// Teardown triggered by the transport going away.
    pub async fn close(&self) -> bool {
        self.shutdown().await
    }

    #[cfg(test)]
    pub(crate) fn watch_count(&self) -> usize {
        lock(&self.watches).len()
    }
}

fn namespace_record(resource: u64, entry: NamespaceEntry) -> NamespaceRecord {
    NamespaceRecord {
        id: REVISION_SEQUENCE.fetch_add(1, Ordering::SeqCst),
        resource,
        namespace: entry.namespace,
        directives: entry.directives,
        attributes: entry.attributes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InMemoryHost;

    #[tokio::test]
    async fn teardown_releases_watchers_once() {
        let host = Arc::new(InMemoryHost::new());
        let agent = AgentServer::new(host.clone(), AgentConfig::default(), None);
        assert_eq!(agent.watch_count(), 2 + Capability::ALL.len());
        assert_eq!(host.watcher_count(), agent.watch_count());

        assert!(agent.abort().await);
        assert_eq!(host.watcher_count(), 0);
        assert!(!agent.close().await);
        assert!(!agent.ping());
    }

    #[test]
    fn revision_ids_are_unique_and_increasing() {
        let host = Arc::new(InMemoryHost::new());
        let agent = AgentServer::new(host, AgentConfig::default(), None);
        let first = agent.list_unit_revisions(&[]).unwrap();
        let second = agent.list_unit_revisions(&[0]).unwrap();
        assert!(first[0].id >= 1000);
        assert!(second[0].id > first[0].id);
        let capability = &second[0].capabilities[0];
        assert_eq!(capability.resource, second[0].id);
        assert!(capability.id > second[0].id);
    }
}
