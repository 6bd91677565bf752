//! Method table for `POST /v1/rpc`.

use base64::Engine;
use mgmt_agent_error::AgentError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::types::*;
use crate::agent::AgentServer;

fn params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, AgentError> {
    let params = match params {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(params)
        .map_err(|err| AgentError::invalid_request(format!("invalid params for {method}: {err}")))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, AgentError> {
    serde_json::to_value(value).map_err(|err| AgentError::HostFailure {
        message: format!("failed to encode result: {err}"),
    })
}

fn decode_image(image: &str) -> Result<Vec<u8>, AgentError> {
    base64::engine::general_purpose::STANDARD
        .decode(image.trim())
        .map_err(|err| AgentError::invalid_request(format!("unit image is not valid base64: {err}")))
}

pub(super) async fn dispatch(agent: &AgentServer, method: &str, raw: Value) -> Result<Value, AgentError> {
    tracing::debug!(method = %method, "rpc call");
    match method {
        // Units
        "install" => {
            let p: InstallParams = params(method, raw)?;
            let image = decode_image(&p.image)?;
            to_value(agent.install(p.location.as_deref(), &image, p.start_level).await?)
        }
        "installFromURL" => {
            let p: InstallFromUrlParams = params(method, raw)?;
            to_value(agent.install_from_url(&p.location, &p.url).await?)
        }
        "installBatch" => {
            let p: InstallBatchParams = params(method, raw)?;
            let entries: Vec<_> = p.images.iter().map(|image| decode_image(image)).collect();
            to_value(agent.install_batch_entries(&entries, p.start_level).await)
        }
        "start" => {
            let p: UnitIdsParams = params(method, raw)?;
            to_value(agent.start(&p.ids))
        }
        "stop" => {
            let p: UnitIdsParams = params(method, raw)?;
            to_value(agent.stop(&p.ids))
        }
        "uninstall" => {
            let p: UnitIdsParams = params(method, raw)?;
            to_value(agent.uninstall(&p.ids).await)
        }
        "listUnits" => to_value(agent.list_units()),
        "listUnitRevisions" => {
            let p: UnitIdsParams = params(method, raw)?;
            to_value(agent.list_unit_revisions(&p.ids)?)
        }
        "refresh" => {
            let p: RefreshParams = params(method, raw)?;
            agent.refresh(p.asynchronous).await;
            Ok(Value::Null)
        }

        // Introspection
        "listComponents" => to_value(agent.list_components()),
        "listConfigurations" => to_value(agent.list_configurations()),
        "listProperties" => to_value(agent.list_properties()),
        "listServices" => to_value(agent.list_services()),
        "listThreads" => to_value(agent.list_threads()),
        "listRoles" => to_value(agent.list_roles()),
        "listHealthChecks" => to_value(agent.list_health_checks()),
        "executeHealthChecks" => {
            let p: HealthCheckParams = params(method, raw)?;
            to_value(agent.execute_health_checks(&p.tags, &p.names))
        }
        "listHttpComponents" => to_value(agent.list_http_components()),
        "listLoggerContexts" => to_value(agent.list_logger_contexts()),
        "listShellCommands" => to_value(agent.list_shell_commands()),

        // Mutation
        "enableComponent" => {
            let p: ComponentParams = params(method, raw)?;
            to_value(agent.enable_component(&p.component)?)
        }
        "disableComponent" => {
            let p: ComponentParams = params(method, raw)?;
            to_value(agent.disable_component(&p.component)?)
        }
        "createOrUpdateConfiguration" => {
            let p: ConfigurationParams = params(method, raw)?;
            to_value(agent.create_or_update_configuration(&p.pid, &p.properties)?)
        }
        "createOrUpdateConfigurationsBatch" => {
            let p: ConfigurationsBatchParams = params(method, raw)?;
            to_value(agent.create_or_update_configurations(&p.configurations))
        }
        "deleteConfiguration" => {
            let p: PidParams = params(method, raw)?;
            to_value(agent.delete_configuration(&p.pid)?)
        }
        "createFactoryConfiguration" => {
            let p: FactoryConfigurationParams = params(method, raw)?;
            to_value(agent.create_factory_configuration(&p.factory_pid, &p.properties)?)
        }
        "createRole" => {
            let p: CreateRoleParams = params(method, raw)?;
            to_value(agent.create_role(&p.name, p.role_type)?)
        }
        "updateRole" => {
            let p: UpdateRoleParams = params(method, raw)?;
            to_value(agent.update_role(&p.role)?)
        }
        "removeRole" => {
            let p: NameParams = params(method, raw)?;
            to_value(agent.remove_role(&p.name)?)
        }
        "updateLoggerContext" => {
            let p: LoggerContextParams = params(method, raw)?;
            to_value(agent.update_logger_context(&p.name, &p.levels)?)
        }
        "readDeviceTreeNode" => {
            let p: DeviceNodeParams = params(method, raw)?;
            to_value(agent.read_device_tree_node(&p.uri)?)
        }
        "updateDeviceTreeNode" => {
            let p: DeviceUpdateParams = params(method, raw)?;
            to_value(agent.update_device_tree_node(&p.uri, &p.value, p.value_type)?)
        }
        "sendEvent" => {
            let p: EventParams = params(method, raw)?;
            to_value(agent.send_event(&p.topic, &p.properties)?)
        }
        "postEvent" => {
            let p: EventParams = params(method, raw)?;
            to_value(agent.post_event(&p.topic, &p.properties)?)
        }

        // Diagnostics
        "getMemoryInfo" => to_value(agent.memory_info()),
        "gc" => {
            agent.gc();
            Ok(Value::Null)
        }
        "getHeapUsage" => to_value(agent.heap_usage()),
        "heapDump" => to_value(agent.heap_dump()?),
        "getClassloaderLeaks" => to_value(agent.classloader_leaks()),

        // Session
        "redirect" => {
            let p: RedirectParams = params(method, raw)?;
            to_value(agent.redirect(p.port).await?)
        }
        "stdin" => {
            let p: TextParams = params(method, raw)?;
            to_value(agent.stdin(&p.text).await?)
        }
        "execShellCommand" => {
            let p: TextParams = params(method, raw)?;
            to_value(agent.exec_shell_command(&p.text).await?)
        }
        "execSystemCommand" => {
            let p: TextParams = params(method, raw)?;
            to_value(agent.exec_system_command(&p.text).await?)
        }

        // Extensions
        "executeExtension" => {
            let p: ExtensionParams = params(method, raw)?;
            to_value(agent.execute_extension(&p.name, &p.context)?)
        }

        // Liveness
        "ping" => Ok(json!(agent.ping())),
        "abort" => to_value(agent.abort().await),

        other => Err(AgentError::MethodNotFound {
            method: other.to_string(),
        }),
    }
}
