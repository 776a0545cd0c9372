//! Collects tool registrations made at startup into one `AgentSpec`.
//!
//! Application code calls `register_tool` once per tool as it starts up
//! (mirroring how the teacher's decorator-registered tools accumulate global
//! state before the first heartbeat); `collect_agent_spec` turns that into
//! the `AgentSpec` the runtime orchestrator needs, resolving agent-level
//! fields through the same env > param > default order as everything else
//! in `config.rs`.

use std::sync::{OnceLock, RwLock};

use crate::config::{resolve_config, resolve_config_int, ConfigKey};
use crate::spec::{AgentSpec, ToolSpec};

static REGISTERED_TOOLS: OnceLock<RwLock<Vec<ToolSpec>>> = OnceLock::new();

fn registered_tools() -> &'static RwLock<Vec<ToolSpec>> {
    REGISTERED_TOOLS.get_or_init(|| RwLock::new(Vec::new()))
}

/// Register a tool discovered at startup. Call once per tool; order is
/// preserved, which matters because a tool's dependency `dep_index` is its
/// position within `ToolSpec::dependencies`, not within this list.
pub fn register_tool(tool: ToolSpec) {
    registered_tools().write().unwrap().push(tool);
}

/// Clear all registered tools. Exists for tests and for processes that
/// re-scan their tool set (e.g. hot-reload in development).
pub fn clear_registered_tools() {
    registered_tools().write().unwrap().clear();
}

fn snapshot_registered_tools() -> Vec<ToolSpec> {
    registered_tools().read().unwrap().clone()
}

/// Agent-level fields not derivable from registered tools, typically
/// supplied by the embedding process's own configuration surface.
#[derive(Debug, Clone, Default)]
pub struct AgentSpecOverrides {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub runtime: Option<String>,
    pub http_port: Option<u16>,
    pub http_host: Option<String>,
    pub namespace: Option<String>,
    pub registry_url: Option<String>,
}

/// Assemble an `AgentSpec` from every tool registered so far plus config
/// resolution for agent-level fields (spec.md §4.7's "environment variable >
/// marker argument > default" order).
pub fn collect_agent_spec(overrides: AgentSpecOverrides) -> AgentSpec {
    let name = resolve_config(ConfigKey::AgentName, overrides.name.as_deref()).unwrap_or_else(|| "mcp-mesh-agent".to_string());
    let registry_url = resolve_config(ConfigKey::RegistryUrl, overrides.registry_url.as_deref()).expect("registry url has a default");
    let http_host = resolve_config(ConfigKey::HttpHost, overrides.http_host.as_deref()).expect("http host resolves via auto-detect");
    let namespace = resolve_config(ConfigKey::Namespace, overrides.namespace.as_deref()).expect("namespace has a default");
    let http_port = overrides.http_port.unwrap_or(0);
    let head_interval_secs = resolve_config_int(ConfigKey::HealthInterval, None).unwrap_or(5).max(1) as u64;

    let mut spec = AgentSpec::new(
        name,
        registry_url,
        overrides.version.unwrap_or_else(|| "1.0.0".to_string()),
        overrides.description.unwrap_or_default(),
        overrides.runtime.unwrap_or_else(|| "rust".to_string()),
        http_port,
        http_host,
        namespace,
    );
    spec.head_interval_secs = head_interval_secs;
    spec.tools = snapshot_registered_tools();
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::DependencySpec;
    use std::sync::Mutex;

    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn collect_agent_spec_includes_registered_tools_in_order() {
        let _lock = TEST_LOCK.lock().unwrap();
        clear_registered_tools();

        register_tool(ToolSpec::new("get_date", "date_service"));
        register_tool(ToolSpec::new("greet", "greeting").with_dependencies(vec![DependencySpec::new("date_service")]));

        let spec = collect_agent_spec(AgentSpecOverrides { name: Some("date-service".to_string()), ..Default::default() });

        assert_eq!(spec.name, "date-service");
        assert_eq!(spec.tools.len(), 2);
        assert_eq!(spec.tools[0].function_name, "get_date");
        assert_eq!(spec.tools[1].function_name, "greet");

        clear_registered_tools();
    }
}
