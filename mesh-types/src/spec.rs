//! Declaration-time types: what an agent tells the mesh about itself.
//!
//! These are the types a collector (mesh-core::collector) assembles from
//! scanned tool registrations before the first heartbeat is sent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A requirement declared by a tool for another tool's capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    /// Capability name to depend on.
    pub capability: String,

    /// Tag selectors (bare = required, `+tag` = preferred, `-tag` = excluded).
    #[serde(default)]
    pub tags: Vec<String>,

    /// Version constraint (e.g. ">=1.0.0,<2"). Absent or malformed means "any".
    #[serde(default)]
    pub version: Option<String>,

    /// Namespace to resolve within. Defaults to "default".
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl DependencySpec {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            tags: Vec::new(),
            version: None,
            namespace: default_namespace(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// A tool/capability provided by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Function name in the code, unique within the declaring agent.
    pub function_name: String,

    /// Capability name for discovery.
    pub capability: String,

    /// Version of this capability (semver string).
    #[serde(default = "default_version")]
    pub version: String,

    /// Tags describing this tool, matched against dependants' selectors.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Dependencies required by this tool. Order is significant: position
    /// in this vec is the dependency's `dep_index`.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// JSON Schema for input parameters (MCP format), opaque to the mesh.
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl ToolSpec {
    pub fn new(function_name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            capability: capability.into(),
            version: default_version(),
            tags: Vec::new(),
            description: String::new(),
            dependencies: Vec::new(),
            input_schema: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<DependencySpec>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Complete specification for an MCP Mesh agent, assembled by the collector
/// and handed to the heartbeat orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Globally unique agent identifier: `<name>-<uuid-suffix>`.
    pub agent_id: String,

    /// Human-chosen name (not required to be unique by itself).
    pub name: String,

    /// Agent version (semver string).
    pub version: String,

    /// Human-readable description.
    pub description: String,

    /// Runtime environment tag (e.g. "rust", "python", "node").
    pub runtime: String,

    /// Registry URL (e.g. "http://localhost:8000").
    pub registry_url: String,

    /// HTTP port this agent's embedded server listens on (0 = auto-assign).
    pub http_port: u16,

    /// HTTP host announced to the registry as the delivery endpoint.
    pub http_host: String,

    /// Namespace for isolation.
    pub namespace: String,

    /// Tools/capabilities provided by this agent.
    pub tools: Vec<ToolSpec>,

    /// Interval between HEAD heartbeat ticks, in seconds.
    pub head_interval_secs: u64,

    /// Number of HEAD ticks between forced full POST refreshes.
    pub full_every: u32,
}

impl AgentSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        registry_url: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        runtime: impl Into<String>,
        http_port: u16,
        http_host: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let agent_id = format!("{name}-{}", &Uuid::new_v4().simple().to_string()[..8]);
        Self {
            agent_id,
            name,
            version: version.into(),
            description: description.into(),
            runtime: runtime.into(),
            registry_url: registry_url.into(),
            http_port,
            http_host: http_host.into(),
            namespace: namespace.into(),
            tools: Vec::new(),
            head_interval_secs: 5,
            full_every: 10,
        }
    }

    /// Capability names required across all of this agent's tools, deduplicated.
    pub fn all_dependency_capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self
            .tools
            .iter()
            .flat_map(|t| t.dependencies.iter().map(|d| d.capability.clone()))
            .collect();
        caps.sort();
        caps.dedup();
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_includes_name_and_suffix() {
        let spec = AgentSpec::new(
            "date-service",
            "http://localhost:8000",
            "1.0.0",
            "",
            "rust",
            9000,
            "localhost",
            "default",
        );
        assert!(spec.agent_id.starts_with("date-service-"));
        assert_eq!(spec.agent_id.len(), "date-service-".len() + 8);
    }

    #[test]
    fn all_dependency_capabilities_dedup_and_sort() {
        let mut spec = AgentSpec::new(
            "a", "http://localhost:8000", "1.0.0", "", "rust", 0, "localhost", "default",
        );
        spec.tools = vec![
            ToolSpec::new("f1", "c1").with_dependencies(vec![
                DependencySpec::new("date-service"),
                DependencySpec::new("weather-service"),
            ]),
            ToolSpec::new("f2", "c2")
                .with_dependencies(vec![DependencySpec::new("date-service")]),
        ];
        assert_eq!(
            spec.all_dependency_capabilities(),
            vec!["date-service", "weather-service"]
        );
    }
}
