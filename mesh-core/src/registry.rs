//! Registry client for communicating with the MCP Mesh registry.
//!
//! Handles:
//! - Fast heartbeat checks (HEAD requests)
//! - Full heartbeat/registration (POST requests)
//! - Unregistration on shutdown (DELETE requests)

use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::events::HealthStatus;
use crate::spec::AgentSpec;
use mesh_types::events::HealthReport;
use mesh_types::wire::{AgentMetadata, AgentRequest, AgentResponse, DependencyRequest, ToolRequest};

/// Errors that can occur during registry communication.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Registry returned error: {status} - {message}")]
    RegistryError { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Result of a fast heartbeat check (HEAD request).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastHeartbeatStatus {
    /// 200 OK - No topology changes
    NoChanges,
    /// 202 Accepted - Topology changed, need full heartbeat
    TopologyChanged,
    /// 410 Gone - Agent unknown, need to re-register
    AgentUnknown,
    /// 503 Service Unavailable - Registry error
    RegistryError,
    /// Network/connection error
    NetworkError,
}

impl FastHeartbeatStatus {
    /// Create status from HTTP status code.
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200 => Self::NoChanges,
            202 => Self::TopologyChanged,
            410 => Self::AgentUnknown,
            503 => Self::RegistryError,
            _ => Self::NetworkError,
        }
    }

    /// Check if full heartbeat is required.
    pub fn requires_full_heartbeat(&self) -> bool {
        matches!(self, Self::TopologyChanged | Self::AgentUnknown)
    }

    /// Check if we should skip for resilience (error states).
    pub fn should_skip_for_resilience(&self) -> bool {
        matches!(self, Self::RegistryError | Self::NetworkError)
    }

    /// Check if we can skip (optimization - no changes).
    pub fn should_skip_for_optimization(&self) -> bool {
        matches!(self, Self::NoChanges)
    }
}

fn health_report(status: HealthStatus) -> HealthReport {
    match status {
        HealthStatus::Healthy => HealthReport::Healthy,
        HealthStatus::Degraded => HealthReport::Degraded,
        HealthStatus::Unhealthy => HealthReport::Unhealthy,
    }
}

/// Build the unified register/heartbeat request body from an agent's spec.
pub fn request_from_spec(spec: &AgentSpec, health_status: HealthStatus) -> AgentRequest {
    let tools = spec
        .tools
        .iter()
        .map(|t| ToolRequest {
            function_name: t.function_name.clone(),
            capability: t.capability.clone(),
            dependencies: t
                .dependencies
                .iter()
                .map(|d| DependencyRequest {
                    capability: d.capability.clone(),
                    tags: d.tags.clone(),
                    version: d.version.clone(),
                    namespace: d.namespace.clone(),
                })
                .collect(),
            tags: t.tags.clone(),
            version: t.version.clone(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        })
        .collect();

    AgentRequest {
        agent_id: spec.agent_id.clone(),
        timestamp: chrono::Utc::now(),
        metadata: AgentMetadata {
            name: spec.name.clone(),
            namespace: spec.namespace.clone(),
            endpoint: format!("http://{}:{}", spec.http_host, spec.http_port),
            version: spec.version.clone(),
            runtime: spec.runtime.clone(),
            tools,
        },
        status: health_report(health_status),
    }
}

/// Client for communicating with the MCP Mesh registry.
pub struct RegistryClient {
    client: Client,
    base_url: String,
}

impl RegistryClient {
    /// Create a new registry client.
    pub fn new(registry_url: &str) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        // Normalize URL (remove trailing slash)
        let base_url = registry_url.trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    /// Perform a fast heartbeat check (HEAD request).
    ///
    /// Returns the status indicating whether full heartbeat is needed.
    pub async fn fast_heartbeat_check(&self, agent_id: &str) -> FastHeartbeatStatus {
        let url = format!("{}/heartbeat/{}", self.base_url, agent_id);

        trace!("Sending fast heartbeat HEAD request to {}", url);

        match self.client.head(&url).send().await {
            Ok(response) => {
                let status = FastHeartbeatStatus::from_status_code(response.status().as_u16());
                debug!(
                    "Fast heartbeat for agent '{}': HTTP {} -> {:?}",
                    agent_id,
                    response.status().as_u16(),
                    status
                );
                status
            }
            Err(e) => {
                warn!("Fast heartbeat failed for agent '{}': {}", agent_id, e);
                FastHeartbeatStatus::NetworkError
            }
        }
    }

    /// Send a full heartbeat (POST request).
    ///
    /// Returns the response with resolved dependencies.
    pub async fn send_heartbeat(&self, request: &AgentRequest) -> Result<AgentResponse, RegistryError> {
        let url = format!("{}/heartbeat", self.base_url);

        debug!("Sending full heartbeat for agent '{}'", request.agent_id);
        trace!("Heartbeat request: {:?}", request);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            let parsed: AgentResponse = serde_json::from_str(&body)?;

            info!(
                "Heartbeat successful for agent '{}': {} tools with resolved dependencies",
                request.agent_id,
                parsed.dependencies_resolved.len()
            );

            Ok(parsed)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RegistryError::RegistryError {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    /// Send initial registration (same endpoint as heartbeat, same body shape).
    pub async fn register(&self, spec: &AgentSpec, health_status: HealthStatus) -> Result<AgentResponse, RegistryError> {
        let url = format!("{}/agents/register", self.base_url);
        let request = request_from_spec(spec, health_status);

        debug!("Registering agent '{}'", request.agent_id);

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            let parsed: AgentResponse = serde_json::from_str(&body)?;
            info!("Agent '{}' registered: {}", parsed.agent_id, parsed.message);
            Ok(parsed)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RegistryError::RegistryError {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    /// Unregister an agent from the registry (DELETE request).
    ///
    /// Called during graceful shutdown to immediately remove the agent
    /// from the registry. This triggers topology change events for
    /// dependent agents.
    pub async fn unregister_agent(&self, agent_id: &str) -> Result<(), RegistryError> {
        let url = format!("{}/agents/{}", self.base_url, agent_id);

        info!("Unregistering agent '{}' from registry", agent_id);

        match self.client.delete(&url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || status.as_u16() == 404 {
                    // 200/204 = success, 404 = already gone (both are fine)
                    info!("Agent '{}' unregistered successfully (HTTP {})", agent_id, status.as_u16());
                    Ok(())
                } else {
                    let body = response.text().await.unwrap_or_default();
                    warn!("Failed to unregister agent '{}': HTTP {} - {}", agent_id, status.as_u16(), body);
                    Err(RegistryError::RegistryError {
                        status: status.as_u16(),
                        message: body,
                    })
                }
            }
            Err(e) => {
                warn!("Network error unregistering agent '{}': {}", agent_id, e);
                // Don't fail shutdown due to network error
                Err(RegistryError::Network(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ToolSpec;

    #[test]
    fn test_fast_heartbeat_status_from_code() {
        assert_eq!(FastHeartbeatStatus::from_status_code(200), FastHeartbeatStatus::NoChanges);
        assert_eq!(FastHeartbeatStatus::from_status_code(202), FastHeartbeatStatus::TopologyChanged);
        assert_eq!(FastHeartbeatStatus::from_status_code(410), FastHeartbeatStatus::AgentUnknown);
        assert_eq!(FastHeartbeatStatus::from_status_code(503), FastHeartbeatStatus::RegistryError);
        assert_eq!(FastHeartbeatStatus::from_status_code(500), FastHeartbeatStatus::NetworkError);
    }

    #[test]
    fn test_fast_heartbeat_status_decisions() {
        assert!(FastHeartbeatStatus::NoChanges.should_skip_for_optimization());
        assert!(!FastHeartbeatStatus::NoChanges.requires_full_heartbeat());

        assert!(FastHeartbeatStatus::TopologyChanged.requires_full_heartbeat());
        assert!(!FastHeartbeatStatus::TopologyChanged.should_skip_for_optimization());

        assert!(FastHeartbeatStatus::NetworkError.should_skip_for_resilience());
        assert!(FastHeartbeatStatus::RegistryError.should_skip_for_resilience());
    }

    #[test]
    fn test_request_from_spec() {
        let mut spec = AgentSpec::new("test-agent", "http://localhost:8000", "1.0.0", "", "rust", 9000, "localhost", "default");
        spec.tools = vec![ToolSpec::new("greet", "greeting").with_tags(vec!["utility".to_string()])];

        let request = request_from_spec(&spec, HealthStatus::Healthy);

        assert_eq!(request.agent_id, spec.agent_id);
        assert_eq!(request.metadata.tools.len(), 1);
        assert_eq!(request.metadata.tools[0].function_name, "greet");
        assert_eq!(request.metadata.tools[0].capability, "greeting");
        assert_eq!(request.metadata.endpoint, "http://localhost:9000");
        assert_eq!(request.status, HealthReport::Healthy);
    }
}
