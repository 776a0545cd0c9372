//! Event types pushed from the Rust core to whatever embeds it.
//!
//! Events are sent over an async channel so the embedding process can react
//! to dependency changes without polling the cache directly.

use serde::{Deserialize, Serialize};

/// Type of mesh event. Serializes to snake_case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Agent successfully registered with the mesh registry
    AgentRegistered,
    /// Agent registration failed
    RegistrationFailed,
    /// A dependency became available
    DependencyAvailable,
    /// A dependency became unavailable
    DependencyUnavailable,
    /// A dependency's endpoint or function changed
    DependencyChanged,
    /// Health check is due
    HealthCheckDue,
    /// Agent health status changed
    HealthStatusChanged,
    /// Connected to registry
    RegistryConnected,
    /// Disconnected from registry
    RegistryDisconnected,
    /// Agent runtime is shutting down
    #[default]
    Shutdown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentRegistered => "agent_registered",
            EventType::RegistrationFailed => "registration_failed",
            EventType::DependencyAvailable => "dependency_available",
            EventType::DependencyUnavailable => "dependency_unavailable",
            EventType::DependencyChanged => "dependency_changed",
            EventType::HealthCheckDue => "health_check_due",
            EventType::HealthStatusChanged => "health_status_changed",
            EventType::RegistryConnected => "registry_connected",
            EventType::RegistryDisconnected => "registry_disconnected",
            EventType::Shutdown => "shutdown",
        }
    }
}

/// Health status of an agent, as self-reported in a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}


/// Events emitted by the Rust core to whatever consumes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshEvent {
    pub event_type: EventType,

    /// Capability name (for dependency events)
    pub capability: Option<String>,
    /// Endpoint URL (for dependency_available/changed)
    pub endpoint: Option<String>,
    /// Function name to call (for dependency_available/changed)
    pub function_name: Option<String>,
    /// Agent ID (for dependency events)
    pub agent_id: Option<String>,

    /// Error message (for error events)
    pub error: Option<String>,
    /// Health status (for health events)
    pub status: Option<HealthStatus>,
    /// Reason for event (for disconnect events)
    pub reason: Option<String>,
}

impl MeshEvent {
    pub fn agent_registered(agent_id: String) -> Self {
        Self { event_type: EventType::AgentRegistered, agent_id: Some(agent_id), ..Default::default() }
    }

    pub fn registration_failed(error: String) -> Self {
        Self { event_type: EventType::RegistrationFailed, error: Some(error), ..Default::default() }
    }

    pub fn dependency_available(capability: String, endpoint: String, function_name: String, agent_id: String) -> Self {
        Self {
            event_type: EventType::DependencyAvailable,
            capability: Some(capability),
            endpoint: Some(endpoint),
            function_name: Some(function_name),
            agent_id: Some(agent_id),
            ..Default::default()
        }
    }

    pub fn dependency_unavailable(capability: String) -> Self {
        Self { event_type: EventType::DependencyUnavailable, capability: Some(capability), ..Default::default() }
    }

    pub fn dependency_changed(capability: String, endpoint: String, function_name: String, agent_id: String) -> Self {
        Self {
            event_type: EventType::DependencyChanged,
            capability: Some(capability),
            endpoint: Some(endpoint),
            function_name: Some(function_name),
            agent_id: Some(agent_id),
            ..Default::default()
        }
    }

    pub fn health_check_due() -> Self {
        Self { event_type: EventType::HealthCheckDue, ..Default::default() }
    }

    pub fn health_status_changed(status: HealthStatus) -> Self {
        Self { event_type: EventType::HealthStatusChanged, status: Some(status), ..Default::default() }
    }

    pub fn registry_connected() -> Self {
        Self { event_type: EventType::RegistryConnected, ..Default::default() }
    }

    pub fn registry_disconnected(reason: String) -> Self {
        Self { event_type: EventType::RegistryDisconnected, reason: Some(reason), ..Default::default() }
    }

    pub fn shutdown() -> Self {
        Self { event_type: EventType::Shutdown, ..Default::default() }
    }
}
