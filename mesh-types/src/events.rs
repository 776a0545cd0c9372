//! Status and event-type enumerations shared by registry and agent.

use serde::{Deserialize, Serialize};

/// Health status an agent self-reports in its heartbeat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthReport {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthReport {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// Registry-assigned status of an Agent entity (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Healthy,
    Degraded,
    Expired,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Expired => "expired",
        }
    }
}

/// Registry event log entry type (spec.md §3's Event.event_type).
///
/// Only `Register`, `Update`, `Unhealthy`, `Unregister` ever trigger topology
/// change detection (spec.md §3 invariant) — `Heartbeat` and `Expire` never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Register,
    Heartbeat,
    Update,
    Unregister,
    Unhealthy,
    Expire,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Heartbeat => "heartbeat",
            Self::Update => "update",
            Self::Unregister => "unregister",
            Self::Unhealthy => "unhealthy",
            Self::Expire => "expire",
        }
    }

    /// Whether an event of this type can invalidate a consumer's cached
    /// resolutions (spec.md §3 invariant / §4.2 HEAD processing).
    pub fn is_topology_change(&self) -> bool {
        matches!(self, Self::Register | Self::Update | Self::Unhealthy | Self::Unregister)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_specific_events_are_topology_changes() {
        assert!(EventType::Register.is_topology_change());
        assert!(EventType::Update.is_topology_change());
        assert!(EventType::Unhealthy.is_topology_change());
        assert!(EventType::Unregister.is_topology_change());
        assert!(!EventType::Heartbeat.is_topology_change());
        assert!(!EventType::Expire.is_topology_change());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&EventType::Unhealthy).unwrap(), "\"unhealthy\"");
        assert_eq!(serde_json::to_string(&AgentStatus::Expired).unwrap(), "\"expired\"");
    }
}
