//! Registry-internal entities (spec.md §3).
//!
//! These are the persisted shapes; they are richer than the wire types in
//! `mesh_types::wire` (which are shaped for the HTTP contract) because they
//! carry registry-assigned bookkeeping (timestamps, status) the wire schema
//! doesn't need on the way in.

use chrono::{DateTime, Utc};
use mesh_types::AgentStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub endpoint: String,
    pub runtime: String,
    pub status: String, // AgentStatus::as_str() value; sqlx maps TEXT directly
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_full_refresh: DateTime<Utc>,
}

impl Agent {
    pub fn status(&self) -> AgentStatus {
        match self.status.as_str() {
            "degraded" => AgentStatus::Degraded,
            "expired" => AgentStatus::Expired,
            _ => AgentStatus::Healthy,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == AgentStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tool {
    pub agent_id: String,
    pub function_name: String,
    pub capability: String,
    pub tags: Vec<String>,
    pub version: String,
    pub description: String,
    pub input_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dependency {
    pub agent_id: String,
    pub function_name: String,
    pub dep_index: i32,
    pub capability: String,
    pub tags: Vec<String>,
    pub version: Option<String>,
    pub namespace: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Resolved,
    Unresolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Resolution {
    pub agent_id: String,
    pub function_name: String,
    pub dep_index: i32,
    pub provider_agent_id: Option<String>,
    pub provider_function_name: Option<String>,
    pub provider_endpoint: Option<String>,
    pub status: String,
}

impl Resolution {
    pub fn unresolved(agent_id: String, function_name: String, dep_index: i32) -> Self {
        Self {
            agent_id,
            function_name,
            dep_index,
            provider_agent_id: None,
            provider_function_name: None,
            provider_endpoint: None,
            status: ResolutionStatus::Unresolved.as_str().to_string(),
        }
    }

    pub fn resolved(
        agent_id: String,
        function_name: String,
        dep_index: i32,
        provider_agent_id: String,
        provider_function_name: String,
        provider_endpoint: String,
    ) -> Self {
        Self {
            agent_id,
            function_name,
            dep_index,
            provider_agent_id: Some(provider_agent_id),
            provider_function_name: Some(provider_function_name),
            provider_endpoint: Some(provider_endpoint),
            status: ResolutionStatus::Resolved.as_str().to_string(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ResolutionStatus::Resolved.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub event_type: String, // mesh_types::EventType::as_str() value
}

/// A complete agent + its tools + their dependencies, as assembled from a
/// heartbeat/register request, ready for a transactional replace.
#[derive(Debug, Clone)]
pub struct AgentManifest {
    pub agent: Agent,
    pub tools: Vec<Tool>,
    pub dependencies: Vec<Dependency>,
}

/// A healthy provider candidate as seen by the resolver: one (agent, tool) pair.
#[derive(Debug, Clone)]
pub struct ProviderCandidate {
    pub agent_id: String,
    pub function_name: String,
    pub endpoint: String,
    pub capability: String,
    pub tags: Vec<String>,
    pub version: String,
}

impl ProviderCandidate {
    pub fn from_agent_and_tool(agent: &Agent, tool: &Tool) -> Self {
        Self {
            agent_id: agent.agent_id.clone(),
            function_name: tool.function_name.clone(),
            endpoint: agent.endpoint.clone(),
            capability: tool.capability.clone(),
            tags: tool.tags.clone(),
            version: tool.version.clone(),
        }
    }
}
