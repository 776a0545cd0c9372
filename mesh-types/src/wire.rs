//! Wire schemas for the registry HTTP API (spec.md §4.2).
//!
//! `AgentRequest`/`AgentResponse` are shared verbatim by `POST
//! /agents/register` and `POST /heartbeat` — the two are the same request
//! shape, only the success status code differs (201 vs 200).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::HealthReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyRequest {
    pub capability: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub function_name: String,
    pub capability: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyRequest>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub endpoint: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub runtime: String,
    #[serde(default)]
    pub tools: Vec<ToolRequest>,
}

/// Unified request body for `POST /agents/register` and `POST /heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub metadata: AgentMetadata,
    #[serde(default)]
    pub status: HealthReport,
}

/// The registry's view of a resolved dependency, nested inside a tool's
/// `dependencies_resolved` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolvedDependencyEntry {
    Resolved {
        capability: String,
        tool_info: ToolInfo,
    },
    Unresolved {
        capability: String,
    },
}

impl ResolvedDependencyEntry {
    pub fn capability(&self) -> &str {
        match self {
            Self::Resolved { capability, .. } => capability,
            Self::Unresolved { capability } => capability,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub endpoint: String,
    pub agent_id: String,
}

/// One tool's resolved dependency list, keyed by the declaring function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDependencyResolution {
    pub function_name: String,
    pub capability: String,
    pub dependencies: Vec<ResolvedDependencyEntry>,
}

/// Unified response body for `POST /agents/register` and `POST /heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub agent_id: String,
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub dependencies_resolved: Vec<ToolDependencyResolution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_entry_round_trips() {
        let entry = ResolvedDependencyEntry::Resolved {
            capability: "date_service".into(),
            tool_info: ToolInfo {
                name: "get_date".into(),
                endpoint: "http://localhost:9001".into(),
                agent_id: "date-service-abc123".into(),
            },
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: ResolvedDependencyEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn unresolved_entry_has_no_tool_info_field() {
        let entry = ResolvedDependencyEntry::Unresolved {
            capability: "date_service".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "unresolved");
        assert!(json.get("tool_info").is_none());
    }
}
