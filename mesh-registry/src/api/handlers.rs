use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use mesh_types::{
    AgentMetadata, AgentRequest, AgentResponse, HealthReport, ResolvedDependencyEntry, ToolDependencyResolution,
    ToolInfo, ToolRequest,
};

use crate::model::{Agent, AgentManifest, Dependency, Resolution, Tool};
use crate::resolver::resolve;
use crate::storage::AgentFilter;

use super::error::RegistryApiError;
use super::state::AppState;

fn health_to_status(status: HealthReport) -> &'static str {
    match status {
        HealthReport::Healthy => "healthy",
        HealthReport::Degraded | HealthReport::Unhealthy => "degraded",
    }
}

fn tool_request_to_model(agent_id: &str, req: &ToolRequest) -> Tool {
    Tool {
        agent_id: agent_id.to_string(),
        function_name: req.function_name.clone(),
        capability: req.capability.clone(),
        tags: req.tags.clone(),
        version: req.version.clone(),
        description: req.description.clone(),
        input_schema: req.input_schema.clone(),
    }
}

fn dependencies_for_tool(agent_id: &str, req: &ToolRequest) -> Vec<Dependency> {
    req.dependencies
        .iter()
        .enumerate()
        .map(|(dep_index, dep)| Dependency {
            agent_id: agent_id.to_string(),
            function_name: req.function_name.clone(),
            dep_index: dep_index as i32,
            capability: dep.capability.clone(),
            tags: dep.tags.clone(),
            version: dep.version.clone(),
            namespace: dep.namespace.clone(),
        })
        .collect()
}

fn manifest_from_request(req: &AgentRequest, now: chrono::DateTime<Utc>) -> AgentManifest {
    let AgentMetadata { name, namespace, endpoint, version, runtime, tools } = req.metadata.clone();
    let agent = Agent {
        agent_id: req.agent_id.clone(),
        name,
        namespace,
        version,
        endpoint,
        runtime,
        status: health_to_status(req.status).to_string(),
        created_at: now,
        updated_at: now,
        last_full_refresh: now,
    };
    let model_tools: Vec<Tool> = tools.iter().map(|t| tool_request_to_model(&agent.agent_id, t)).collect();
    let dependencies: Vec<Dependency> = tools.iter().flat_map(|t| dependencies_for_tool(&agent.agent_id, t)).collect();
    AgentManifest { agent, tools: model_tools, dependencies }
}

fn to_wire_resolution(function_name: &str, capability: &str, deps: Vec<Dependency>, resolutions: &[Resolution]) -> ToolDependencyResolution {
    let entries = deps
        .iter()
        .map(|dep| {
            let resolution = resolutions
                .iter()
                .find(|r| r.function_name == dep.function_name && r.dep_index == dep.dep_index);
            match resolution {
                Some(r) if r.is_resolved() => ResolvedDependencyEntry::Resolved {
                    capability: dep.capability.clone(),
                    tool_info: ToolInfo {
                        name: r.provider_function_name.clone().unwrap_or_default(),
                        endpoint: r.provider_endpoint.clone().unwrap_or_default(),
                        agent_id: r.provider_agent_id.clone().unwrap_or_default(),
                    },
                },
                _ => ResolvedDependencyEntry::Unresolved { capability: dep.capability.clone() },
            }
        })
        .collect();
    ToolDependencyResolution {
        function_name: function_name.to_string(),
        capability: capability.to_string(),
        dependencies: entries,
    }
}

/// Shared handler for `POST /agents/register` and `POST /heartbeat` (spec.md §4.2).
pub async fn handle_agent_request(
    State(state): State<AppState>,
    Json(req): Json<AgentRequest>,
) -> Result<(StatusCode, Json<AgentResponse>), RegistryApiError> {
    if req.agent_id.trim().is_empty() {
        return Err(RegistryApiError::BadRequest("agent_id must not be empty".into()));
    }
    if req.metadata.endpoint.trim().is_empty() {
        return Err(RegistryApiError::BadRequest("metadata.endpoint must not be empty".into()));
    }

    let now = Utc::now();
    let manifest = manifest_from_request(&req, now);
    let tools = manifest.tools.clone();
    let dependencies = manifest.dependencies.clone();
    let agent_id = manifest.agent.agent_id.clone();

    let is_new = state.storage.register_or_heartbeat(manifest).await?;

    // Resolve every dependency of every tool this agent just declared against
    // the current healthy fleet (spec.md §4.2 step 3).
    let fleet = state.storage.healthy_fleet().await?;
    let mut resolutions = Vec::with_capacity(dependencies.len());
    for dep in &dependencies {
        let candidates: Vec<_> = fleet.iter().filter(|c| c.agent_id != agent_id).cloned().collect();
        match resolve(dep, &candidates) {
            Some(binding) => resolutions.push(Resolution::resolved(
                agent_id.clone(),
                dep.function_name.clone(),
                dep.dep_index,
                binding.agent_id,
                binding.function_name,
                binding.endpoint,
            )),
            None => resolutions.push(Resolution::unresolved(agent_id.clone(), dep.function_name.clone(), dep.dep_index)),
        }
    }
    state.storage.replace_resolutions(&agent_id, resolutions.clone()).await?;

    let dependencies_resolved: Vec<ToolDependencyResolution> = tools
        .iter()
        .map(|tool| {
            let tool_deps: Vec<Dependency> = dependencies.iter().filter(|d| d.function_name == tool.function_name).cloned().collect();
            to_wire_resolution(&tool.function_name, &tool.capability, tool_deps, &resolutions)
        })
        .collect();

    let response = AgentResponse {
        agent_id: agent_id.clone(),
        status: "ok".to_string(),
        message: if is_new { "registered".to_string() } else { "heartbeat accepted".to_string() },
        timestamp: now,
        dependencies_resolved,
    };

    let status_code = if is_new { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status_code, Json(response)))
}

/// `HEAD /heartbeat/{agent_id}` (spec.md §4.2).
pub async fn handle_heartbeat_head(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, RegistryApiError> {
    let agent = state.storage.get_agent(&agent_id).await?;
    let Some(agent) = agent else {
        return Ok(StatusCode::GONE);
    };
    let changed = state.storage.has_topology_change_since(agent.last_full_refresh).await?;
    Ok(if changed { StatusCode::ACCEPTED } else { StatusCode::OK })
}

/// `DELETE /agents/{agent_id}` — idempotent (spec.md §4.2, §8).
pub async fn handle_delete_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<StatusCode, RegistryApiError> {
    let existed = state.storage.delete_agent(&agent_id).await?;
    if existed {
        state.storage.append_event(&agent_id, "unregister", Utc::now()).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, serde::Deserialize)]
pub struct ListAgentsQuery {
    pub capability: Option<String>,
    #[serde(default)]
    pub tag: Vec<String>,
    pub namespace: Option<String>,
}

/// `GET /agents?capability=&tag=&namespace=` (spec.md §4.2).
pub async fn handle_list_agents(
    State(state): State<AppState>,
    Query(query): Query<ListAgentsQuery>,
) -> Result<impl IntoResponse, RegistryApiError> {
    let filter = AgentFilter { capability: query.capability, tags: query.tag, namespace: query.namespace };
    let agents = state.storage.list_agents(&filter).await?;
    Ok(Json(agents))
}
