//! Embeddable, dependency-free storage backend (grounded on the teacher's
//! `OnceLock<RwLock<_>>` process-wide singleton idiom, seen e.g. in the
//! teacher's `tracing_publish.rs`, generalized here to an instance-owned
//! lock rather than a global).
//!
//! Backs the unconditional test suite and doubles as a lightweight
//! "SQLite-class" deployment mode: same trait, same invariants.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::model::{Agent, AgentManifest, Dependency, Event, ProviderCandidate, Resolution, Tool};

use super::{AgentFilter, Storage, StorageResult};

#[derive(Default)]
struct Inner {
    agents: HashMap<String, Agent>,
    tools: HashMap<String, Vec<Tool>>,
    dependencies: HashMap<String, Vec<Dependency>>,
    resolutions: HashMap<String, Vec<Resolution>>,
    events: Vec<Event>,
    next_event_id: i64,
}

pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }
}

fn manifest_changed(existing_tools: &[Tool], existing_deps: &[Dependency], agent: &Agent, existing_agent: &Agent, tools: &[Tool], deps: &[Dependency]) -> bool {
    existing_agent.name != agent.name
        || existing_agent.namespace != agent.namespace
        || existing_agent.version != agent.version
        || existing_agent.endpoint != agent.endpoint
        || existing_agent.runtime != agent.runtime
        || existing_agent.status != agent.status
        || !tools_equal(existing_tools, tools)
        || !deps_equal(existing_deps, deps)
}

fn tools_equal(a: &[Tool], b: &[Tool]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&Tool> = a.iter().collect();
    let mut b: Vec<&Tool> = b.iter().collect();
    a.sort_by(|x, y| x.function_name.cmp(&y.function_name));
    b.sort_by(|x, y| x.function_name.cmp(&y.function_name));
    a.iter().zip(b.iter()).all(|(x, y)| {
        x.function_name == y.function_name
            && x.capability == y.capability
            && x.tags == y.tags
            && x.version == y.version
            && x.description == y.description
            && x.input_schema == y.input_schema
    })
}

fn deps_equal(a: &[Dependency], b: &[Dependency]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&Dependency> = a.iter().collect();
    let mut b: Vec<&Dependency> = b.iter().collect();
    a.sort_by(|x, y| (x.function_name.as_str(), x.dep_index).cmp(&(y.function_name.as_str(), y.dep_index)));
    b.sort_by(|x, y| (x.function_name.as_str(), x.dep_index).cmp(&(y.function_name.as_str(), y.dep_index)));
    a.iter().zip(b.iter()).all(|(x, y)| {
        x.function_name == y.function_name
            && x.dep_index == y.dep_index
            && x.capability == y.capability
            && x.tags == y.tags
            && x.version == y.version
            && x.namespace == y.namespace
    })
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn register_or_heartbeat(&self, manifest: AgentManifest) -> StorageResult<bool> {
        let mut guard = self.inner.write();
        let agent_id = manifest.agent.agent_id.clone();
        let is_new = !guard.agents.contains_key(&agent_id);

        let event_type = if is_new {
            "register"
        } else {
            let existing_agent = guard.agents.get(&agent_id).unwrap();
            let existing_tools = guard.tools.get(&agent_id).map(Vec::as_slice).unwrap_or(&[]);
            let existing_deps = guard.dependencies.get(&agent_id).map(Vec::as_slice).unwrap_or(&[]);
            if manifest_changed(existing_tools, existing_deps, &manifest.agent, existing_agent, &manifest.tools, &manifest.dependencies) {
                "update"
            } else {
                ""
            }
        };

        guard.agents.insert(agent_id.clone(), manifest.agent);
        guard.tools.insert(agent_id.clone(), manifest.tools);
        guard.dependencies.insert(agent_id.clone(), manifest.dependencies);

        if !event_type.is_empty() {
            append_event_locked(&mut guard, &agent_id, event_type, Utc::now());
        }

        Ok(is_new)
    }

    async fn get_agent(&self, agent_id: &str) -> StorageResult<Option<Agent>> {
        Ok(self.inner.read().agents.get(agent_id).cloned())
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<Agent>> {
        let guard = self.inner.read();
        let mut out = Vec::new();
        for agent in guard.agents.values() {
            if let Some(ns) = &filter.namespace {
                if &agent.namespace != ns {
                    continue;
                }
            }
            let tools = guard.tools.get(&agent.agent_id).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(cap) = &filter.capability {
                if !tools.iter().any(|t| &t.capability == cap) {
                    continue;
                }
            }
            if !filter.tags.is_empty() && !tools.iter().any(|t| filter.tags.iter().all(|tag| t.tags.contains(tag))) {
                continue;
            }
            out.push(agent.clone());
        }
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(out)
    }

    async fn delete_agent(&self, agent_id: &str) -> StorageResult<bool> {
        let mut guard = self.inner.write();
        let existed = guard.agents.remove(agent_id).is_some();
        guard.tools.remove(agent_id);
        guard.dependencies.remove(agent_id);
        guard.resolutions.remove(agent_id);
        Ok(existed)
    }

    async fn append_event(&self, agent_id: &str, event_type: &str, timestamp: DateTime<Utc>) -> StorageResult<()> {
        let mut guard = self.inner.write();
        append_event_locked(&mut guard, agent_id, event_type, timestamp);
        Ok(())
    }

    async fn has_topology_change_since(&self, since: DateTime<Utc>) -> StorageResult<bool> {
        let guard = self.inner.read();
        Ok(guard.events.iter().any(|e| {
            e.timestamp > since
                && matches!(e.event_type.as_str(), "register" | "update" | "unhealthy" | "unregister")
        }))
    }

    async fn replace_resolutions(&self, agent_id: &str, resolutions: Vec<Resolution>) -> StorageResult<()> {
        self.inner.write().resolutions.insert(agent_id.to_string(), resolutions);
        Ok(())
    }

    async fn get_resolutions(&self, agent_id: &str) -> StorageResult<Vec<Resolution>> {
        Ok(self.inner.read().resolutions.get(agent_id).cloned().unwrap_or_default())
    }

    async fn healthy_fleet(&self) -> StorageResult<Vec<ProviderCandidate>> {
        let guard = self.inner.read();
        let mut out = Vec::new();
        for agent in guard.agents.values().filter(|a| a.is_healthy()) {
            if let Some(tools) = guard.tools.get(&agent.agent_id) {
                out.extend(tools.iter().map(|t| ProviderCandidate::from_agent_and_tool(agent, t)));
            }
        }
        Ok(out)
    }

    async fn stale_agents(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Agent>> {
        Ok(self.inner.read().agents.values().filter(|a| a.updated_at < cutoff).cloned().collect())
    }

    async fn recent_events(&self, limit: i64) -> StorageResult<Vec<Event>> {
        let guard = self.inner.read();
        let mut events = guard.events.clone();
        events.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }
}

fn append_event_locked(inner: &mut Inner, agent_id: &str, event_type: &str, timestamp: DateTime<Utc>) {
    // Mirror the `(agent_id, event_type, timestamp)` unique constraint: a
    // duplicate emission from a concurrent monitor is silently absorbed.
    let duplicate = inner
        .events
        .iter()
        .any(|e| e.agent_id == agent_id && e.event_type == event_type && e.timestamp == timestamp);
    if duplicate {
        return;
    }
    inner.next_event_id += 1;
    inner.events.push(Event {
        id: inner.next_event_id,
        timestamp,
        agent_id: agent_id.to_string(),
        event_type: event_type.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Agent;

    fn agent(id: &str) -> Agent {
        let now = Utc::now();
        Agent {
            agent_id: id.to_string(),
            name: id.to_string(),
            namespace: "default".into(),
            version: "1.0.0".into(),
            endpoint: format!("http://{id}"),
            runtime: "rust".into(),
            status: "healthy".into(),
            created_at: now,
            updated_at: now,
            last_full_refresh: now,
        }
    }

    #[tokio::test]
    async fn register_is_idempotent_for_identical_payload() {
        let storage = MemoryStorage::new();
        let manifest = AgentManifest { agent: agent("a1"), tools: vec![], dependencies: vec![] };
        let first_is_new = storage.register_or_heartbeat(manifest.clone()).await.unwrap();
        assert!(first_is_new);
        let second_is_new = storage.register_or_heartbeat(manifest).await.unwrap();
        assert!(!second_is_new);
        let events = storage.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 1, "identical resubmission must not append a second event");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = MemoryStorage::new();
        storage.register_or_heartbeat(AgentManifest { agent: agent("a1"), tools: vec![], dependencies: vec![] }).await.unwrap();
        assert!(storage.delete_agent("a1").await.unwrap());
        assert!(!storage.delete_agent("a1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_event_append_absorbed() {
        let storage = MemoryStorage::new();
        let ts = Utc::now();
        storage.append_event("a1", "unhealthy", ts).await.unwrap();
        storage.append_event("a1", "unhealthy", ts).await.unwrap();
        assert_eq!(storage.recent_events(10).await.unwrap().len(), 1);
    }
}
