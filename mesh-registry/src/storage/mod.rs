//! The pluggability seam for registry persistence (spec.md §2 C2).
//!
//! `Storage` is implemented by [`memory::MemoryStorage`] (the embeddable,
//! zero-external-dependency backend; also what the test suite runs against)
//! and [`postgres::PostgresStorage`] (the shipped production backend).

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Agent, AgentManifest, Event, ProviderCandidate, Resolution};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Filters accepted by `GET /agents` (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub capability: Option<String>,
    pub tags: Vec<String>,
    pub namespace: Option<String>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Upsert the agent + replace its tools/dependencies wholesale inside one
    /// transaction, appending a `register` or `update` event as appropriate.
    /// Returns `true` if the agent was newly created.
    async fn register_or_heartbeat(&self, manifest: AgentManifest) -> StorageResult<bool>;

    async fn get_agent(&self, agent_id: &str) -> StorageResult<Option<Agent>>;

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<Agent>>;

    /// Idempotent: returns `true` only if a row actually existed and was removed.
    async fn delete_agent(&self, agent_id: &str) -> StorageResult<bool>;

    async fn append_event(&self, agent_id: &str, event_type: &str, timestamp: DateTime<Utc>) -> StorageResult<()>;

    /// Any qualifying event (`register`/`update`/`unhealthy`/`unregister`) recorded after `since`.
    async fn has_topology_change_since(&self, since: DateTime<Utc>) -> StorageResult<bool>;

    async fn replace_resolutions(&self, agent_id: &str, resolutions: Vec<Resolution>) -> StorageResult<()>;

    async fn get_resolutions(&self, agent_id: &str) -> StorageResult<Vec<Resolution>>;

    /// The `(agent, tool)` pairs healthy enough to be resolution candidates.
    async fn healthy_fleet(&self) -> StorageResult<Vec<ProviderCandidate>>;

    /// Agents whose `updated_at` is older than `cutoff` (liveness monitor, §4.3).
    async fn stale_agents(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Agent>>;

    #[allow(dead_code)]
    async fn recent_events(&self, limit: i64) -> StorageResult<Vec<Event>>;
}
