//! Production storage backend over `sqlx::PgPool` (grounded on the
//! sqlx/postgres feature combination in `adamtc007-ob-poc`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::model::{Agent, AgentManifest, Event, ProviderCandidate, Resolution, Tool};

use super::{AgentFilter, Storage, StorageError, StorageResult};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn tool_changed(a: &Tool, b: &Tool) -> bool {
    a.capability != b.capability || a.tags != b.tags || a.version != b.version || a.description != b.description || a.input_schema != b.input_schema
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn register_or_heartbeat(&self, manifest: AgentManifest) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let agent_id = &manifest.agent.agent_id;

        let existing: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT name, namespace, version, endpoint, runtime FROM agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&mut *tx)
        .await?;
        let is_new = existing.is_none();

        let existing_tools: Vec<Tool> = sqlx::query_as(
            "SELECT agent_id, function_name, capability, tags, version, description, input_schema FROM tools WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_all(&mut *tx)
        .await?;

        let changed = match &existing {
            None => false,
            Some((name, namespace, version, endpoint, runtime)) => {
                name != &manifest.agent.name
                    || namespace != &manifest.agent.namespace
                    || version != &manifest.agent.version
                    || endpoint != &manifest.agent.endpoint
                    || runtime != &manifest.agent.runtime
                    || existing_tools.len() != manifest.tools.len()
                    || manifest.tools.iter().any(|t| {
                        existing_tools
                            .iter()
                            .find(|e| e.function_name == t.function_name)
                            .map(|e| tool_changed(e, t))
                            .unwrap_or(true)
                    })
            }
        };

        sqlx::query(
            "INSERT INTO agents (agent_id, name, namespace, version, endpoint, runtime, status, created_at, updated_at, last_full_refresh)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $8)
             ON CONFLICT (agent_id) DO UPDATE SET
               name = EXCLUDED.name, namespace = EXCLUDED.namespace, version = EXCLUDED.version,
               endpoint = EXCLUDED.endpoint, runtime = EXCLUDED.runtime, status = EXCLUDED.status,
               updated_at = EXCLUDED.updated_at, last_full_refresh = EXCLUDED.last_full_refresh",
        )
        .bind(agent_id)
        .bind(&manifest.agent.name)
        .bind(&manifest.agent.namespace)
        .bind(&manifest.agent.version)
        .bind(&manifest.agent.endpoint)
        .bind(&manifest.agent.runtime)
        .bind(&manifest.agent.status)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM dependencies WHERE agent_id = $1").bind(agent_id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM tools WHERE agent_id = $1").bind(agent_id).execute(&mut *tx).await?;

        for tool in &manifest.tools {
            sqlx::query(
                "INSERT INTO tools (agent_id, function_name, capability, tags, version, description, input_schema)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(agent_id)
            .bind(&tool.function_name)
            .bind(&tool.capability)
            .bind(&tool.tags)
            .bind(&tool.version)
            .bind(&tool.description)
            .bind(&tool.input_schema)
            .execute(&mut *tx)
            .await?;
        }

        for dep in &manifest.dependencies {
            sqlx::query(
                "INSERT INTO dependencies (agent_id, function_name, dep_index, capability, tags, version, namespace)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(agent_id)
            .bind(&dep.function_name)
            .bind(dep.dep_index)
            .bind(&dep.capability)
            .bind(&dep.tags)
            .bind(&dep.version)
            .bind(&dep.namespace)
            .execute(&mut *tx)
            .await?;
        }

        let event_type = if is_new { Some("register") } else if changed { Some("update") } else { None };
        if let Some(event_type) = event_type {
            sqlx::query(
                "INSERT INTO events (timestamp, agent_id, event_type) VALUES ($1, $2, $3)
                 ON CONFLICT (agent_id, event_type, timestamp) DO NOTHING",
            )
            .bind(now)
            .bind(agent_id)
            .bind(event_type)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(is_new)
    }

    async fn get_agent(&self, agent_id: &str) -> StorageResult<Option<Agent>> {
        let agent = sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(agent)
    }

    async fn list_agents(&self, filter: &AgentFilter) -> StorageResult<Vec<Agent>> {
        let mut query = String::from(
            "SELECT DISTINCT a.* FROM agents a LEFT JOIN tools t ON t.agent_id = a.agent_id WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();
        if let Some(ns) = &filter.namespace {
            query.push_str(&format!(" AND a.namespace = ${}", binds.len() + 1));
            binds.push(ns.clone());
        }
        if let Some(cap) = &filter.capability {
            query.push_str(&format!(" AND t.capability = ${}", binds.len() + 1));
            binds.push(cap.clone());
        }
        for tag in &filter.tags {
            query.push_str(&format!(" AND ${} = ANY(t.tags)", binds.len() + 1));
            binds.push(tag.clone());
        }
        query.push_str(" ORDER BY a.agent_id");

        let mut q = sqlx::query_as::<_, Agent>(&query);
        for bind in &binds {
            q = q.bind(bind);
        }
        Ok(q.fetch_all(&self.pool).await?)
    }

    async fn delete_agent(&self, agent_id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE agent_id = $1").bind(agent_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_event(&self, agent_id: &str, event_type: &str, timestamp: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO events (timestamp, agent_id, event_type) VALUES ($1, $2, $3)
             ON CONFLICT (agent_id, event_type, timestamp) DO NOTHING",
        )
        .bind(timestamp)
        .bind(agent_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_topology_change_since(&self, since: DateTime<Utc>) -> StorageResult<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (
               SELECT 1 FROM events
               WHERE timestamp > $1 AND event_type IN ('register', 'update', 'unhealthy', 'unregister')
             )",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn replace_resolutions(&self, agent_id: &str, resolutions: Vec<Resolution>) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM resolutions WHERE agent_id = $1").bind(agent_id).execute(&mut *tx).await?;
        for r in resolutions {
            sqlx::query(
                "INSERT INTO resolutions (agent_id, function_name, dep_index, provider_agent_id, provider_function_name, provider_endpoint, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&r.agent_id)
            .bind(&r.function_name)
            .bind(r.dep_index)
            .bind(&r.provider_agent_id)
            .bind(&r.provider_function_name)
            .bind(&r.provider_endpoint)
            .bind(&r.status)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_resolutions(&self, agent_id: &str) -> StorageResult<Vec<Resolution>> {
        Ok(sqlx::query_as::<_, Resolution>("SELECT * FROM resolutions WHERE agent_id = $1")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn healthy_fleet(&self) -> StorageResult<Vec<ProviderCandidate>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            agent_id: String,
            endpoint: String,
            function_name: String,
            capability: String,
            tags: Vec<String>,
            version: String,
        }
        let rows: Vec<Row> = sqlx::query_as(
            "SELECT a.agent_id, a.endpoint, t.function_name, t.capability, t.tags, t.version
             FROM agents a JOIN tools t ON t.agent_id = a.agent_id
             WHERE a.status = 'healthy'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| ProviderCandidate {
                agent_id: r.agent_id,
                function_name: r.function_name,
                endpoint: r.endpoint,
                capability: r.capability,
                tags: r.tags,
                version: r.version,
            })
            .collect())
    }

    async fn stale_agents(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<Agent>> {
        Ok(sqlx::query_as::<_, Agent>("SELECT * FROM agents WHERE updated_at < $1")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn recent_events(&self, limit: i64) -> StorageResult<Vec<Event>> {
        Ok(sqlx::query_as::<_, Event>("SELECT * FROM events ORDER BY timestamp DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }
}
