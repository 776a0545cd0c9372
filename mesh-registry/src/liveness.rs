//! Background liveness sweep (spec.md §4.3).

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::storage::Storage;

pub struct LivenessConfig {
    pub health_check_interval: Duration,
    pub unhealthy_timeout: chrono::Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            unhealthy_timeout: chrono::Duration::seconds(90),
        }
    }
}

/// Runs until `shutdown` resolves. One task per registry process (§5).
pub async fn run(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: LivenessConfig, shutdown: impl std::future::Future<Output = ()>) {
    let mut interval = tokio::time::interval(config.health_check_interval);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = sweep_once(&storage, clock.as_ref(), config.unhealthy_timeout).await {
                    tracing::error!(error = %err, "liveness sweep failed");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("liveness monitor shutting down");
                break;
            }
        }
    }
}

async fn sweep_once(storage: &Arc<dyn Storage>, clock: &dyn Clock, unhealthy_timeout: chrono::Duration) -> Result<(), crate::storage::StorageError> {
    let now = clock.now();
    let cutoff = now - unhealthy_timeout;
    let stale = storage.stale_agents(cutoff).await?;
    for agent in stale {
        let silence = now - agent.updated_at;
        storage.append_event(&agent.agent_id, "unhealthy", now).await?;
        storage.delete_agent(&agent.agent_id).await?;
        tracing::info!(agent_id = %agent.agent_id, silence_secs = silence.num_seconds(), "evicted unresponsive agent");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{SystemClock, TestClock};
    use crate::model::{Agent, AgentManifest};
    use crate::storage::memory::MemoryStorage;
    use chrono::Utc;

    fn stale_agent(id: &str, updated_at: chrono::DateTime<Utc>) -> Agent {
        Agent {
            agent_id: id.to_string(),
            name: id.to_string(),
            namespace: "default".into(),
            version: "1.0.0".into(),
            endpoint: format!("http://{id}"),
            runtime: "rust".into(),
            status: "healthy".into(),
            created_at: updated_at,
            updated_at,
            last_full_refresh: updated_at,
        }
    }

    #[tokio::test]
    async fn sweep_evicts_stale_agent_and_emits_unhealthy_event() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let clock = TestClock::new(Utc::now());
        let old = clock.now() - chrono::Duration::seconds(200);
        storage
            .register_or_heartbeat(AgentManifest { agent: stale_agent("a1", old), tools: vec![], dependencies: vec![] })
            .await
            .unwrap();

        sweep_once(&storage, &clock, chrono::Duration::seconds(90)).await.unwrap();

        assert!(storage.get_agent("a1").await.unwrap().is_none());
        let events = storage.recent_events(10).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "unhealthy"));
    }

    #[tokio::test]
    async fn sweep_leaves_fresh_agent_alone() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let clock = TestClock::new(Utc::now());
        storage
            .register_or_heartbeat(AgentManifest { agent: stale_agent("a1", clock.now()), tools: vec![], dependencies: vec![] })
            .await
            .unwrap();

        sweep_once(&storage, &clock, chrono::Duration::seconds(90)).await.unwrap();

        assert!(storage.get_agent("a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sweep_uses_clock_not_wall_time() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let clock = TestClock::new(Utc::now());
        storage
            .register_or_heartbeat(AgentManifest { agent: stale_agent("a1", clock.now()), tools: vec![], dependencies: vec![] })
            .await
            .unwrap();

        // Fresh by wall-clock, but the injected clock has jumped forward
        // past the timeout — the sweep must use the clock, not `Utc::now()`.
        clock.advance(chrono::Duration::seconds(200));
        sweep_once(&storage, &clock, chrono::Duration::seconds(90)).await.unwrap();

        assert!(storage.get_agent("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_accepts_a_system_clock() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(run(
            storage,
            Arc::new(SystemClock),
            LivenessConfig { health_check_interval: Duration::from_secs(3600), unhealthy_timeout: chrono::Duration::seconds(90) },
            async { shutdown_rx.await.ok(); },
        ));
        shutdown_tx.send(()).ok();
        handle.await.unwrap();
    }
}
