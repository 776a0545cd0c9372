//! Handle for controlling the runtime and receiving events.
//!
//! The `AgentHandle` is returned when starting an agent and provides an
//! async event stream for topology updates, state queries, and shutdown
//! control.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::events::{HealthStatus, MeshEvent};

/// Internal state shared between handle and runtime.
pub struct HandleState {
    /// Current dependency endpoints, keyed the same way the cache is:
    /// `(function_name, dep_index)`. Two tools that depend on the same
    /// capability through different selectors resolve independently and
    /// must not collapse onto one entry.
    pub dependencies: HashMap<(String, u32), String>,
    pub health_status: HealthStatus,
    pub shutdown_requested: bool,
    /// Agent ID assigned by registry
    pub agent_id: Option<String>,
}

impl Default for HandleState {
    fn default() -> Self {
        Self {
            dependencies: HashMap::new(),
            health_status: HealthStatus::Healthy,
            shutdown_requested: false,
            agent_id: None,
        }
    }
}

/// Handle to a running agent runtime: async event streaming plus state queries.
pub struct AgentHandle {
    event_rx: Arc<Mutex<mpsc::Receiver<MeshEvent>>>,
    state: Arc<RwLock<HandleState>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl AgentHandle {
    pub fn new(event_rx: mpsc::Receiver<MeshEvent>, state: Arc<RwLock<HandleState>>, shutdown_tx: mpsc::Sender<()>) -> Self {
        Self { event_rx: Arc::new(Mutex::new(event_rx)), state, shutdown_tx }
    }

    pub fn state(&self) -> Arc<RwLock<HandleState>> {
        self.state.clone()
    }

    /// Wait for and return the next mesh event. Returns a `Shutdown` event
    /// once the runtime's event channel has closed.
    pub async fn next_event(&self) -> MeshEvent {
        let mut rx = self.event_rx.lock().await;
        rx.recv().await.unwrap_or_else(MeshEvent::shutdown)
    }

    pub async fn get_dependencies(&self) -> HashMap<(String, u32), String> {
        self.state.read().await.dependencies.clone()
    }

    pub async fn get_status(&self) -> HealthStatus {
        self.state.read().await.health_status
    }

    pub async fn get_agent_id(&self) -> Option<String> {
        self.state.read().await.agent_id.clone()
    }

    pub async fn is_shutdown_requested(&self) -> bool {
        self.state.read().await.shutdown_requested
    }

    /// Request graceful shutdown of the agent runtime.
    pub async fn shutdown(&self) {
        self.state.write().await.shutdown_requested = true;
        let _ = self.shutdown_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_state() {
        let (event_tx, event_rx) = mpsc::channel(10);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(HandleState::default()));

        let _handle = AgentHandle::new(event_rx, state.clone(), shutdown_tx);

        {
            let mut s = state.write().await;
            s.agent_id = Some("test-agent".to_string());
            s.dependencies.insert(("get_date".to_string(), 0), "http://localhost:9001".to_string());
        }

        {
            let s = state.read().await;
            assert_eq!(s.agent_id, Some("test-agent".to_string()));
            assert_eq!(s.dependencies.len(), 1);
        }

        event_tx
            .send(MeshEvent::dependency_available(
                "weather".to_string(),
                "http://localhost:9002".to_string(),
                "get_weather".to_string(),
                "weather-agent".to_string(),
            ))
            .await
            .unwrap();

        drop(event_tx);
    }

    #[tokio::test]
    async fn test_handle_shutdown() {
        let (_event_tx, event_rx) = mpsc::channel(10);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(HandleState::default()));

        let handle = AgentHandle::new(event_rx, state.clone(), shutdown_tx);

        handle.shutdown().await;

        assert!(handle.is_shutdown_requested().await);
        assert!(shutdown_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn next_event_returns_shutdown_once_channel_closes() {
        let (event_tx, event_rx) = mpsc::channel(10);
        let (shutdown_tx, _shutdown_rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(HandleState::default()));
        let handle = AgentHandle::new(event_rx, state, shutdown_tx);

        drop(event_tx);
        let event = handle.next_event().await;
        assert_eq!(event.event_type, crate::events::EventType::Shutdown);
    }
}
