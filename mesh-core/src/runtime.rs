//! Agent runtime - the main background task that manages heartbeats and topology.
//!
//! The runtime:
//! - Runs in a background tokio task
//! - Manages the heartbeat state machine
//! - Pushes events to the embedding process via channels
//! - Tracks topology changes, hot-swaps injected proxies, and emits
//!   dependency events

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::sleep;
use tracing::{info, trace, warn};

use crate::cache::{DependencyCache, DependencyChange};
use crate::events::MeshEvent;
use crate::handle::HandleState;
use crate::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatStateMachine};
use crate::proxy::ProxyConfig;
use crate::registry::{request_from_spec, RegistryClient};
use crate::spec::AgentSpec;
use mesh_types::wire::{AgentResponse, ToolDependencyResolution};

/// Configuration for the agent runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Heartbeat configuration
    pub heartbeat: HeartbeatConfig,
    /// Event channel buffer size
    pub event_buffer_size: usize,
    /// Behavior knobs for proxies created against newly-resolved dependencies
    pub proxy: ProxyConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            event_buffer_size: 100,
            proxy: ProxyConfig::default(),
        }
    }
}

/// The agent runtime that runs in the background.
pub struct AgentRuntime {
    spec: AgentSpec,
    #[allow(dead_code)]
    config: RuntimeConfig,
    registry_client: RegistryClient,
    state_machine: HeartbeatStateMachine,
    cache: DependencyCache,
    event_tx: mpsc::Sender<MeshEvent>,
    shared_state: Arc<RwLock<HandleState>>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl AgentRuntime {
    /// Create a new agent runtime.
    pub fn new(
        spec: AgentSpec,
        config: RuntimeConfig,
        event_tx: mpsc::Sender<MeshEvent>,
        shared_state: Arc<RwLock<HandleState>>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<Self, crate::registry::RegistryError> {
        let registry_client = RegistryClient::new(&spec.registry_url)?;
        let heartbeat_config = HeartbeatConfig {
            interval: Duration::from_secs(spec.head_interval_secs),
            full_every: spec.full_every,
            ..config.heartbeat.clone()
        };
        let state_machine = HeartbeatStateMachine::new(heartbeat_config);

        Ok(Self {
            spec,
            config,
            registry_client,
            state_machine,
            cache: DependencyCache::new(),
            event_tx,
            shared_state,
            shutdown_rx,
        })
    }

    /// Run the agent runtime loop.
    ///
    /// This is the main entry point that runs until shutdown is requested.
    pub async fn run(mut self) {
        info!("Starting agent runtime for '{}'", self.spec.name);

        loop {
            // Check for shutdown signal (non-blocking)
            if self.shutdown_rx.try_recv().is_ok() {
                info!("Shutdown signal received");
                self.state_machine.shutdown();
            }

            if self.state_machine.is_shutting_down() {
                // Gracefully unregister from registry before stopping
                self.unregister_from_registry().await;
                break;
            }

            // Determine next action
            let action = self.state_machine.next_action();
            trace!("Next action: {:?}", action);

            match action {
                HeartbeatAction::SendFull => {
                    self.send_full_heartbeat().await;
                }
                HeartbeatAction::SendFast => {
                    self.send_fast_heartbeat().await;
                }
                HeartbeatAction::Wait(duration) => {
                    trace!("Waiting {:?} until next heartbeat", duration);
                    tokio::select! {
                        _ = sleep(duration) => {}
                        _ = self.shutdown_rx.recv() => {
                            info!("Shutdown signal received during wait");
                            self.state_machine.shutdown();
                        }
                    }
                }
                HeartbeatAction::Retry { attempt, backoff } => {
                    warn!("Retry attempt {} with backoff {:?}", attempt, backoff);
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = self.shutdown_rx.recv() => {
                            info!("Shutdown signal received during backoff");
                            self.state_machine.shutdown();
                        }
                    }
                    // After backoff, try full registration
                    self.send_full_heartbeat().await;
                }
                HeartbeatAction::None => {
                    break;
                }
            }
        }

        // Send shutdown event
        let _ = self.event_tx.send(MeshEvent::shutdown()).await;
        info!("Agent runtime for '{}' stopped", self.spec.name);
    }

    /// Unregister the agent from the registry during shutdown.
    ///
    /// This ensures immediate topology update for dependent agents
    /// instead of waiting for the heartbeat timeout.
    async fn unregister_from_registry(&self) {
        let agent_id = &self.spec.agent_id;
        info!("Unregistering agent '{}' from registry", agent_id);

        match self.registry_client.unregister_agent(agent_id).await {
            Ok(()) => {
                info!("Agent '{}' unregistered successfully", agent_id);
            }
            Err(e) => {
                // Log but don't fail shutdown - network issues shouldn't block shutdown
                warn!("Failed to unregister agent '{}' (continuing shutdown): {}", agent_id, e);
            }
        }
    }

    /// Send a fast heartbeat check (HEAD request).
    async fn send_fast_heartbeat(&mut self) {
        let status = self.registry_client.fast_heartbeat_check(&self.spec.agent_id).await;

        let action = self.state_machine.on_fast_heartbeat_result(status);

        // If we need a full heartbeat, do it now
        if action == HeartbeatAction::SendFull {
            self.send_full_heartbeat().await;
        }
    }

    /// Send a full heartbeat (POST request).
    async fn send_full_heartbeat(&mut self) {
        let request = request_from_spec(&self.spec, self.state_machine.health_status());

        match self.registry_client.send_heartbeat(&request).await {
            Ok(response) => {
                self.state_machine.on_full_heartbeat_success();

                // Update shared state with agent ID
                {
                    let mut state = self.shared_state.write().await;
                    state.agent_id = Some(response.agent_id.clone());
                }

                // Process topology changes
                self.process_heartbeat_response(response).await;

                // Send registration event if this was first successful registration
                if self.state_machine.heartbeat_count() == 1 {
                    let _ = self.event_tx.send(MeshEvent::agent_registered(self.spec.agent_id.clone())).await;
                }
            }
            Err(e) => {
                self.state_machine.on_full_heartbeat_failure(&e.to_string());

                // Send error event
                let _ = self.event_tx.send(MeshEvent::registration_failed(e.to_string())).await;
            }
        }
    }

    /// Process a heartbeat response and emit topology change events.
    async fn process_heartbeat_response(&mut self, response: AgentResponse) {
        self.process_dependency_changes(&response.dependencies_resolved).await;
    }

    /// Diff resolved dependencies against the cache, driving the injector
    /// hot-swap, then publish the resulting transitions as `MeshEvent`s and
    /// into `HandleState` for the embedding process to read.
    async fn process_dependency_changes(&mut self, resolved: &[ToolDependencyResolution]) {
        let changes = self.cache.apply(resolved, self.config.proxy.clone());
        if changes.is_empty() {
            return;
        }

        {
            let mut state = self.shared_state.write().await;
            for change in &changes {
                match change {
                    DependencyChange::Available { function_name, dep_index, tool_info, .. }
                    | DependencyChange::Changed { function_name, dep_index, tool_info, .. } => {
                        state.dependencies.insert((function_name.clone(), *dep_index), tool_info.endpoint.clone());
                    }
                    DependencyChange::Unavailable { function_name, dep_index, .. } => {
                        state.dependencies.remove(&(function_name.clone(), *dep_index));
                    }
                }
            }
        }

        for change in changes {
            let event = match change {
                DependencyChange::Available { capability, tool_info, function_name, .. } => {
                    info!("Dependency '{}' available at {} ({}) for '{}'", capability, tool_info.endpoint, tool_info.name, function_name);
                    MeshEvent::dependency_available(capability, tool_info.endpoint, tool_info.name, tool_info.agent_id)
                }
                DependencyChange::Changed { capability, tool_info, function_name, .. } => {
                    info!("Dependency '{}' changed to {} ({}) for '{}'", capability, tool_info.endpoint, tool_info.name, function_name);
                    MeshEvent::dependency_changed(capability, tool_info.endpoint, tool_info.name, tool_info.agent_id)
                }
                DependencyChange::Unavailable { capability, function_name, .. } => {
                    info!("Dependency for '{}' dep in '{}' removed", capability, function_name);
                    MeshEvent::dependency_unavailable(capability)
                }
            };
            let _ = self.event_tx.send(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::wire::{ResolvedDependencyEntry, ToolInfo};

    #[tokio::test]
    async fn test_runtime_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.event_buffer_size, 100);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(5));
    }

    fn tool_info(name: &str, endpoint: &str, agent_id: &str) -> ToolInfo {
        ToolInfo { name: name.to_string(), endpoint: endpoint.to_string(), agent_id: agent_id.to_string() }
    }

    #[tokio::test]
    async fn process_dependency_changes_emits_available_then_changed_then_unavailable() {
        let spec = AgentSpec::new("consumer", "http://localhost:8000", "1.0.0", "", "rust", 0, "localhost", "default");
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let shared_state = Arc::new(RwLock::new(HandleState::default()));
        let mut runtime = AgentRuntime::new(spec, RuntimeConfig::default(), event_tx, shared_state.clone(), shutdown_rx).unwrap();

        let resolution = vec![ToolDependencyResolution {
            function_name: "do_thing".to_string(),
            capability: "do_thing".to_string(),
            dependencies: vec![ResolvedDependencyEntry::Resolved {
                capability: "date_service".to_string(),
                tool_info: tool_info("get_date", "http://localhost:9001", "date-abc"),
            }],
        }];
        runtime.process_dependency_changes(&resolution).await;
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event_type, crate::events::EventType::DependencyAvailable);
        assert_eq!(
            shared_state.read().await.dependencies.get(&("do_thing".to_string(), 0)).unwrap(),
            "http://localhost:9001"
        );

        let changed = vec![ToolDependencyResolution {
            function_name: "do_thing".to_string(),
            capability: "do_thing".to_string(),
            dependencies: vec![ResolvedDependencyEntry::Resolved {
                capability: "date_service".to_string(),
                tool_info: tool_info("get_date", "http://localhost:9002", "date-def"),
            }],
        }];
        runtime.process_dependency_changes(&changed).await;
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event_type, crate::events::EventType::DependencyChanged);

        let gone: Vec<ToolDependencyResolution> = vec![ToolDependencyResolution {
            function_name: "do_thing".to_string(),
            capability: "do_thing".to_string(),
            dependencies: vec![ResolvedDependencyEntry::Unresolved { capability: "date_service".to_string() }],
        }];
        runtime.process_dependency_changes(&gone).await;
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.event_type, crate::events::EventType::DependencyUnavailable);
        assert!(!shared_state.read().await.dependencies.contains_key(&("do_thing".to_string(), 0)));
    }

    #[tokio::test]
    async fn two_tools_sharing_a_capability_keep_independent_bindings() {
        let spec = AgentSpec::new("consumer", "http://localhost:8000", "1.0.0", "", "rust", 0, "localhost", "default");
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let shared_state = Arc::new(RwLock::new(HandleState::default()));
        let mut runtime = AgentRuntime::new(spec, RuntimeConfig::default(), event_tx, shared_state.clone(), shutdown_rx).unwrap();

        let resolution = vec![
            ToolDependencyResolution {
                function_name: "tool_a".to_string(),
                capability: "tool_a".to_string(),
                dependencies: vec![ResolvedDependencyEntry::Resolved {
                    capability: "info".to_string(),
                    tool_info: tool_info("get_disk_info", "http://localhost:9001", "info-disk"),
                }],
            },
            ToolDependencyResolution {
                function_name: "tool_b".to_string(),
                capability: "tool_b".to_string(),
                dependencies: vec![ResolvedDependencyEntry::Resolved {
                    capability: "info".to_string(),
                    tool_info: tool_info("get_memory_info", "http://localhost:9002", "info-memory"),
                }],
            },
        ];
        runtime.process_dependency_changes(&resolution).await;
        let _ = event_rx.recv().await.unwrap();
        let _ = event_rx.recv().await.unwrap();

        let state = shared_state.read().await;
        assert_eq!(state.dependencies.get(&("tool_a".to_string(), 0)).unwrap(), "http://localhost:9001");
        assert_eq!(state.dependencies.get(&("tool_b".to_string(), 0)).unwrap(), "http://localhost:9002");
    }
}
