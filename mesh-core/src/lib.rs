//! Agent-side runtime processor for MCP Mesh.
//!
//! Wraps the heartbeat state machine, registry HTTP client, and dependency
//! topology tracking that an embedding process (an MCP tool server) needs to
//! participate in the mesh: register its tools, keep its resolved
//! dependencies current, and hot-swap injected proxies as the topology
//! changes underneath it.

pub mod cache;
pub mod collector;
pub mod config;
pub mod events;
pub mod handle;
pub mod heartbeat;
pub mod injector;
pub mod proxy;
pub mod registry;
pub mod runtime;
pub mod shutdown;
pub mod spec;

pub use cache::DependencyCache;
pub use collector::{collect_agent_spec, register_tool, AgentSpecOverrides};
pub use events::{HealthStatus, MeshEvent};
pub use handle::{AgentHandle, HandleState};
pub use heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatState, HeartbeatStateMachine};
pub use injector::{InjectionSlot, InjectionWrapper};
pub use proxy::{ProxyConfig, ProxyError, ToolProxy};
pub use registry::{FastHeartbeatStatus, RegistryClient, RegistryError};
pub use runtime::{AgentRuntime, RuntimeConfig};
pub use shutdown::shutdown_signal;
pub use spec::{AgentSpec, DependencySpec, ToolSpec};
