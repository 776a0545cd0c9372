//! Shared wire and specification types for MCP Mesh.
//!
//! Both the registry and the agent runtime depend on this crate so the JSON
//! shapes they exchange (spec.md §4.2 and §6) can't drift apart.

pub mod events;
pub mod spec;
pub mod tags;
pub mod wire;

pub use events::{AgentStatus, EventType, HealthReport};
pub use spec::{AgentSpec, DependencySpec, ToolSpec};
pub use tags::{parse_selector, TagSelector, TagSelectors};
pub use wire::{
    AgentMetadata, AgentRequest, AgentResponse, DependencyRequest, ResolvedDependencyEntry,
    ToolDependencyResolution, ToolInfo, ToolRequest,
};
