//! Agent specification types, re-exported from `mesh_types` so the registry
//! and the agent runtime agree on one definition (spec.md §3's Tool/
//! Dependency/Agent shapes).

pub use mesh_types::{AgentSpec, DependencySpec, ToolSpec};
