//! Central coordination service for MCP Mesh: inventory, resolution, liveness.

pub mod api;
pub mod clock;
pub mod config;
pub mod liveness;
pub mod model;
pub mod resolver;
pub mod storage;

pub use api::{router, AppState};
pub use config::RegistryConfig;
pub use storage::Storage;
