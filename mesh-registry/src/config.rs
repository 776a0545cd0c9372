//! Registry process configuration: env-first, same `env::var` + default
//! pattern the teacher's `mesh-core::config` uses (no config crate, per
//! SPEC_FULL.md's ambient-stack note).

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub database_url: String,
    pub bind_address: String,
    pub health_check_interval: Duration,
    pub unhealthy_timeout: chrono::Duration,
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/mcp_mesh".to_string()),
            bind_address: env::var("MESH_REGISTRY_BIND").unwrap_or_else(|_| "0.0.0.0:7650".to_string()),
            health_check_interval: Duration::from_secs(parse_env_u64("MESH_REGISTRY_HEALTH_CHECK_INTERVAL", 30)),
            unhealthy_timeout: chrono::Duration::seconds(parse_env_u64("MESH_REGISTRY_UNHEALTHY_TIMEOUT", 90) as i64),
        }
    }
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
