//! Dependency cache: the full `(function_name, dep_index) -> ToolInfo` table
//! resolved from the registry, diffed on every heartbeat response and driving
//! the injector's hot-swap.
//!
//! This generalizes the teacher's `runtime::TopologyState`, which tracked a
//! single endpoint per capability, to the shape this mesh actually needs: one
//! agent can declare several tools, each with its own independently-resolved
//! dependency list.

use std::collections::HashMap;

use mesh_types::wire::{ResolvedDependencyEntry, ToolDependencyResolution, ToolInfo};
use tracing::info;

use crate::injector;
use crate::proxy::{get_or_create_proxy, ProxyConfig};

/// One cached binding: the resolved tool info plus a monotonic epoch,
/// bumped on every change, for observability (not used for ordering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBinding {
    pub capability: String,
    pub tool_info: ToolInfo,
    pub epoch: u64,
}

/// A single binding transition produced by [`DependencyCache::apply`] — the
/// hot-swap itself has already happened by the time this is returned, this
/// is purely for callers that need to emit their own events.
#[derive(Debug, Clone)]
pub enum DependencyChange {
    Available { function_name: String, dep_index: u32, capability: String, tool_info: ToolInfo },
    Changed { function_name: String, dep_index: u32, capability: String, tool_info: ToolInfo },
    Unavailable { function_name: String, dep_index: u32, capability: String },
}

/// The full dependency topology cache for one agent.
#[derive(Debug, Default)]
pub struct DependencyCache {
    bindings: HashMap<(String, u32), CachedBinding>,
    next_epoch: u64,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, function_name: &str, dep_index: u32) -> Option<&CachedBinding> {
        self.bindings.get(&(function_name.to_string(), dep_index))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Apply a heartbeat response's resolutions, ignoring `ttl`/timestamps,
    /// hot-swapping any `(function_name, dep_index)` whose resolved tool_info
    /// actually changed or whose resolved/unresolved status flipped. A failed
    /// POST must never reach this method — the caller only calls it on
    /// success, leaving the cache untouched on network/HTTP error.
    ///
    /// Returns every binding transition so the caller can emit its own
    /// events without re-deriving the diff.
    pub fn apply(&mut self, resolved: &[ToolDependencyResolution], proxy_config: ProxyConfig) -> Vec<DependencyChange> {
        let mut changes = Vec::new();
        let mut seen: Vec<(String, u32)> = Vec::new();

        for resolution in resolved {
            for (dep_index, entry) in resolution.dependencies.iter().enumerate() {
                let key = (resolution.function_name.clone(), dep_index as u32);
                seen.push(key.clone());

                match entry {
                    ResolvedDependencyEntry::Resolved { capability, tool_info } => {
                        let existing = self.bindings.get(&key);
                        let changed = existing.map(|b| &b.tool_info != tool_info).unwrap_or(true);
                        if changed {
                            let is_new = existing.is_none();
                            self.next_epoch += 1;
                            info!(
                                function = %key.0, dep_index = key.1,
                                endpoint = %tool_info.endpoint, target = %tool_info.name,
                                "dependency binding changed"
                            );
                            let proxy = get_or_create_proxy(&tool_info.endpoint, &tool_info.name, proxy_config.clone());
                            injector::swap_dependency(&key.0, key.1 as usize, Some(proxy));
                            self.bindings.insert(
                                key.clone(),
                                CachedBinding { capability: capability.clone(), tool_info: tool_info.clone(), epoch: self.next_epoch },
                            );
                            changes.push(if is_new {
                                DependencyChange::Available {
                                    function_name: key.0,
                                    dep_index: key.1,
                                    capability: capability.clone(),
                                    tool_info: tool_info.clone(),
                                }
                            } else {
                                DependencyChange::Changed {
                                    function_name: key.0,
                                    dep_index: key.1,
                                    capability: capability.clone(),
                                    tool_info: tool_info.clone(),
                                }
                            });
                        }
                    }
                    ResolvedDependencyEntry::Unresolved { .. } => {
                        if let Some(old) = self.bindings.remove(&key) {
                            self.next_epoch += 1;
                            info!(function = %key.0, dep_index = key.1, "dependency binding cleared (unresolved)");
                            injector::swap_dependency(&key.0, key.1 as usize, None);
                            changes.push(DependencyChange::Unavailable { function_name: key.0, dep_index: key.1, capability: old.capability });
                        }
                    }
                }
            }
        }

        // Anything cached but absent from this response's tool list has been
        // dropped from the agent's own manifest (a tool was removed) — clear it.
        let stale: Vec<(String, u32)> = self.bindings.keys().filter(|k| !seen.contains(k)).cloned().collect();
        for key in stale {
            if let Some(old) = self.bindings.remove(&key) {
                injector::swap_dependency(&key.0, key.1 as usize, None);
                changes.push(DependencyChange::Unavailable { function_name: key.0, dep_index: key.1, capability: old.capability });
            }
        }

        changes
    }
}
