//! Dependency injection: atomic hot-swap of resolved proxies into a tool's
//! call site.
//!
//! Each declared dependency gets one `InjectionSlot` — a lock-free atomic
//! pointer. Topology changes (driven by `crate::cache`) replace the pointer;
//! in-flight invocations keep using whichever `Arc<ToolProxy>` they already
//! captured, per the "readers tolerate staleness" invariant.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, RwLock};

use arc_swap::ArcSwapOption;
use serde_json::Value;
use tracing::debug;

use crate::proxy::ToolProxy;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type OriginalHandler = Box<dyn Fn(Value, &[Option<Arc<ToolProxy>>]) -> BoxFuture<Value> + Send + Sync>;

/// One dependency's atomic slot. `None` means "not currently resolved" —
/// the original handler sees it as a null dependency, per §4.6.
#[derive(Default)]
pub struct InjectionSlot(ArcSwapOption<ToolProxy>);

impl InjectionSlot {
    pub fn empty() -> Self {
        Self(ArcSwapOption::empty())
    }

    /// Atomically replace the proxy this slot points at.
    pub fn set(&self, proxy: Option<Arc<ToolProxy>>) {
        self.0.store(proxy);
    }

    /// Snapshot the current proxy without blocking writers.
    pub fn load(&self) -> Option<Arc<ToolProxy>> {
        self.0.load_full()
    }
}

/// Wraps one tool's original handler with its dependency slots, so an
/// invocation always calls through to the application code with whichever
/// proxies are currently resolved.
pub struct InjectionWrapper {
    slots: Vec<InjectionSlot>,
    handler: OriginalHandler,
}

impl InjectionWrapper {
    pub fn new(dependency_count: usize, handler: OriginalHandler) -> Self {
        let slots = (0..dependency_count).map(|_| InjectionSlot::empty()).collect();
        Self { slots, handler }
    }

    /// Atomically update the proxy for one declared dependency by position.
    pub fn set_slot(&self, dep_index: usize, proxy: Option<Arc<ToolProxy>>) {
        if let Some(slot) = self.slots.get(dep_index) {
            slot.set(proxy);
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Invoke the original handler with a snapshot of every slot.
    pub async fn invoke(&self, args: Value) -> Value {
        let snapshot: Vec<Option<Arc<ToolProxy>>> = self.slots.iter().map(InjectionSlot::load).collect();
        (self.handler)(args, &snapshot).await
    }
}

/// Process-wide registry of injection wrappers, keyed by fully-qualified
/// function name — the monkey-patched-function-replacement idiom made
/// explicit as a thread-safe map with atomic slot pointers underneath.
static FUNCTION_REGISTRY: OnceLock<RwLock<HashMap<String, Arc<InjectionWrapper>>>> = OnceLock::new();

fn function_registry() -> &'static RwLock<HashMap<String, Arc<InjectionWrapper>>> {
    FUNCTION_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a tool's wrapper at startup, once per function name.
pub fn register_function(function_name: impl Into<String>, wrapper: InjectionWrapper) -> Arc<InjectionWrapper> {
    let function_name = function_name.into();
    let wrapper = Arc::new(wrapper);
    debug!(function_name, slots = wrapper.slot_count(), "registered function for dependency injection");
    function_registry().write().unwrap().insert(function_name, wrapper.clone());
    wrapper
}

/// Look up a registered wrapper by function name.
pub fn get_function(function_name: &str) -> Option<Arc<InjectionWrapper>> {
    function_registry().read().unwrap().get(function_name).cloned()
}

/// Hot-swap the proxy bound to `(function_name, dep_index)`, if the function
/// is registered. No-op (with a debug log) if it isn't — the heartbeat
/// response can reference tools the local process hasn't collected yet.
pub fn swap_dependency(function_name: &str, dep_index: usize, proxy: Option<Arc<ToolProxy>>) {
    match get_function(function_name) {
        Some(wrapper) => wrapper.set_slot(dep_index, proxy),
        None => debug!(function_name, dep_index, "no registered function for dependency slot"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyConfig;

    fn test_handler() -> OriginalHandler {
        Box::new(|args, slots| {
            let resolved_count = slots.iter().filter(|s| s.is_some()).count();
            Box::pin(async move { serde_json::json!({ "args": args, "resolved": resolved_count }) })
        })
    }

    #[tokio::test]
    async fn invoke_sees_null_slot_until_swapped() {
        let wrapper = InjectionWrapper::new(1, test_handler());
        let result = wrapper.invoke(serde_json::json!({"x": 1})).await;
        assert_eq!(result["resolved"], 0);

        let proxy = Arc::new(ToolProxy::new("http://localhost:9001", "get_date", ProxyConfig::default()));
        wrapper.set_slot(0, Some(proxy));

        let result = wrapper.invoke(serde_json::json!({"x": 1})).await;
        assert_eq!(result["resolved"], 1);
    }

    #[test]
    fn registry_roundtrip_and_swap() {
        let wrapper = InjectionWrapper::new(1, test_handler());
        register_function("unit_test_fn", wrapper);
        assert!(get_function("unit_test_fn").is_some());

        let proxy = Arc::new(ToolProxy::new("http://localhost:9001", "get_date", ProxyConfig::default()));
        swap_dependency("unit_test_fn", 0, Some(proxy));
        let snapshot = get_function("unit_test_fn").unwrap().slots[0].load();
        assert!(snapshot.is_some());

        swap_dependency("unregistered_fn", 0, None);
    }
}
