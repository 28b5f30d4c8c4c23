use std::sync::Arc;

use zbus::interface;

use rollcall_core::IdentityStore;

use crate::pipeline::PipelineHandle;

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
pub struct RollcallService {
    handle: PipelineHandle,
    store: Arc<IdentityStore>,
}

impl RollcallService {
    pub fn new(handle: PipelineHandle, store: Arc<IdentityStore>) -> Self {
        Self { handle, store }
    }
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Register a new person from the live feed.
    async fn register(&self, name: &str, tag: u32) -> zbus::fdo::Result<String> {
        tracing::info!(name, tag, "register requested");
        self.handle
            .register(name, tag)
            .await
            .map(|_| format!("registered {name} (tag {tag})"))
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return pipeline status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self
            .handle
            .status()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&report).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// List enrolled identities as JSON.
    async fn roster(&self) -> zbus::fdo::Result<String> {
        let entries: Vec<serde_json::Value> = self
            .store
            .snapshot()
            .iter()
            .map(|i| serde_json::json!({ "name": i.name, "tag": i.tag }))
            .collect();
        Ok(serde_json::Value::Array(entries).to_string())
    }
}
