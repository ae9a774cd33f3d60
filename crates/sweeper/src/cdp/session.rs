//! CDP session - one flattened attachment to a page target
//!
//! Shares the client's WebSocket; every command carries the session id.

use super::client::{CdpClient, Result};
use super::protocol::{AttachToTargetResult, SessionId, TargetId, TargetInfo};
use serde_json::{json, Value};
use std::sync::Arc;

/// Domains the page mirror depends on
const MIRROR_DOMAINS: &[&str] = &["Page", "DOM", "Runtime"];

#[derive(Clone)]
pub struct CdpSession {
    client: Arc<CdpClient>,
    pub target_id: TargetId,
    pub session_id: SessionId,
}

impl CdpSession {
    /// Attach with `flatten: true` and enable the mirror domains
    pub async fn attach(client: Arc<CdpClient>, target_id: TargetId) -> Result<Self> {
        let result = client
            .send_request(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;
        let AttachToTargetResult { session_id } = serde_json::from_value(result)?;

        let enables = MIRROR_DOMAINS.iter().map(|domain| {
            let client = client.clone();
            let session_id = session_id.clone();
            async move {
                client
                    .send_request(format!("{}.enable", domain), None, Some(session_id))
                    .await
            }
        });

        // All three are required: without DOM events there is nothing to mirror
        for result in futures_util::future::join_all(enables).await {
            result?;
        }

        tracing::debug!("[CdpSession] Attached to {} as {}", target_id, session_id);

        Ok(Self {
            client,
            target_id,
            session_id,
        })
    }

    pub fn client(&self) -> &Arc<CdpClient> {
        &self.client
    }

    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request(method, params, Some(self.session_id.clone()))
            .await
    }

    pub async fn target_info(&self) -> Result<TargetInfo> {
        let result = self
            .client
            .send_request(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &self.target_id })),
                None,
            )
            .await?;

        Ok(serde_json::from_value(result["targetInfo"].clone())?)
    }

    /// `document.readyState == "complete"`, i.e. the load event has fired
    pub async fn is_loaded(&self) -> Result<bool> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": "document.readyState",
                    "returnByValue": true,
                })),
            )
            .await?;

        Ok(result["result"]["value"].as_str() == Some("complete"))
    }

    /// Full light-DOM tree of the top document
    pub async fn get_document(&self) -> Result<Value> {
        self.send("DOM.getDocument", Some(json!({ "depth": -1 })))
            .await
    }

    /// Ask the browser to push the children of `node_id` via `DOM.setChildNodes`
    pub async fn request_child_nodes(&self, node_id: u32) -> Result<()> {
        self.send(
            "DOM.requestChildNodes",
            Some(json!({ "nodeId": node_id, "depth": -1 })),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_node(&self, node_id: u32) -> Result<()> {
        self.send("DOM.removeNode", Some(json!({ "nodeId": node_id })))
            .await?;
        Ok(())
    }

    pub async fn detach(&self) -> Result<()> {
        self.client
            .send_request(
                "Target.detachFromTarget",
                Some(json!({ "sessionId": &self.session_id })),
                None,
            )
            .await?;
        Ok(())
    }
}
