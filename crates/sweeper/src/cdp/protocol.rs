//! CDP wire types
//!
//! Only what the page mirror needs: the request/response/event envelope,
//! target metadata, and the DOM event names we consume.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type RequestId = u64;

pub type TargetId = String;

pub type SessionId = String;

/// DOM domain events mirrored into the page
pub mod events {
    pub const CHILD_NODE_INSERTED: &str = "DOM.childNodeInserted";
    pub const CHILD_NODE_REMOVED: &str = "DOM.childNodeRemoved";
    pub const SET_CHILD_NODES: &str = "DOM.setChildNodes";
    pub const ATTRIBUTE_MODIFIED: &str = "DOM.attributeModified";
    pub const ATTRIBUTE_REMOVED: &str = "DOM.attributeRemoved";
    pub const DOCUMENT_UPDATED: &str = "DOM.documentUpdated";
    pub const LOAD_EVENT_FIRED: &str = "Page.loadEventFired";
    pub const DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";

    /// Everything a binding subscribes to
    pub const MIRRORED: &[&str] = &[
        CHILD_NODE_INSERTED,
        CHILD_NODE_REMOVED,
        SET_CHILD_NODES,
        ATTRIBUTE_MODIFIED,
        ATTRIBUTE_REMOVED,
        DOCUMENT_UPDATED,
        LOAD_EVENT_FIRED,
        DETACHED_FROM_TARGET,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ProtocolError>,
}

/// Error object carried by a failed response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Event from the browser (no request id)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

static NO_PARAMS: Value = Value::Null;

impl CdpEvent {
    /// Params, or `null` when the event carried none
    pub fn params(&self) -> &Value {
        self.params.as_ref().unwrap_or(&NO_PARAMS)
    }

    /// Was this event emitted inside the given flattened session?
    pub fn is_for(&self, session_id: &str) -> bool {
        match self.method.as_str() {
            // Browser-level event that names the session in its params
            events::DETACHED_FROM_TARGET => {
                self.params()["sessionId"].as_str() == Some(session_id)
            }
            _ => self.session_id.as_deref() == Some(session_id),
        }
    }
}

/// Anything arriving on the socket
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// Entry of `Target.getTargets` / `Target.getTargetInfo`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
}

impl TargetInfo {
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}
