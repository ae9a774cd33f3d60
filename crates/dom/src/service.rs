//! DOM Service - CDP JSON → arena
//!
//! This handles:
//! - Building the tree from a `DOM.getDocument` response
//! - Applying live CDP DOM events (`DOM.childNodeInserted`,
//!   `DOM.childNodeRemoved`, `DOM.setChildNodes`, attribute changes) so the
//!   arena stays a mirror of the page
//!
//! Child-list events go through the arena's journalled operations, so each
//! one shows up as a mutation record exactly like a local change would.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::*;
use serde_json::Value;
use std::collections::HashMap;

/// Configuration for DOM service
#[derive(Debug, Clone, Default)]
pub struct DomServiceConfig {
    /// Treat shadow roots as ordinary children (document queries do not)
    pub pierce_shadow_roots: bool,
    /// Mirror iframe content documents under their owner element
    pub include_content_documents: bool,
}

/// CDP ingestion service
#[derive(Debug, Clone, Default)]
pub struct DomService {
    config: DomServiceConfig,
}

impl DomService {
    /// Create new DOM service with default config
    pub fn new() -> Self {
        Self::with_config(DomServiceConfig::default())
    }

    /// Create DOM service with custom config
    pub fn with_config(config: DomServiceConfig) -> Self {
        Self { config }
    }

    /// Parse CDP DOM tree response and rebuild `arena` from it
    ///
    /// Input format matches CDP's DOM.getDocument response:
    /// ```json
    /// {
    ///   "root": {
    ///     "nodeId": 1,
    ///     "backendNodeId": 1,
    ///     "nodeType": 9,
    ///     "nodeName": "#document",
    ///     "children": [...]
    ///   }
    /// }
    /// ```
    ///
    /// The initial load is not a mutation: nothing is journalled.
    pub fn parse_document(&self, arena: &mut DomArena, cdp_response: &Value) -> Result<NodeId> {
        let root = cdp_response
            .get("root")
            .ok_or_else(|| DomError::MalformedPayload("Missing 'root'".to_string()))?;

        arena.clear();
        let root_id = self.parse_subtree(arena, root)?;
        arena.set_root(root_id)?;

        Ok(root_id)
    }

    /// Parse a CDP node (and whatever children it carries) into a detached subtree
    pub fn parse_subtree(&self, arena: &mut DomArena, cdp_node: &Value) -> Result<NodeId> {
        let node = Self::parse_node(cdp_node)?;
        let current_id = arena.add_node(node);

        let mut child_ids = smallvec::SmallVec::<[NodeId; 4]>::new();

        if let Some(children) = cdp_node["children"].as_array() {
            for child in children {
                child_ids.push(self.parse_subtree(arena, child)?);
            }
        }

        if self.config.pierce_shadow_roots {
            if let Some(shadow_roots) = cdp_node["shadowRoots"].as_array() {
                for shadow in shadow_roots {
                    child_ids.push(self.parse_subtree(arena, shadow)?);
                }
            }
        }

        if self.config.include_content_documents {
            if let Some(content_doc) = cdp_node.get("contentDocument") {
                child_ids.push(self.parse_subtree(arena, content_doc)?);
            }
        }

        // Link directly: building a fresh subtree is not a mutation
        for &child_id in &child_ids {
            arena.get_mut(child_id)?.parent_id = Some(current_id);
        }
        arena.get_mut(current_id)?.children_ids = child_ids;

        Ok(current_id)
    }

    /// Parse a single CDP node's own fields
    fn parse_node(cdp_node: &Value) -> Result<DomNode> {
        let remote_id = cdp_node["nodeId"]
            .as_u64()
            .ok_or_else(|| DomError::MalformedPayload("Missing nodeId".to_string()))?
            as RemoteId;

        let node_type_val = cdp_node["nodeType"]
            .as_u64()
            .ok_or_else(|| DomError::MalformedPayload("Missing nodeType".to_string()))?
            as u8;

        let node_type =
            NodeType::from_u8(node_type_val).ok_or_else(|| DomError::InvalidNodeType {
                expected: "valid NodeType".to_string(),
                actual: format!("{}", node_type_val),
            })?;

        let mut node = DomNode::new(node_type, cdp_node["nodeName"].as_str().unwrap_or(""));
        node.remote_id = Some(remote_id);
        node.backend_node_id = cdp_node["backendNodeId"].as_u64().map(|id| id as u32);
        node.node_value = cdp_node["nodeValue"].as_str().unwrap_or("").to_string();
        node.attributes = Self::parse_attributes(&cdp_node["attributes"]);

        Ok(node)
    }

    /// CDP sends attributes as a flat `[name, value, name, value, ...]` array
    fn parse_attributes(attrs: &Value) -> HashMap<String, String> {
        let mut attributes = HashMap::new();
        if let Some(attrs) = attrs.as_array() {
            for pair in attrs.chunks_exact(2) {
                if let (Some(key), Some(value)) = (pair[0].as_str(), pair[1].as_str()) {
                    attributes.insert(key.to_string(), value.to_string());
                }
            }
        }
        attributes
    }

    fn remote_param(params: &Value, key: &str) -> Result<RemoteId> {
        params[key]
            .as_u64()
            .map(|id| id as RemoteId)
            .ok_or_else(|| DomError::MalformedPayload(format!("Missing {}", key)))
    }

    fn mirrored(arena: &DomArena, remote_id: RemoteId) -> Result<NodeId> {
        arena
            .node_id_by_remote(remote_id)
            .ok_or(DomError::RemoteNodeNotFound(remote_id))
    }

    /// Apply `DOM.childNodeInserted { parentNodeId, previousNodeId, node }`
    ///
    /// Returns the arena id of the inserted subtree root.
    pub fn apply_child_node_inserted(&self, arena: &mut DomArena, params: &Value) -> Result<NodeId> {
        let parent = Self::mirrored(arena, Self::remote_param(params, "parentNodeId")?)?;

        // previousNodeId 0 means "insert as first child"
        let previous = match Self::remote_param(params, "previousNodeId")? {
            0 => None,
            remote => Some(Self::mirrored(arena, remote)?),
        };

        let node = params
            .get("node")
            .ok_or_else(|| DomError::MalformedPayload("Missing node".to_string()))?;
        let child = self.parse_subtree(arena, node)?;

        arena.insert_after(parent, previous, child)?;
        Ok(child)
    }

    /// Apply `DOM.childNodeRemoved { parentNodeId, nodeId }`
    ///
    /// Removing a node that is already detached (e.g. we removed it
    /// ourselves and this is the echo) is a no-op, as is removing one the
    /// arena no longer knows (it was detached and then reclaimed).
    pub fn apply_child_node_removed(&self, arena: &mut DomArena, params: &Value) -> Result<bool> {
        let remote_id = Self::remote_param(params, "nodeId")?;
        match arena.node_id_by_remote(remote_id) {
            Some(node) => arena.remove(node),
            None => Ok(false),
        }
    }

    /// Apply `DOM.setChildNodes { parentId, nodes }`: replace the children of
    /// a mirrored node with the provided list
    pub fn apply_set_child_nodes(&self, arena: &mut DomArena, params: &Value) -> Result<()> {
        let parent = Self::mirrored(arena, Self::remote_param(params, "parentId")?)?;
        let nodes = params["nodes"]
            .as_array()
            .ok_or_else(|| DomError::MalformedPayload("Missing nodes".to_string()))?;

        let existing = arena.get(parent)?.children_ids.to_vec();
        for child in existing {
            arena.remove(child)?;
        }

        for node in nodes {
            let child = self.parse_subtree(arena, node)?;
            arena.append_child(parent, child)?;
        }

        Ok(())
    }

    /// Apply `DOM.attributeModified { nodeId, name, value }`
    pub fn apply_attribute_modified(&self, arena: &mut DomArena, params: &Value) -> Result<()> {
        let node = Self::mirrored(arena, Self::remote_param(params, "nodeId")?)?;
        let name = params["name"]
            .as_str()
            .ok_or_else(|| DomError::MalformedPayload("Missing name".to_string()))?;
        let value = params["value"].as_str().unwrap_or("");
        arena.set_attribute(node, name, value)
    }

    /// Apply `DOM.attributeRemoved { nodeId, name }`
    pub fn apply_attribute_removed(&self, arena: &mut DomArena, params: &Value) -> Result<()> {
        let node = Self::mirrored(arena, Self::remote_param(params, "nodeId")?)?;
        if let Some(name) = params["name"].as_str() {
            arena.get_mut(node)?.attributes.remove(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationRecord;

    fn sample_document() -> Value {
        serde_json::json!({
            "root": {
                "nodeId": 1,
                "backendNodeId": 1,
                "nodeType": 9,
                "nodeName": "#document",
                "nodeValue": "",
                "children": [{
                    "nodeId": 2,
                    "backendNodeId": 2,
                    "nodeType": 1,
                    "nodeName": "BODY",
                    "nodeValue": "",
                    "attributes": ["class", "v2"],
                    "children": [{
                        "nodeId": 3,
                        "backendNodeId": 3,
                        "nodeType": 1,
                        "nodeName": "SHREDDIT-COMMENT-TREE-ADS",
                        "attributes": []
                    }],
                    "shadowRoots": [{
                        "nodeId": 9,
                        "nodeType": 11,
                        "nodeName": "#document-fragment"
                    }]
                }]
            }
        })
    }

    #[test]
    fn test_parse_simple_dom() {
        let mut arena = DomArena::new();
        let service = DomService::new();
        let root_id = service.parse_document(&mut arena, &sample_document()).unwrap();

        assert_eq!(root_id, 0);
        // Shadow root not mirrored by default
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get_by_remote_id(2).unwrap().attr("class"), Some("v2"));
        assert!(arena.take_records().is_empty());
    }

    #[test]
    fn test_pierce_shadow_roots() {
        let mut arena = DomArena::new();
        let service = DomService::with_config(DomServiceConfig {
            pierce_shadow_roots: true,
            ..Default::default()
        });
        service.parse_document(&mut arena, &sample_document()).unwrap();

        assert_eq!(arena.len(), 4);
        let fragment = arena.node_id_by_remote(9).unwrap();
        assert!(arena.is_connected(fragment));
    }

    #[test]
    fn test_child_node_inserted_and_removed() {
        let mut arena = DomArena::new();
        let service = DomService::new();
        service.parse_document(&mut arena, &sample_document()).unwrap();
        let body = arena.node_id_by_remote(2).unwrap();

        let inserted = service
            .apply_child_node_inserted(
                &mut arena,
                &serde_json::json!({
                    "parentNodeId": 2,
                    "previousNodeId": 3,
                    "node": {
                        "nodeId": 10,
                        "nodeType": 1,
                        "nodeName": "DIV",
                        "children": [{
                            "nodeId": 11,
                            "nodeType": 1,
                            "nodeName": "SHREDDIT-AD-POST",
                            "attributes": ["promoted", ""]
                        }]
                    }
                }),
            )
            .unwrap();

        // One record for the subtree root, none for its pre-attached child
        assert_eq!(
            arena.take_records(),
            vec![MutationRecord::added(body, inserted)]
        );
        let post = arena.node_id_by_remote(11).unwrap();
        assert!(arena.is_connected(post));

        let removed = service
            .apply_child_node_removed(
                &mut arena,
                &serde_json::json!({ "parentNodeId": 2, "nodeId": 10 }),
            )
            .unwrap();
        assert!(removed);
        assert!(!arena.is_connected(post));

        // Echo of an already-applied removal
        let removed_again = service
            .apply_child_node_removed(
                &mut arena,
                &serde_json::json!({ "parentNodeId": 2, "nodeId": 10 }),
            )
            .unwrap();
        assert!(!removed_again);
    }

    #[test]
    fn test_set_child_nodes_replaces_children() {
        let mut arena = DomArena::new();
        let service = DomService::new();
        service.parse_document(&mut arena, &sample_document()).unwrap();

        service
            .apply_set_child_nodes(
                &mut arena,
                &serde_json::json!({
                    "parentId": 3,
                    "nodes": [
                        { "nodeId": 20, "nodeType": 1, "nodeName": "TEMPLATE" },
                        { "nodeId": 21, "nodeType": 3, "nodeName": "#text", "nodeValue": "x" }
                    ]
                }),
            )
            .unwrap();

        let container = arena.node_id_by_remote(3).unwrap();
        assert_eq!(arena.children(container).unwrap().len(), 2);
        assert_eq!(arena.take_records().len(), 2);
    }

    #[test]
    fn test_attribute_events() {
        let mut arena = DomArena::new();
        let service = DomService::new();
        service.parse_document(&mut arena, &sample_document()).unwrap();

        service
            .apply_attribute_modified(
                &mut arena,
                &serde_json::json!({ "nodeId": 3, "name": "id", "value": "x" }),
            )
            .unwrap();
        assert_eq!(arena.get_by_remote_id(3).unwrap().id(), Some("x"));

        service
            .apply_attribute_removed(&mut arena, &serde_json::json!({ "nodeId": 3, "name": "id" }))
            .unwrap();
        assert_eq!(arena.get_by_remote_id(3).unwrap().id(), None);
    }

    #[test]
    fn test_unknown_parent_is_error() {
        let mut arena = DomArena::new();
        let service = DomService::new();
        service.parse_document(&mut arena, &sample_document()).unwrap();

        let err = service
            .apply_child_node_inserted(
                &mut arena,
                &serde_json::json!({
                    "parentNodeId": 99,
                    "previousNodeId": 0,
                    "node": { "nodeId": 12, "nodeType": 1, "nodeName": "DIV" }
                }),
            )
            .unwrap_err();
        assert!(matches!(err, DomError::RemoteNodeNotFound(99)));
        assert_eq!(arena.node_id_by_remote(12), None);
    }

    #[test]
    fn test_removal_echo_after_reclaim_is_noop() {
        let mut arena = DomArena::new();
        let service = DomService::new();
        service.parse_document(&mut arena, &sample_document()).unwrap();
        let container = arena.node_id_by_remote(3).unwrap();

        // Removed locally, then reclaimed before the browser's echo arrives
        arena.remove(container).unwrap();
        arena.take_records();
        assert_eq!(arena.reclaim(), 1);
        assert_eq!(arena.node_id_by_remote(3), None);

        let removed = service
            .apply_child_node_removed(&mut arena, &serde_json::json!({ "parentNodeId": 2, "nodeId": 3 }))
            .unwrap();
        assert!(!removed);
        assert!(arena.take_records().is_empty());
    }
}
