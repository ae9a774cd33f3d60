//! DOM Serializer - compact markup outline of the tree
//!
//! Used for diagnostics (trace logs of what a sweep left behind) and for
//! asserting tree shapes in tests. Not an HTML serializer: attributes are
//! sorted, whitespace-only text is dropped, tags are lower-cased.

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::*;
use crate::utils;

/// Serializer configuration
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    /// Only emit these attributes (None = all)
    pub include_attributes: Option<Vec<String>>,
    pub max_text_length: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            include_attributes: None,
            max_text_length: 200,
        }
    }
}

/// DOM Tree Serializer
pub struct DomSerializer {
    config: SerializerConfig,
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    /// Serialize the connected document
    pub fn serialize(&self, arena: &DomArena) -> Result<String> {
        let mut output = String::with_capacity(4096);

        if let Some(root_id) = arena.root_id() {
            self.serialize_node(arena, root_id, &mut output)?;
        }

        Ok(output)
    }

    /// Serialize any subtree, attached or not
    pub fn serialize_subtree(&self, arena: &DomArena, node_id: NodeId) -> Result<String> {
        let mut output = String::new();
        self.serialize_node(arena, node_id, &mut output)?;
        Ok(output)
    }

    fn serialize_node(&self, arena: &DomArena, node_id: NodeId, output: &mut String) -> Result<()> {
        let node = arena.get(node_id)?;

        match node.node_type {
            NodeType::Element => {
                let tag = node.node_name.to_lowercase();
                output.push('<');
                output.push_str(&tag);

                let mut attrs: Vec<(&String, &String)> = node
                    .attributes
                    .iter()
                    .filter(|(name, _)| self.includes(name))
                    .collect();
                attrs.sort();

                for (name, value) in attrs {
                    if value.is_empty() {
                        output.push_str(&format!(" {}", name));
                    } else {
                        output.push_str(&format!(" {}=\"{}\"", name, value));
                    }
                }
                output.push('>');

                for &child_id in &node.children_ids {
                    self.serialize_node(arena, child_id, output)?;
                }

                output.push_str("</");
                output.push_str(&tag);
                output.push('>');
            }
            NodeType::Text => {
                let text = node.node_value.trim();
                if !text.is_empty() {
                    output.push_str(&utils::cap_text_length(text, self.config.max_text_length));
                }
            }
            NodeType::Document | NodeType::DocumentFragment => {
                for &child_id in &node.children_ids {
                    self.serialize_node(arena, child_id, output)?;
                }
            }
            _ => {
                // Comments, doctypes and the rest carry nothing worth showing
            }
        }

        Ok(())
    }

    fn includes(&self, name: &str) -> bool {
        match &self.config.include_attributes {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

impl Default for DomSerializer {
    fn default() -> Self {
        Self::new()
    }
}
