//! Arena-based DOM tree storage
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! This arena eliminates:
//! - Rc/Arc overhead and parent/child reference cycles
//! - Recursive function calls (stack overflow risk on deep pages)
//! - Dangling references after removal (a removed node is just detached)
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<Option<DomNode>>
//!        [Node0][Node1][ free ][Node3]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```
//!
//! Removing a node clears its parent link and drops it from the parent's
//! child list; the subtree below it stays intact so the removed element can
//! still be described and forwarded to a remote host. Every child-list
//! change is journalled as a [`MutationRecord`].
//!
//! Detached subtrees are freed by [`DomArena::reclaim`], which the owner
//! calls between mutation steps once the records have been taken. Freed
//! slots (and their remote ids) are reused by later nodes.

use crate::error::{DomError, Result};
use crate::mutation::MutationRecord;
use crate::types::{DomNode, NodeId, NodeType, RemoteId};
use ahash::AHashMap;

/// Detaches after which [`DomArena::needs_reclaim`] reports true
pub const RECLAIM_THRESHOLD: usize = 256;

/// Arena allocator for DOM nodes
#[derive(Debug)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly), `None` once freed
    nodes: Vec<Option<DomNode>>,

    /// Freed slots, reused before the vector grows
    free: Vec<NodeId>,

    /// Remote (CDP) node ID → NodeId lookup
    remote_id_map: AHashMap<RemoteId, NodeId>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,

    /// Child-list changes not yet taken by an observer
    records: Vec<MutationRecord>,

    /// Detaches since the last reclaim
    detached_since_reclaim: usize,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::with_capacity(1024) // Pre-allocate for typical page
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            remote_id_map: AHashMap::with_capacity(capacity),
            root_id: None,
            records: Vec::new(),
            detached_since_reclaim: 0,
        }
    }

    /// Add a detached node to the arena, returns its ID
    pub fn add_node(&mut self, mut node: DomNode) -> NodeId {
        node.parent_id = None;
        let remote_id = node.remote_id;

        let node_id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot as usize] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                (self.nodes.len() - 1) as NodeId
            }
        };

        if let Some(remote_id) = remote_id {
            self.remote_id_map.insert(remote_id, node_id);
        }
        node_id
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.add_node(DomNode::element(tag))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, value: impl Into<String>) -> NodeId {
        self.add_node(DomNode::text(value))
    }

    /// Create a `#document` node and make it the root
    pub fn create_document(&mut self) -> NodeId {
        let id = self.add_node(DomNode::new(NodeType::Document, "#document"));
        self.root_id = Some(id);
        id
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .and_then(Option::as_ref)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .and_then(Option::as_mut)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node ID by remote node ID
    pub fn node_id_by_remote(&self, remote_id: RemoteId) -> Option<NodeId> {
        self.remote_id_map.get(&remote_id).copied()
    }

    /// Get node by remote node ID (from CDP)
    pub fn get_by_remote_id(&self, remote_id: RemoteId) -> Result<&DomNode> {
        let node_id = self
            .node_id_by_remote(remote_id)
            .ok_or(DomError::RemoteNodeNotFound(remote_id))?;
        self.get(node_id)
    }

    /// Set an attribute on an existing node
    pub fn set_attribute(
        &mut self,
        node_id: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.get_mut(node_id)?
            .attributes
            .insert(name.into(), value.into());
        Ok(())
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        // Verify node exists
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Number of live nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parent of a node, if attached
    pub fn parent_id(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.parent_id)
    }

    /// Get children of a node
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&DomNode>> {
        let node = self.get(node_id)?;
        node.children_ids
            .iter()
            .map(|&child_id| self.get(child_id))
            .collect()
    }

    /// Is `node_id` still reachable from the root?
    pub fn is_connected(&self, node_id: NodeId) -> bool {
        let Some(root_id) = self.root_id else {
            return false;
        };

        let mut current = Some(node_id);
        while let Some(id) = current {
            if id == root_id {
                return true;
            }
            current = self.get(id).ok().and_then(|node| node.parent_id);
        }
        false
    }

    /// Is `ancestor` the node itself or one of its ancestors?
    fn is_inclusive_ancestor(&self, ancestor: NodeId, node_id: NodeId) -> bool {
        let mut current = Some(node_id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).ok().and_then(|node| node.parent_id);
        }
        false
    }

    /// Append `child` as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insert(parent, child)?;
        self.remove(child)?;

        let position = self.get(parent)?.children_ids.len();
        self.link(parent, position, child)
    }

    /// Insert `child` right after `previous` (or first, if `previous` is None)
    ///
    /// Matches the shape of CDP's `DOM.childNodeInserted`. On error the tree
    /// and the journal are left as they were.
    pub fn insert_after(
        &mut self,
        parent: NodeId,
        previous: Option<NodeId>,
        child: NodeId,
    ) -> Result<()> {
        self.check_insert(parent, child)?;
        if let Some(prev) = previous {
            if prev == child || self.get(prev)?.parent_id != Some(parent) {
                return Err(DomError::NodeNotFound(prev));
            }
        }

        // Detach first so a move within the same parent sees the final sibling list
        self.remove(child)?;

        let position = match previous {
            Some(prev) => self
                .get(parent)?
                .children_ids
                .iter()
                .position(|&id| id == prev)
                .map(|idx| idx + 1)
                .ok_or(DomError::NodeNotFound(prev))?,
            None => 0,
        };
        self.link(parent, position, child)
    }

    /// Both nodes exist and `child` is not `parent` or one of its ancestors
    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.get(parent)?;
        self.get(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        Ok(())
    }

    /// Link an already detached `child` into `parent` at `position`
    fn link(&mut self, parent: NodeId, position: usize, child: NodeId) -> Result<()> {
        let siblings = &mut self.get_mut(parent)?.children_ids;
        let position = position.min(siblings.len());
        siblings.insert(position, child);
        self.get_mut(child)?.parent_id = Some(parent);

        self.records.push(MutationRecord::added(parent, child));
        Ok(())
    }

    /// Detach a node (and its subtree) from its parent
    ///
    /// Returns `Ok(false)` if the node had no parent; nothing is recorded.
    pub fn remove(&mut self, node_id: NodeId) -> Result<bool> {
        let Some(parent) = self.get(node_id)?.parent_id else {
            return Ok(false);
        };

        self.get_mut(parent)?.children_ids.retain(|id| *id != node_id);
        self.get_mut(node_id)?.parent_id = None;

        self.records.push(MutationRecord::removed(parent, node_id));
        self.detached_since_reclaim += 1;
        Ok(true)
    }

    /// Enough has been detached since the last reclaim to make one worthwhile
    pub fn needs_reclaim(&self) -> bool {
        self.detached_since_reclaim >= RECLAIM_THRESHOLD
    }

    /// Free every node not reachable from the root, returns how many
    ///
    /// Freed ids and their remote ids become invalid. Does nothing while
    /// records are pending (they still name detached nodes) or when there is
    /// no root.
    pub fn reclaim(&mut self) -> usize {
        let Some(root_id) = self.root_id else {
            return 0;
        };
        if !self.records.is_empty() {
            return 0;
        }

        let mut connected = vec![false; self.nodes.len()];
        let _ = self.traverse_df(root_id, |id, _| {
            connected[id as usize] = true;
            Ok(())
        });

        let mut freed = 0;
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if connected[idx] {
                continue;
            }
            let Some(node) = slot.take() else {
                continue;
            };
            let node_id = idx as NodeId;
            if let Some(remote_id) = node.remote_id {
                // A re-sent node may already map the remote id to a newer slot
                if self.remote_id_map.get(&remote_id) == Some(&node_id) {
                    self.remote_id_map.remove(&remote_id);
                }
            }
            self.free.push(node_id);
            freed += 1;
        }

        self.detached_since_reclaim = 0;
        freed
    }

    /// Previous sibling that is an element (skips text and comments)
    pub fn previous_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.get(node_id).ok()?.parent_id?;
        let siblings = &self.get(parent).ok()?.children_ids;
        let idx = siblings.iter().position(|&id| id == node_id)?;

        siblings[..idx]
            .iter()
            .rev()
            .copied()
            .find(|&id| self.get(id).map(|n| n.is_element()).unwrap_or(false))
    }

    /// Traverse tree depth-first (iterative, no recursion)
    ///
    /// Visits `start_id` first, then its subtree in document order.
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(NodeId, &DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node_id, node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Descendants of `start_id` in document order, excluding itself
    pub fn descendants(&self, start_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let _ = self.traverse_df(start_id, |id, _| {
            if id != start_id {
                out.push(id);
            }
            Ok(())
        });
        out
    }

    /// First descendant of `start_id` matching predicate (`element.querySelector`)
    pub fn find_descendant<F>(&self, start_id: NodeId, mut predicate: F) -> Option<NodeId>
    where
        F: FnMut(NodeId, &DomNode) -> bool,
    {
        let node = self.get(start_id).ok()?;
        let mut stack: Vec<NodeId> = node.children_ids.iter().rev().copied().collect();

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id).ok()?;
            if predicate(node_id, node) {
                return Some(node_id);
            }
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        None
    }

    /// All connected nodes matching predicate, in document order
    /// (`document.querySelectorAll`)
    ///
    /// The result is a snapshot: removing nodes afterwards does not change it.
    pub fn query_all<F>(&self, mut predicate: F) -> Vec<NodeId>
    where
        F: FnMut(NodeId, &DomNode) -> bool,
    {
        let Some(root_id) = self.root_id else {
            return Vec::new();
        };

        let mut matches = Vec::new();
        let _ = self.traverse_df(root_id, |id, node| {
            if id != root_id && predicate(id, node) {
                matches.push(id);
            }
            Ok(())
        });
        matches
    }

    /// Find all connected elements by tag name
    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.query_all(|_, node| node.has_tag(tag))
    }

    /// Find connected element by ID attribute
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        let root_id = self.root_id?;
        self.find_descendant(root_id, |_, node| {
            node.is_element() && node.attr("id") == Some(id)
        })
    }

    /// Take the journalled mutations (`MutationObserver.takeRecords`)
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    /// Clear arena (reuse allocation)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.remote_id_map.clear();
        self.root_id = None;
        self.records.clear();
        self.detached_since_reclaim = 0;
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}
