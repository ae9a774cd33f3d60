//! The sweep pass
//!
//! One synchronous walk per rule category: collect candidates in document
//! order, then confirm and detach each one that is still connected.
//! Deletion only; nothing is ever created or moved.

use dom::{utils, DomArena, NodeId, RemoteId};
use serde::{Deserialize, Serialize};

use crate::selector::{AdCategory, AdRule, AdSelector};

/// One element detached by a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedElement {
    /// Valid until the page next reclaims detached nodes
    pub node_id: NodeId,
    /// Browser-side id, if the node mirrors a remote page
    pub remote_id: Option<RemoteId>,
    pub category: AdCategory,
    pub label: String,
}

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResult {
    pub removed: Vec<RemovedElement>,
}

impl SweepResult {
    /// Number of elements removed (separators included)
    pub fn count(&self) -> usize {
        self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Run one sweep of `selector` over `arena`
pub fn sweep_document(selector: &AdSelector, arena: &mut DomArena) -> SweepResult {
    let mut result = SweepResult::default();

    for rule in selector.rules() {
        // Snapshot first: the walk must not see its own deletions
        let candidates = {
            let doc: &DomArena = arena;
            doc.query_all(|id, node| rule.is_candidate(doc, id, node))
        };

        for node_id in candidates {
            // Gone already: removed with an ancestor earlier in this pass
            if !arena.is_connected(node_id) {
                continue;
            }
            if !rule.confirms(arena, node_id) {
                continue;
            }

            if let Some(separator) = preceding_separator(arena, rule, node_id) {
                detach(arena, separator, rule.category, &mut result);
            }
            detach(arena, node_id, rule.category, &mut result);
        }
    }

    result
}

fn preceding_separator(arena: &DomArena, rule: &AdRule, node_id: NodeId) -> Option<NodeId> {
    let tag = rule.preceding_separator.as_deref()?;
    let previous = arena.previous_element_sibling(node_id)?;
    arena
        .get(previous)
        .ok()
        .filter(|node| node.has_tag(tag))
        .map(|_| previous)
}

fn detach(arena: &mut DomArena, node_id: NodeId, category: AdCategory, result: &mut SweepResult) {
    match arena.remove(node_id) {
        Ok(true) => {
            let Ok(node) = arena.get(node_id) else {
                return;
            };
            let label = utils::element_label(node);
            tracing::debug!("[AdSweeper] Removing {:?}: {}", category, label);

            result.removed.push(RemovedElement {
                node_id,
                remote_id: node.remote_id,
                category,
                label,
            });
        }
        Ok(false) => {}
        Err(e) => tracing::warn!("[AdSweeper] Failed to remove node {}: {}", node_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::PlaceholderPolicy;
    use dom::{DomNode, DomSerializer};

    fn page() -> (DomArena, NodeId) {
        let mut arena = DomArena::new();
        let doc = arena.create_document();
        let body = arena.create_element("BODY");
        arena.append_child(doc, body).unwrap();
        (arena, body)
    }

    fn attach(arena: &mut DomArena, parent: NodeId, node: DomNode) -> NodeId {
        let id = arena.add_node(node);
        arena.append_child(parent, id).unwrap();
        id
    }

    fn outline(arena: &DomArena) -> String {
        DomSerializer::new().serialize(arena).unwrap()
    }

    #[test]
    fn test_no_matches_leaves_tree_unchanged() {
        let (mut arena, body) = page();
        let article = attach(&mut arena, body, DomNode::element("article").with_attr("id", "t3_1"));
        attach(&mut arena, article, DomNode::element("shreddit-ad-post"));
        attach(&mut arena, body, DomNode::element("shreddit-comments-page-ad"));
        let before = outline(&arena);
        arena.take_records();

        let result = sweep_document(&AdSelector::default(), &mut arena);

        assert_eq!(result.count(), 0);
        assert_eq!(outline(&arena), before);
        assert!(arena.take_records().is_empty());
    }

    #[test]
    fn test_standalone_ad_removed() {
        let (mut arena, body) = page();
        attach(&mut arena, body, DomNode::element("p"));
        let ad = attach(
            &mut arena,
            body,
            DomNode::element("shreddit-comments-page-ad")
                .with_attr("class", "promotedlink")
                .with_attr("id", "ad-1"),
        );

        let result = sweep_document(&AdSelector::default(), &mut arena);

        assert_eq!(result.count(), 1);
        assert_eq!(result.removed[0].node_id, ad);
        assert_eq!(result.removed[0].category, AdCategory::StandaloneAd);
        assert_eq!(result.removed[0].label, "ad-1");
        assert_eq!(outline(&arena), "<body><p></p></body>");
    }

    #[test]
    fn test_placeholder_removed_as_one_unit() {
        let (mut arena, body) = page();
        let placeholder = attach(&mut arena, body, DomNode::element("shreddit-comment-tree-ad"));
        let nested = attach(&mut arena, placeholder, DomNode::element("shreddit-comments-page-ad"));

        let result = sweep_document(&AdSelector::default(), &mut arena);

        assert_eq!(result.count(), 1);
        assert_eq!(result.removed[0].node_id, placeholder);
        assert!(!arena.is_connected(nested));
        assert_eq!(outline(&arena), "<body></body>");
    }

    #[test]
    fn test_nested_match_inside_removed_subtree_not_counted() {
        let (mut arena, body) = page();
        let container = attach(&mut arena, body, DomNode::element("shreddit-comment-tree-ads"));
        let inner = attach(&mut arena, container, DomNode::element("shreddit-comment-tree-ads"));

        let result = sweep_document(&AdSelector::default(), &mut arena);

        assert_eq!(result.count(), 1);
        assert_eq!(result.removed[0].node_id, container);
        assert!(!arena.is_connected(inner));
    }

    #[test]
    fn test_unconfirmed_placeholder_kept() {
        let (mut arena, body) = page();
        attach(
            &mut arena,
            body,
            DomNode::element("shreddit-comment-tree-ad").with_attr("class", "promotedlink"),
        );

        assert_eq!(sweep_document(&AdSelector::default(), &mut arena).count(), 0);

        let self_promoted = AdSelector::reddit(PlaceholderPolicy::NestedPromotedOrSelfPromoted);
        assert_eq!(sweep_document(&self_promoted, &mut arena).count(), 1);
    }

    #[test]
    fn test_promoted_post_takes_separator() {
        let (mut arena, body) = page();
        attach(&mut arena, body, DomNode::element("article"));
        let hr = attach(&mut arena, body, DomNode::element("HR"));
        let post = attach(&mut arena, body, DomNode::element("shreddit-ad-post").with_attr("promoted", ""));
        attach(&mut arena, body, DomNode::element("article"));

        let result = sweep_document(&AdSelector::default(), &mut arena);

        assert_eq!(result.count(), 2);
        // Separator goes first
        assert_eq!(result.removed[0].node_id, hr);
        assert_eq!(result.removed[1].node_id, post);
        assert_eq!(outline(&arena), "<body><article></article><article></article></body>");
    }

    #[test]
    fn test_promoted_post_without_separator() {
        let (mut arena, body) = page();
        attach(&mut arena, body, DomNode::element("article"));
        attach(
            &mut arena,
            body,
            DomNode::element("shreddit-ad-post").with_attr("class", "promotedlink"),
        );

        let result = sweep_document(&AdSelector::default(), &mut arena);
        assert_eq!(result.count(), 1);
        assert_eq!(outline(&arena), "<body><article></article></body>");
    }

    #[test]
    fn test_categories_swept_in_order() {
        let (mut arena, body) = page();
        let post = attach(&mut arena, body, DomNode::element("shreddit-ad-post").with_attr("promoted", ""));
        let templates = attach(&mut arena, body, DomNode::element("shreddit-comment-tree-ads"));
        let ad = attach(
            &mut arena,
            body,
            DomNode::element("shreddit-comments-page-ad").with_attr("class", "promotedlink"),
        );

        let result = sweep_document(&AdSelector::default(), &mut arena);
        let order: Vec<_> = result.removed.iter().map(|r| r.node_id).collect();
        assert_eq!(order, vec![ad, templates, post]);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (mut arena, body) = page();
        attach(&mut arena, body, DomNode::element("shreddit-comment-tree-ads"));
        attach(
            &mut arena,
            body,
            DomNode::element("shreddit-comment-tree-ad").with_attr("id", "comment-tree-ad_7"),
        );

        let selector = AdSelector::default();
        assert_eq!(sweep_document(&selector, &mut arena).count(), 2);
        assert_eq!(sweep_document(&selector, &mut arena).count(), 0);
    }

    #[test]
    fn test_empty_arena() {
        let mut arena = DomArena::new();
        assert!(sweep_document(&AdSelector::default(), &mut arena).is_empty());
    }
}
