//! Ad selector - typed match rules
//!
//! Each rule is a tag name plus two predicates:
//! - `candidate`: what the CSS selector would say (`tag.class`, `tag[attr]`).
//!   Drives both the sweep query and the mutation classifier.
//! - `confirm`: extra containment / id check run on each candidate before
//!   it is removed.
//!
//! Rules are evaluated against the arena, never against selector strings.

use dom::{DomArena, DomNode, NodeId};
use serde::{Deserialize, Serialize};

/// Standalone comment-page ad container
pub const STANDALONE_AD_TAG: &str = "shreddit-comments-page-ad";
/// Ad slot placeholder inside the comment tree
pub const TREE_PLACEHOLDER_TAG: &str = "shreddit-comment-tree-ad";
/// Holder of ad `<template>`s the page instantiates later
pub const TEMPLATE_CONTAINER_TAG: &str = "shreddit-comment-tree-ads";
/// Promoted post in the feed
pub const PROMOTED_POST_TAG: &str = "shreddit-ad-post";

pub const PROMOTED_CLASS: &str = "promotedlink";
pub const PROMOTED_ATTRIBUTE: &str = "promoted";
pub const AD_SLOT_ID_PREFIX: &str = "comment-tree-ad_";
pub const SEPARATOR_TAG: &str = "hr";

/// Rule category; also the order categories are swept in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdCategory {
    StandaloneAd,
    TreePlaceholder,
    TemplateContainer,
    PromotedPost,
}

/// Structural predicate over one element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementPredicate {
    Any,
    /// Class list contains the token
    Class(String),
    /// Attribute present, any value
    Attribute(String),
    /// `id` starts with the prefix
    IdPrefix(String),
    /// Some descendant has `tag` and satisfies `predicate`
    Contains {
        tag: String,
        predicate: Box<ElementPredicate>,
    },
    AnyOf(Vec<ElementPredicate>),
}

impl ElementPredicate {
    pub fn matches(&self, arena: &DomArena, node_id: NodeId, node: &DomNode) -> bool {
        match self {
            ElementPredicate::Any => true,
            ElementPredicate::Class(class) => node.has_class(class),
            ElementPredicate::Attribute(name) => node.has_attr(name),
            ElementPredicate::IdPrefix(prefix) => {
                node.id().map(|id| id.starts_with(prefix.as_str())).unwrap_or(false)
            }
            ElementPredicate::Contains { tag, predicate } => arena
                .find_descendant(node_id, |id, inner| {
                    inner.has_tag(tag) && predicate.matches(arena, id, inner)
                })
                .is_some(),
            ElementPredicate::AnyOf(predicates) => predicates
                .iter()
                .any(|predicate| predicate.matches(arena, node_id, node)),
        }
    }
}

fn any_predicate() -> ElementPredicate {
    ElementPredicate::Any
}

/// One detection rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdRule {
    pub category: AdCategory,
    pub tag: String,
    #[serde(default = "any_predicate")]
    pub candidate: ElementPredicate,
    #[serde(default = "any_predicate")]
    pub confirm: ElementPredicate,
    /// Remove this immediately preceding element sibling along with the match
    #[serde(default)]
    pub preceding_separator: Option<String>,
}

impl AdRule {
    pub fn new(category: AdCategory, tag: impl Into<String>, candidate: ElementPredicate) -> Self {
        Self {
            category,
            tag: tag.into(),
            candidate,
            confirm: ElementPredicate::Any,
            preceding_separator: None,
        }
    }

    pub fn confirmed_by(mut self, confirm: ElementPredicate) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_separator(mut self, tag: impl Into<String>) -> Self {
        self.preceding_separator = Some(tag.into());
        self
    }

    /// Selector match: tag plus candidate predicate
    pub fn is_candidate(&self, arena: &DomArena, node_id: NodeId, node: &DomNode) -> bool {
        node.has_tag(&self.tag) && self.candidate.matches(arena, node_id, node)
    }

    /// Sweep-time confirmation of a candidate
    pub fn confirms(&self, arena: &DomArena, node_id: NodeId) -> bool {
        arena
            .get(node_id)
            .map(|node| self.confirm.matches(arena, node_id, node))
            .unwrap_or(false)
    }
}

/// When does a comment-tree placeholder count as an ad slot?
///
/// Both rules exist in the wild, so the choice is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderPolicy {
    /// Contains any standalone-ad element, or has an ad-slot id
    #[default]
    NestedAdOrSlotId,
    /// Contains a promoted standalone-ad element, has an ad-slot id, or is
    /// itself marked promoted
    NestedPromotedOrSelfPromoted,
}

impl PlaceholderPolicy {
    fn confirm_predicate(self) -> ElementPredicate {
        let slot_id = ElementPredicate::IdPrefix(AD_SLOT_ID_PREFIX.to_string());
        match self {
            PlaceholderPolicy::NestedAdOrSlotId => ElementPredicate::AnyOf(vec![
                ElementPredicate::Contains {
                    tag: STANDALONE_AD_TAG.to_string(),
                    predicate: Box::new(ElementPredicate::Any),
                },
                slot_id,
            ]),
            PlaceholderPolicy::NestedPromotedOrSelfPromoted => ElementPredicate::AnyOf(vec![
                ElementPredicate::Contains {
                    tag: STANDALONE_AD_TAG.to_string(),
                    predicate: Box::new(ElementPredicate::Class(PROMOTED_CLASS.to_string())),
                },
                slot_id,
                ElementPredicate::Class(PROMOTED_CLASS.to_string()),
            ]),
        }
    }
}

/// Immutable, ordered rule set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<AdRule>", into = "Vec<AdRule>")]
pub struct AdSelector {
    rules: Vec<AdRule>,
}

impl AdSelector {
    /// Rules are kept in category order; ties keep their given order
    pub fn new(mut rules: Vec<AdRule>) -> Self {
        rules.sort_by_key(|rule| rule.category);
        Self { rules }
    }

    /// The comment / feed ad rules
    pub fn reddit(policy: PlaceholderPolicy) -> Self {
        let promoted = ElementPredicate::Class(PROMOTED_CLASS.to_string());

        Self::new(vec![
            AdRule::new(AdCategory::StandaloneAd, STANDALONE_AD_TAG, promoted.clone()),
            AdRule::new(
                AdCategory::TreePlaceholder,
                TREE_PLACEHOLDER_TAG,
                ElementPredicate::Any,
            )
            .confirmed_by(policy.confirm_predicate()),
            AdRule::new(
                AdCategory::TemplateContainer,
                TEMPLATE_CONTAINER_TAG,
                ElementPredicate::Any,
            ),
            AdRule::new(
                AdCategory::PromotedPost,
                PROMOTED_POST_TAG,
                ElementPredicate::AnyOf(vec![
                    promoted,
                    ElementPredicate::Attribute(PROMOTED_ATTRIBUTE.to_string()),
                ]),
            )
            .with_separator(SEPARATOR_TAG),
        ])
    }

    pub fn rules(&self) -> &[AdRule] {
        &self.rules
    }

    /// `element.matches(adSelectors)`
    pub fn matches(&self, arena: &DomArena, node_id: NodeId) -> bool {
        let Ok(node) = arena.get(node_id) else {
            return false;
        };
        node.is_element()
            && self
                .rules
                .iter()
                .any(|rule| rule.is_candidate(arena, node_id, node))
    }

    /// The element itself or any descendant matches
    pub fn matches_subtree(&self, arena: &DomArena, node_id: NodeId) -> bool {
        self.matches(arena, node_id)
            || arena
                .find_descendant(node_id, |id, _| self.matches(arena, id))
                .is_some()
    }
}

impl Default for AdSelector {
    fn default() -> Self {
        Self::reddit(PlaceholderPolicy::default())
    }
}

impl From<Vec<AdRule>> for AdSelector {
    fn from(rules: Vec<AdRule>) -> Self {
        Self::new(rules)
    }
}

impl From<AdSelector> for Vec<AdRule> {
    fn from(selector: AdSelector) -> Self {
        selector.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attach(arena: &mut DomArena, parent: NodeId, node: DomNode) -> NodeId {
        let id = arena.add_node(node);
        arena.append_child(parent, id).unwrap();
        id
    }

    #[test]
    fn test_rules_in_category_order() {
        let selector = AdSelector::new(vec![
            AdRule::new(AdCategory::PromotedPost, "b", ElementPredicate::Any),
            AdRule::new(AdCategory::StandaloneAd, "a", ElementPredicate::Any),
        ]);
        let order: Vec<_> = selector.rules().iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_candidate_matching() {
        let selector = AdSelector::default();
        let mut arena = DomArena::new();
        let doc = arena.create_document();

        let plain_ad = attach(&mut arena, doc, DomNode::element("SHREDDIT-COMMENTS-PAGE-AD"));
        let promoted_ad = attach(
            &mut arena,
            doc,
            DomNode::element("shreddit-comments-page-ad").with_attr("class", "promotedlink"),
        );
        let post_attr = attach(
            &mut arena,
            doc,
            DomNode::element("shreddit-ad-post").with_attr("promoted", ""),
        );
        let post_plain = attach(&mut arena, doc, DomNode::element("shreddit-ad-post"));
        let placeholder = attach(&mut arena, doc, DomNode::element("shreddit-comment-tree-ad"));

        assert!(!selector.matches(&arena, plain_ad));
        assert!(selector.matches(&arena, promoted_ad));
        assert!(selector.matches(&arena, post_attr));
        assert!(!selector.matches(&arena, post_plain));
        // Placeholders are candidates regardless of confirmation
        assert!(selector.matches(&arena, placeholder));
    }

    #[test]
    fn test_matches_subtree_finds_deep_descendant() {
        let selector = AdSelector::default();
        let mut arena = DomArena::new();
        let wrapper = arena.create_element("div");
        let mid = arena.create_element("section");
        let inner = arena.create_element("div");
        let ad = arena.create_element("shreddit-comment-tree-ads");
        arena.append_child(wrapper, mid).unwrap();
        arena.append_child(mid, inner).unwrap();
        arena.append_child(inner, ad).unwrap();

        let unrelated = arena.create_element("p");

        assert!(!selector.matches(&arena, wrapper));
        assert!(selector.matches_subtree(&arena, wrapper));
        assert!(!selector.matches_subtree(&arena, unrelated));
    }

    fn placeholder_cases(policy: PlaceholderPolicy) -> [bool; 5] {
        let rule = AdSelector::reddit(policy)
            .rules()
            .iter()
            .find(|r| r.category == AdCategory::TreePlaceholder)
            .cloned()
            .unwrap();

        let mut arena = DomArena::new();

        // Nested standalone ad without the promoted class
        let nested_plain = arena.create_element("shreddit-comment-tree-ad");
        let inner = arena.create_element("shreddit-comments-page-ad");
        arena.append_child(nested_plain, inner).unwrap();

        // Nested promoted standalone ad
        let nested_promoted = arena.create_element("shreddit-comment-tree-ad");
        let inner = arena.add_node(
            DomNode::element("shreddit-comments-page-ad").with_attr("class", "promotedlink"),
        );
        arena.append_child(nested_promoted, inner).unwrap();

        let slot_id = arena.add_node(
            DomNode::element("shreddit-comment-tree-ad").with_attr("id", "comment-tree-ad_3"),
        );
        let self_promoted = arena.add_node(
            DomNode::element("shreddit-comment-tree-ad").with_attr("class", "promotedlink"),
        );
        let empty = arena.create_element("shreddit-comment-tree-ad");

        [
            rule.confirms(&arena, nested_plain),
            rule.confirms(&arena, nested_promoted),
            rule.confirms(&arena, slot_id),
            rule.confirms(&arena, self_promoted),
            rule.confirms(&arena, empty),
        ]
    }

    #[test]
    fn test_placeholder_policy_nested_ad_or_slot_id() {
        assert_eq!(
            placeholder_cases(PlaceholderPolicy::NestedAdOrSlotId),
            [true, true, true, false, false]
        );
    }

    #[test]
    fn test_placeholder_policy_self_promoted() {
        assert_eq!(
            placeholder_cases(PlaceholderPolicy::NestedPromotedOrSelfPromoted),
            [false, true, true, true, false]
        );
    }

    #[test]
    fn test_selector_from_json_sorts_by_category() {
        let json = serde_json::json!([
            { "category": "promoted_post", "tag": "x-post", "candidate": { "attribute": "promoted" }, "preceding_separator": "hr" },
            { "category": "standalone_ad", "tag": "x-ad", "candidate": { "class": "sponsored" } }
        ]);

        let selector: AdSelector = serde_json::from_value(json).unwrap();
        assert_eq!(selector.rules()[0].tag, "x-ad");
        assert_eq!(selector.rules()[0].confirm, ElementPredicate::Any);
        assert_eq!(selector.rules()[1].preceding_separator.as_deref(), Some("hr"));
    }
}
