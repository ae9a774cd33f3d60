//! Utility functions for DOM processing

use crate::types::DomNode;

/// Cap text length to keep log lines short
pub fn cap_text_length(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    // Never split a UTF-8 sequence
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Check whether a whitespace-separated class attribute contains `class`
pub fn has_class_token(class_attr: &str, class: &str) -> bool {
    class_attr.split_ascii_whitespace().any(|token| token == class)
}

/// Short human label for an element: its id, else its class list, else its tag
pub fn element_label(node: &DomNode) -> String {
    if let Some(id) = node.id() {
        return cap_text_length(id, 80);
    }

    match node.attr("class").map(str::trim) {
        Some(class) if !class.is_empty() => cap_text_length(class, 80),
        _ => node.node_name.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_text_length() {
        assert_eq!(cap_text_length("hello", 10), "hello");
        assert_eq!(cap_text_length("hello world", 5), "hello...");
        assert_eq!(cap_text_length("héllo", 2), "h...");
    }

    #[test]
    fn test_class_tokens() {
        assert!(has_class_token("a promotedlink b", "promotedlink"));
        assert!(!has_class_token("promotedlinks", "promotedlink"));
        assert!(!has_class_token("", "promotedlink"));
    }

    #[test]
    fn test_element_label_prefers_id() {
        let with_id = DomNode::element("div")
            .with_attr("id", "t3_abc")
            .with_attr("class", "promotedlink");
        assert_eq!(element_label(&with_id), "t3_abc");

        let with_class = DomNode::element("div").with_attr("class", " promotedlink ");
        assert_eq!(element_label(&with_class), "promotedlink");

        let bare = DomNode::element("SHREDDIT-COMMENT-TREE-ADS");
        assert_eq!(element_label(&bare), "shreddit-comment-tree-ads");
    }
}
