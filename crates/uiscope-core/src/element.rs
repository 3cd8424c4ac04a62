//! UI element tree produced from a hierarchy dump.
//!
//! A [`UiNode`] tree is a single immutable snapshot: it is created by one
//! hierarchy fetch, queried any number of times, and discarded when the next
//! fetch replaces it. Node ids are only meaningful within the tree that
//! produced them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bounds::BoundsRect;

/// Full-screen bounds substituted when a node carries none.
pub const DEFAULT_BOUNDS: &str = "[0,0][1080,1920]";

/// Attribute keys every normalized node carries, with the value used when
/// the dump omits the key or leaves it empty.
pub const RECOGNIZED_ATTRIBUTES: [(&str, &str); 18] = [
    ("bounds", DEFAULT_BOUNDS),
    ("class", "node"),
    ("resource-id", ""),
    ("text", ""),
    ("content-desc", ""),
    ("clickable", "false"),
    ("checkable", "false"),
    ("checked", "false"),
    ("enabled", "true"),
    ("focusable", "false"),
    ("focused", "false"),
    ("scrollable", "false"),
    ("long-clickable", "false"),
    ("password", "false"),
    ("selected", "false"),
    ("visible-to-user", "true"),
    ("package", ""),
    ("index", "0"),
];

/// A UI element from a normalized hierarchy dump.
///
/// `bounds`, `text`, `resource_id`, `content_desc` and `clickable` are
/// convenience copies of the matching entries in `attributes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiNode {
    /// Identifier unique within this tree; the root is `0`.
    pub id: u64,

    /// The element's class name (e.g., "android.widget.Button").
    pub tag: String,

    /// Every source attribute plus defaults for the recognized keys.
    pub attributes: BTreeMap<String, String>,

    /// Declarative selector for re-locating the element. Best-effort: list
    /// items sharing the same attributes produce the same selector.
    pub selector: String,

    pub bounds: String,
    pub text: String,
    pub resource_id: String,
    pub content_desc: String,
    pub clickable: bool,

    /// Child elements in document order.
    #[serde(default)]
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// Look up an attribute by its dump key (e.g., `"long-clickable"`).
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns true if a boolean attribute is `"true"`.
    pub fn flag(&self, key: &str) -> bool {
        self.attribute(key) == Some("true")
    }

    /// Parsed bounds, or `None` if the bounds text is malformed.
    pub fn bounds_rect(&self) -> Option<BoundsRect> {
        BoundsRect::parse(&self.bounds)
    }

    /// Depth-first, pre-order iterator over this node and its descendants.
    pub fn iter(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Finds a node by id anywhere in this subtree.
    pub fn find_by_id(&self, id: u64) -> Option<&UiNode> {
        self.iter().find(|node| node.id == id)
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

/// Pre-order traversal returned by [`UiNode::iter`].
pub struct Descendants<'a> {
    stack: Vec<&'a UiNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a UiNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
