//! Point-in-bounds queries over a [`UiNode`] tree.

use crate::element::UiNode;

/// Returns the smallest-area node whose bounds contain `(x, y)`.
///
/// Every node is visited: a parent containing the point does not prune its
/// subtree, and a parent not containing it does not either, since children
/// can overflow their parent and siblings can overlap. Edges are inclusive.
/// On equal areas the node met first in pre-order wins. Nodes with malformed
/// bounds are skipped.
///
/// # Example
///
/// ```
/// use uiscope_core::locate::find_element_at;
/// use uiscope_core::normalize::{normalize, parse_document};
///
/// let xml = r#"<hierarchy><node bounds="[0,0][1000,1000]">
///     <node class="inner" bounds="[100,100][200,200]"/>
/// </node></hierarchy>"#;
/// let tree = normalize(&parse_document(xml).unwrap()).unwrap();
///
/// assert_eq!(find_element_at(&tree, 150, 150).unwrap().tag, "inner");
/// assert!(find_element_at(&tree, 1500, 1500).is_none());
/// ```
pub fn find_element_at(root: &UiNode, x: i32, y: i32) -> Option<&UiNode> {
    let mut best: Option<(&UiNode, i64)> = None;

    for node in root.iter() {
        let Some(rect) = node.bounds_rect() else {
            continue;
        };
        if !rect.contains(x, y) {
            continue;
        }
        let area = rect.area();
        if best.map_or(true, |(_, smallest)| area < smallest) {
            best = Some((node, area));
        }
    }

    best.map(|(node, _)| node)
}

/// Returns every node containing `(x, y)`, in pre-order.
///
/// The last entry is not necessarily the one [`find_element_at`] picks, since
/// overlapping siblings can be smaller than a later descendant.
pub fn elements_at(root: &UiNode, x: i32, y: i32) -> Vec<&UiNode> {
    root.iter()
        .filter(|node| node.bounds_rect().is_some_and(|rect| rect.contains(x, y)))
        .collect()
}
