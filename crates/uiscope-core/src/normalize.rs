//! Conversion of raw `uiautomator` XML dumps into [`UiNode`] trees.
//!
//! Normalization happens in two steps:
//!
//! 1. [`parse_document`] turns dump text into a generic [`XmlElement`] tree
//!    (attribute bags plus nested children), failing with [`ParseError`] when
//!    the text is not well-formed XML.
//! 2. [`normalize`] walks the `<hierarchy><node>...</node></hierarchy>`
//!    structure and builds a [`UiNode`] for each `<node>`: recognized
//!    attributes are defaulted, a selector is synthesized, and ids are
//!    assigned from a single pre-order counter starting at `0`.
//!
//! Both steps are pure, so normalizing the same text twice yields identical
//! trees.
//!
//! # Example
//!
//! ```
//! use uiscope_core::normalize::{normalize, parse_document};
//!
//! let xml = r#"<hierarchy rotation="0">
//!   <node class="android.widget.FrameLayout" bounds="[0,0][1080,1920]">
//!     <node class="android.widget.Button" resource-id="com.app:id/ok" bounds="[40,40][200,120]"/>
//!   </node>
//! </hierarchy>"#;
//!
//! let root = normalize(&parse_document(xml).unwrap()).unwrap();
//! assert_eq!(root.id, 0);
//! assert_eq!(root.children[0].selector, r#"android.widget.Button[@resource-id="com.app:id/ok"]"#);
//! ```

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::element::{UiNode, RECOGNIZED_ATTRIBUTES};

/// Name of the wrapper element around a dump.
pub const HIERARCHY_TAG: &str = "hierarchy";

/// Name of every UI element in a dump.
pub const NODE_TAG: &str = "node";

/// Deepest `<node>` nesting [`normalize`] accepts. Real screens stay far
/// below this; anything deeper would exhaust the stack while building the tree.
pub const MAX_NODE_DEPTH: usize = 512;

/// The dump text could not be parsed as XML.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("XML parse error at byte {position}: {message}")]
pub struct ParseError {
    /// Byte offset in the input where parsing stopped.
    pub position: u64,
    pub message: String,
}

/// The document parsed but is not a hierarchy dump.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedHierarchyError {
    /// The document root is not `<hierarchy>`.
    #[error("Invalid XML structure: root element is <{0}>, expected <hierarchy>")]
    MissingHierarchy(String),

    /// `<hierarchy>` has no `<node>` child.
    #[error("Invalid XML structure: <hierarchy> contains no <node>")]
    MissingRootNode,

    /// `<node>` elements are nested deeper than [`MAX_NODE_DEPTH`].
    #[error("Invalid XML structure: <node> nesting exceeds {} levels", MAX_NODE_DEPTH)]
    TooDeep,
}

/// A parsed XML element: name, attributes in document order, and children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

// Unlinks descendants onto a heap stack so dropping a deeply nested
// document does not recurse.
impl Drop for XmlElement {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut element) = pending.pop() {
            pending.append(&mut element.children);
        }
    }
}

impl XmlElement {
    /// Child elements with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parses XML text into an [`XmlElement`] tree rooted at the document element.
///
/// Text content, comments and processing instructions are discarded; only
/// elements and their attributes are kept.
///
/// # Errors
///
/// Returns [`ParseError`] for malformed markup, mismatched or unclosed tags,
/// invalid attributes, multiple root elements, or a document without any
/// element.
pub fn parse_document(xml: &str) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| ParseError {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;
        let position = reader.buffer_position() as u64;

        match event {
            Event::Start(ref e) => stack.push(element_from(e, position)?),
            Event::Empty(ref e) => {
                let element = element_from(e, position)?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| ParseError {
                    position,
                    message: "unexpected closing tag".to_string(),
                })?;
                attach(&mut stack, &mut root, element, position)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError {
            position: reader.buffer_position() as u64,
            message: format!("unexpected end of document inside <{}>", open.name),
        });
    }

    root.ok_or_else(|| ParseError {
        position: 0,
        message: "document contains no elements".to_string(),
    })
}

fn element_from(start: &BytesStart<'_>, position: u64) -> Result<XmlElement, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError {
            position,
            message: format!("attribute error in <{}>: {}", name, e),
        })?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| ParseError {
            position,
            message: format!("invalid value for attribute {:?}: {}", key, e),
        })?;
        attributes.push((key, value.into_owned()));
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    position: u64,
) -> Result<(), ParseError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(ParseError {
            position,
            message: format!("multiple root elements (found <{}>)", element.name),
        });
    }
    *root = Some(element);
    Ok(())
}

/// Converts a parsed dump into a normalized tree rooted at its top `<node>`.
///
/// Only the first `<node>` under `<hierarchy>` is converted; within it every
/// nested `<node>` becomes a child in document order.
///
/// # Errors
///
/// Returns [`MalformedHierarchyError`] if the document is not rooted at
/// `<hierarchy>`, has no top `<node>`, or nests nodes deeper than
/// [`MAX_NODE_DEPTH`].
pub fn normalize(document: &XmlElement) -> Result<UiNode, MalformedHierarchyError> {
    if document.name != HIERARCHY_TAG {
        return Err(MalformedHierarchyError::MissingHierarchy(
            document.name.clone(),
        ));
    }
    let top = document
        .children_named(NODE_TAG)
        .next()
        .ok_or(MalformedHierarchyError::MissingRootNode)?;
    if exceeds_depth(top, MAX_NODE_DEPTH) {
        return Err(MalformedHierarchyError::TooDeep);
    }

    let mut ids = IdAllocator::default();
    Ok(normalize_node(top, &mut ids))
}

/// Hands out ids in pre-order so every node in one tree gets a distinct id,
/// whatever the fan-out or depth.
#[derive(Debug, Default)]
struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Whether `<node>` nesting below `top` (counted as depth 1) goes past `limit`.
fn exceeds_depth(top: &XmlElement, limit: usize) -> bool {
    let mut pending = vec![(top, 1)];
    while let Some((element, depth)) = pending.pop() {
        if depth > limit {
            return true;
        }
        pending.extend(element.children_named(NODE_TAG).map(|child| (child, depth + 1)));
    }
    false
}

fn normalize_node(element: &XmlElement, ids: &mut IdAllocator) -> UiNode {
    let id = ids.next();
    let attributes = with_defaults(element.attributes.iter().cloned());
    let children = element
        .children_named(NODE_TAG)
        .map(|child| normalize_node(child, ids))
        .collect();
    build_node(id, attributes, children)
}

/// Copies `source` and fills in every recognized key that is absent or empty.
pub fn with_defaults<K, V>(source: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    let mut attributes: BTreeMap<String, String> = source
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();

    for (key, default) in RECOGNIZED_ATTRIBUTES {
        let value = attributes.entry(key.to_string()).or_default();
        if value.is_empty() {
            *value = default.to_string();
        }
    }
    attributes
}

/// Builds a selector from class, the first non-empty of resource-id / text /
/// content-desc, and the sibling index when it is not `"0"`.
pub fn synthesize_selector(attributes: &BTreeMap<String, String>) -> String {
    let get = |key: &str| attributes.get(key).map(String::as_str).unwrap_or("");

    let mut selector = get("class").to_string();
    let qualifier = ["resource-id", "text", "content-desc"]
        .into_iter()
        .find(|key| !get(key).is_empty());
    if let Some(key) = qualifier {
        selector.push_str(&format!("[@{}=\"{}\"]", key, get(key)));
    }

    let index = get("index");
    if !index.is_empty() && index != "0" {
        selector.push_str(&format!("[{}]", index));
    }
    selector
}

/// Assembles a [`UiNode`] from already-defaulted attributes.
pub(crate) fn build_node(id: u64, attributes: BTreeMap<String, String>, children: Vec<UiNode>) -> UiNode {
    let get = |key: &str| attributes.get(key).cloned().unwrap_or_default();
    let tag = get("class");
    let bounds = get("bounds");
    let text = get("text");
    let resource_id = get("resource-id");
    let content_desc = get("content-desc");
    let clickable = get("clickable") == "true";
    let selector = synthesize_selector(&attributes);

    UiNode {
        id,
        tag,
        attributes,
        selector,
        bounds,
        text,
        resource_id,
        content_desc,
        clickable,
        children,
    }
}
