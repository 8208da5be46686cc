//! Owned XML document model backed by quick-xml.
//!
//! The merge/patch engine needs a *mutable* tree: insert siblings at a
//! position, splice replacement nodes, edit attributes in place, and deep-copy
//! subtrees between documents. quick-xml only offers an event stream, so this
//! module builds a small arena-backed document on top of it. Nodes live in a
//! flat `Vec` and are addressed by [`NodeId`]; detached subtrees simply become
//! unreachable (the arena is dropped with the document, so nothing leaks
//! beyond its lifetime).
//!
//! Comments, processing instructions, and the XML declaration are dropped on
//! parse; layer merging only ever looks at elements, attributes, and text.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Index of a node inside its document's arena.
pub type NodeId = usize;

/// Raised when a byte buffer cannot be parsed as XML.
///
/// The underlying quick-xml error is flattened to a message; callers either
/// absorb the failure (layer merging) or wrap it with their own context
/// (manifest loading).
#[derive(Error, Debug)]
#[error("malformed XML: {0}")]
pub struct XmlError(pub(crate) String);

/// One node: an element or a text run.
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(Element),
    Text(String),
}

/// Element data: qualified name as written, attributes in document order
/// (namespace declarations included as plain attributes), and child node ids.
#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

/// An owned, mutable XML document.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
    root: NodeId,
}

impl XmlDocument {
    /// Parse a document from text.
    pub fn parse(text: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(text);
        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            let event = reader.read_event().map_err(|e| XmlError(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    let id = append_element(&mut nodes, &stack, &mut root, &start)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    append_element(&mut nodes, &stack, &mut root, &start)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| XmlError(e.to_string()))?;
                    append_text(&mut nodes, &stack, text.as_ref());
                }
                Event::CData(cdata) => {
                    let raw = cdata.into_inner();
                    append_text(&mut nodes, &stack, &String::from_utf8_lossy(&raw));
                }
                Event::Eof => break,
                // Declarations, comments, PIs, and doctypes are irrelevant to merging.
                _ => {}
            }
        }

        let root = root.ok_or_else(|| XmlError("document has no root element".to_string()))?;
        Ok(Self { nodes, root })
    }

    /// Parse a document from raw bytes (assumed UTF-8, decoded leniently).
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, XmlError> {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    /// Create a document holding a single empty root element.
    pub fn with_root(name: &str) -> Self {
        Self {
            nodes: vec![XmlNode::Element(Element {
                name: name.to_string(),
                attributes: Vec::new(),
                children: Vec::new(),
                parent: None,
            })],
            root: 0,
        }
    }

    /// The document's root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Re-point the document at a new root element (used when a patch
    /// replaces the root wholesale).
    pub fn set_root(&mut self, id: NodeId) {
        if let Some(XmlNode::Element(el)) = self.nodes.get_mut(id) {
            el.parent = None;
        }
        self.root = id;
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id]
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id] {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id] {
            XmlNode::Element(el) => Some(el),
            XmlNode::Text(_) => None,
        }
    }

    /// Qualified name of an element node, or `""` for text.
    pub fn name(&self, id: NodeId) -> &str {
        self.element(id).map(|el| el.name.as_str()).unwrap_or("")
    }

    /// Child node ids of an element (empty for text nodes).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|el| el.children.as_slice()).unwrap_or(&[])
    }

    /// Child *element* ids, in document order.
    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|&c| self.element(c).is_some())
            .collect()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.element(id).and_then(|el| el.parent).or_else(|| match &self.nodes[id] {
            XmlNode::Text(_) => self.find_text_parent(id),
            XmlNode::Element(_) => None,
        })
    }

    // Text nodes don't carry a parent pointer; resolve by scanning. Text
    // parents are only needed on the rare replace-text path.
    fn find_text_parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.iter().enumerate().find_map(|(i, node)| match node {
            XmlNode::Element(el) if el.children.contains(&id) => Some(i),
            _ => None,
        })
    }

    /// Attribute value on an element, if present.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or overwrite) an attribute, preserving attribute order for
    /// existing keys.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            match el.attributes.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value.to_string(),
                None => el.attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Remove an attribute; returns whether it existed.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> bool {
        match self.element_mut(id) {
            Some(el) => {
                let before = el.attributes.len();
                el.attributes.retain(|(k, _)| k != name);
                el.attributes.len() != before
            }
            None => false,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        match &self.nodes[id] {
            XmlNode::Text(t) => t.clone(),
            XmlNode::Element(el) => {
                let mut out = String::new();
                for &child in &el.children {
                    out.push_str(&self.text_content(child));
                }
                out
            }
        }
    }

    /// Position of `id` within its parent's child list.
    pub fn position_in_parent(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let idx = self.children(parent).iter().position(|&c| c == id)?;
        Some((parent, idx))
    }

    /// Deep-copy a node (and subtree) from another document into this arena.
    /// The copy is detached; attach it with [`append_child`](Self::append_child)
    /// or [`insert_child`](Self::insert_child).
    pub fn import_from(&mut self, src: &XmlDocument, src_id: NodeId) -> NodeId {
        match src.node(src_id) {
            XmlNode::Text(t) => self.push_node(XmlNode::Text(t.clone())),
            XmlNode::Element(el) => {
                let id = self.push_node(XmlNode::Element(Element {
                    name: el.name.clone(),
                    attributes: el.attributes.clone(),
                    children: Vec::new(),
                    parent: None,
                }));
                for &child in &el.children {
                    let copied = self.import_from(src, child);
                    self.append_child(id, copied);
                }
                id
            }
        }
    }

    /// Append a detached node as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(el) = self.element_mut(child) {
            el.parent = Some(parent);
        }
        if let Some(el) = self.element_mut(parent) {
            el.children.push(child);
        }
    }

    /// Insert a detached node at `index` within `parent`'s children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let Some(el) = self.element_mut(child) {
            el.parent = Some(parent);
        }
        if let Some(el) = self.element_mut(parent) {
            let index = index.min(el.children.len());
            el.children.insert(index, child);
        }
    }

    /// Detach a node (and its subtree) from its parent.
    pub fn detach(&mut self, id: NodeId) {
        if let Some((parent, idx)) = self.position_in_parent(id) {
            if let Some(el) = self.element_mut(parent) {
                el.children.remove(idx);
            }
            if let Some(el) = self.element_mut(id) {
                el.parent = None;
            }
        }
    }

    /// Replace a node in place with a sequence of detached nodes.
    pub fn replace_with(&mut self, id: NodeId, replacements: &[NodeId]) {
        let Some((parent, idx)) = self.position_in_parent(id) else {
            return;
        };
        self.detach(id);
        for (n, &replacement) in replacements.iter().enumerate() {
            self.insert_child(parent, idx + n, replacement);
        }
    }

    fn push_node(&mut self, node: XmlNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Serialize the document (no XML declaration, no added whitespace).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id] {
            XmlNode::Text(t) => out.push_str(&escape(t.as_str())),
            XmlNode::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (key, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }
                if el.children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &el.children {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(&el.name);
                    out.push('>');
                }
            }
        }
    }
}

/// Local part of a qualified name (`"f:node"` -> `"node"`).
pub fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

fn append_element(
    nodes: &mut Vec<XmlNode>,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    start: &quick_xml::events::BytesStart<'_>,
) -> Result<NodeId, XmlError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    let parent = stack.last().copied();
    let id = nodes.len();
    nodes.push(XmlNode::Element(Element {
        name,
        attributes,
        children: Vec::new(),
        parent,
    }));

    match parent {
        Some(parent_id) => {
            if let XmlNode::Element(el) = &mut nodes[parent_id] {
                el.children.push(id);
            }
        }
        None => {
            if root.is_none() {
                *root = Some(id);
            }
        }
    }
    Ok(id)
}

fn append_text(nodes: &mut Vec<XmlNode>, stack: &[NodeId], text: &str) {
    if text.trim().is_empty() {
        return;
    }
    let Some(&parent) = stack.last() else {
        return;
    };
    let id = nodes.len();
    nodes.push(XmlNode::Text(text.to_string()));
    if let XmlNode::Element(el) = &mut nodes[parent] {
        el.children.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrip() {
        let doc = XmlDocument::parse(r#"<r a="1"><x/>hello</r>"#).unwrap();
        assert_eq!(doc.to_xml(), r#"<r a="1"><x/>hello</r>"#);
    }

    #[test]
    fn test_parse_skips_declaration_and_comments() {
        let doc = XmlDocument::parse("<?xml version=\"1.0\"?><!-- c --><r><x/></r>").unwrap();
        assert_eq!(doc.to_xml(), "<r><x/></r>");
    }

    #[test]
    fn test_parse_no_root_fails() {
        assert!(XmlDocument::parse("  ").is_err());
        assert!(XmlDocument::parse("<a><b></a>").is_err());
    }

    #[test]
    fn test_whitespace_only_text_dropped() {
        let doc = XmlDocument::parse("<r>\n  <x/>\n</r>").unwrap();
        assert_eq!(doc.to_xml(), "<r><x/></r>");
    }

    #[test]
    fn test_attribute_edit() {
        let mut doc = XmlDocument::parse(r#"<r a="1" b="2"/>"#).unwrap();
        let root = doc.root();
        doc.set_attribute(root, "a", "9");
        doc.set_attribute(root, "c", "3");
        assert!(doc.remove_attribute(root, "b"));
        assert!(!doc.remove_attribute(root, "b"));
        assert_eq!(doc.to_xml(), r#"<r a="9" c="3"/>"#);
    }

    #[test]
    fn test_text_content_and_escaping() {
        let doc = XmlDocument::parse("<r><a>one &amp; </a><b>two</b></r>").unwrap();
        assert_eq!(doc.text_content(doc.root()), "one & two");
        assert_eq!(doc.to_xml(), "<r><a>one &amp; </a><b>two</b></r>");
    }

    #[test]
    fn test_import_and_insert() {
        let mut base = XmlDocument::parse("<r><a/><c/></r>").unwrap();
        let other = XmlDocument::parse("<x><b k=\"v\">t</b></x>").unwrap();
        let payload = other.child_elements(other.root())[0];
        let copied = base.import_from(&other, payload);
        base.insert_child(base.root(), 1, copied);
        assert_eq!(base.to_xml(), r#"<r><a/><b k="v">t</b><c/></r>"#);
    }

    #[test]
    fn test_replace_with_and_detach() {
        let mut doc = XmlDocument::parse("<r><a/><b/><c/></r>").unwrap();
        let root = doc.root();
        let b = doc.child_elements(root)[1];
        let n1 = doc.import_from(&XmlDocument::with_root("n1"), 0);
        let n2 = doc.import_from(&XmlDocument::with_root("n2"), 0);
        doc.replace_with(b, &[n1, n2]);
        assert_eq!(doc.to_xml(), "<r><a/><n1/><n2/><c/></r>");

        let a = doc.child_elements(root)[0];
        doc.detach(a);
        assert_eq!(doc.to_xml(), "<r><n1/><n2/><c/></r>");
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("f:node"), "node");
        assert_eq!(local_name("node"), "node");
    }
}
