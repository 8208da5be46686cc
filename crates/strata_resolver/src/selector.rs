//! Path selector evaluation over [`XmlDocument`] trees.
//!
//! Diff instructions address their targets with XPath-style selectors. The
//! documents this engine deals with only ever use a narrow slice of XPath, so
//! evaluation is implemented directly over the document model:
//!
//! - absolute child steps (`/a/b`) and descendant steps (`//b`, `a//b`)
//! - name tests with optional namespace prefix, and `*`
//! - a trailing attribute step (`/a/b/@attr`)
//! - predicates: positional (`[2]`) and attribute equality (`[@name='x']`)
//!
//! Evaluation walks contexts in document order, so the first result is always
//! the document-order first match. Anything outside the subset above is a
//! [`SelectorError`]; the patch engine treats that as "skip this instruction",
//! matching the leniency expected of mod-supplied content.

use crate::dom::{NodeId, XmlDocument};
use std::collections::HashMap;
use thiserror::Error;

/// Raised when a selector is malformed or uses unsupported syntax.
#[derive(Error, Debug)]
#[error("unsupported or malformed selector: {0}")]
pub struct SelectorError(String);

/// Prefix -> namespace URI bindings collected from a diff envelope root.
#[derive(Debug, Default)]
pub struct Namespaces(HashMap<String, String>);

impl Namespaces {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn declare(&mut self, prefix: &str, uri: &str) {
        self.0.insert(prefix.to_string(), uri.to_string());
    }

    fn uri(&self, prefix: &str) -> Option<&str> {
        self.0.get(prefix).map(String::as_str)
    }
}

/// What a selector resolved to: an element node or one of its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorTarget {
    Element(NodeId),
    Attribute { element: NodeId, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug)]
enum NameTest {
    Any,
    Name(String),
}

#[derive(Debug)]
enum Predicate {
    Index(usize),
    AttrEquals { name: String, value: String },
}

#[derive(Debug)]
enum StepKind {
    Element(NameTest),
    Attribute(String),
}

#[derive(Debug)]
struct Step {
    axis: Axis,
    kind: StepKind,
    predicates: Vec<Predicate>,
}

/// Evaluate `sel` against `doc` and return the document-order first match.
pub fn select_first(
    doc: &XmlDocument,
    sel: &str,
    ns: &Namespaces,
) -> Result<Option<SelectorTarget>, SelectorError> {
    let steps = parse(sel)?;

    // `None` stands for the document node (the virtual parent of the root).
    let mut contexts: Vec<Option<NodeId>> = vec![None];

    for (i, step) in steps.iter().enumerate() {
        let is_last = i + 1 == steps.len();
        match &step.kind {
            StepKind::Attribute(name) => {
                if !is_last {
                    return Err(SelectorError(format!(
                        "attribute step must be last in {sel:?}"
                    )));
                }
                for ctx in &contexts {
                    let holders = match (ctx, step.axis) {
                        (Some(id), Axis::Child) => vec![*id],
                        (Some(id), Axis::Descendant) => descendant_or_self(doc, *id),
                        (None, _) => descendant_or_self(doc, doc.root()),
                    };
                    for holder in holders {
                        if doc.attribute(holder, name).is_some() {
                            return Ok(Some(SelectorTarget::Attribute {
                                element: holder,
                                name: name.clone(),
                            }));
                        }
                    }
                }
                return Ok(None);
            }
            StepKind::Element(test) => {
                let mut next = Vec::new();
                for ctx in &contexts {
                    let candidates = match (ctx, step.axis) {
                        (None, Axis::Child) => vec![doc.root()],
                        (None, Axis::Descendant) => descendant_or_self(doc, doc.root()),
                        (Some(id), Axis::Child) => doc.child_elements(*id),
                        (Some(id), Axis::Descendant) => descendants(doc, *id),
                    };
                    let mut filtered: Vec<NodeId> = candidates
                        .into_iter()
                        .filter(|&c| name_matches(doc, c, test, ns))
                        .collect();
                    for predicate in &step.predicates {
                        match predicate {
                            Predicate::Index(n) => {
                                filtered = match filtered.get(n - 1) {
                                    Some(&keep) => vec![keep],
                                    None => Vec::new(),
                                };
                            }
                            Predicate::AttrEquals { name, value } => {
                                filtered.retain(|&c| doc.attribute(c, name) == Some(value));
                            }
                        }
                    }
                    next.extend(filtered);
                }
                if next.is_empty() {
                    return Ok(None);
                }
                contexts = next.into_iter().map(Some).collect();
            }
        }
    }

    Ok(contexts
        .into_iter()
        .flatten()
        .next()
        .map(SelectorTarget::Element))
}

fn descendants(doc: &XmlDocument, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    collect_descendants(doc, id, &mut out);
    out
}

fn descendant_or_self(doc: &XmlDocument, id: NodeId) -> Vec<NodeId> {
    let mut out = vec![id];
    collect_descendants(doc, id, &mut out);
    out
}

fn collect_descendants(doc: &XmlDocument, id: NodeId, out: &mut Vec<NodeId>) {
    for &child in doc.children(id) {
        if doc.element(child).is_some() {
            out.push(child);
            collect_descendants(doc, child, out);
        }
    }
}

fn name_matches(doc: &XmlDocument, id: NodeId, test: &NameTest, ns: &Namespaces) -> bool {
    let NameTest::Name(wanted) = test else {
        return true;
    };
    let actual = doc.name(id);
    if wanted == actual {
        return true;
    }

    let (wanted_prefix, wanted_local) = split_qname(wanted);
    let (actual_prefix, actual_local) = split_qname(actual);
    if wanted_local != actual_local {
        return false;
    }
    match wanted_prefix {
        // Unprefixed vs unprefixed was the literal compare above.
        None => false,
        Some(prefix) => {
            let Some(wanted_uri) = ns.uri(prefix) else {
                return false;
            };
            in_scope_uri(doc, id, actual_prefix) == Some(wanted_uri)
        }
    }
}

fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Resolve an element's namespace prefix (or default namespace) by walking
/// the `xmlns` declarations on the element and its ancestors.
fn in_scope_uri<'a>(doc: &'a XmlDocument, id: NodeId, prefix: Option<&str>) -> Option<&'a str> {
    let attr_name = match prefix {
        Some(p) => format!("xmlns:{p}"),
        None => "xmlns".to_string(),
    };
    let mut current = Some(id);
    while let Some(node) = current {
        if let Some(uri) = doc.attribute(node, &attr_name) {
            return Some(uri);
        }
        current = doc.parent(node);
    }
    None
}

fn parse(sel: &str) -> Result<Vec<Step>, SelectorError> {
    let malformed = || SelectorError(sel.to_string());
    let mut rest = sel.trim();
    if rest.is_empty() {
        return Err(malformed());
    }

    let mut axis = Axis::Child;
    if let Some(r) = rest.strip_prefix("//") {
        axis = Axis::Descendant;
        rest = r;
    } else if let Some(r) = rest.strip_prefix('/') {
        rest = r;
    }

    // Split on '/' outside brackets and quotes.
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut chars = rest.chars().peekable();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '[' => {
                    depth += 1;
                    current.push(c);
                }
                ']' => {
                    depth = depth.checked_sub(1).ok_or_else(malformed)?;
                    current.push(c);
                }
                '/' if depth == 0 => {
                    steps.push(parse_step(axis, &current, &malformed)?);
                    current.clear();
                    axis = if chars.peek() == Some(&'/') {
                        chars.next();
                        Axis::Descendant
                    } else {
                        Axis::Child
                    };
                }
                _ => current.push(c),
            },
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(malformed());
    }
    steps.push(parse_step(axis, &current, &malformed)?);
    Ok(steps)
}

fn parse_step(
    axis: Axis,
    text: &str,
    malformed: &impl Fn() -> SelectorError,
) -> Result<Step, SelectorError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(malformed());
    }

    if let Some(attr) = text.strip_prefix('@') {
        if attr.is_empty() || attr.contains('[') {
            return Err(malformed());
        }
        return Ok(Step {
            axis,
            kind: StepKind::Attribute(attr.to_string()),
            predicates: Vec::new(),
        });
    }

    let (name_part, mut preds_part) = match text.find('[') {
        Some(i) => (text[..i].trim(), &text[i..]),
        None => (text, ""),
    };
    if name_part.is_empty() || name_part.contains(|c: char| c.is_whitespace()) {
        return Err(malformed());
    }
    let test = if name_part == "*" {
        NameTest::Any
    } else {
        NameTest::Name(name_part.to_string())
    };

    let mut predicates = Vec::new();
    while !preds_part.is_empty() {
        let inner = preds_part.strip_prefix('[').ok_or_else(malformed)?;
        let close = find_close(inner).ok_or_else(malformed)?;
        predicates.push(parse_predicate(&inner[..close], malformed)?);
        preds_part = inner[close + 1..].trim_start();
    }

    Ok(Step {
        axis,
        kind: StepKind::Element(test),
        predicates,
    })
}

fn find_close(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                ']' => return Some(i),
                _ => {}
            },
        }
    }
    None
}

fn parse_predicate(
    inner: &str,
    malformed: &impl Fn() -> SelectorError,
) -> Result<Predicate, SelectorError> {
    let inner = inner.trim();
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = inner.parse().map_err(|_| malformed())?;
        if n == 0 {
            return Err(malformed());
        }
        return Ok(Predicate::Index(n));
    }
    let body = inner.strip_prefix('@').ok_or_else(malformed)?;
    let (name, value) = body.split_once('=').ok_or_else(malformed)?;
    let name = name.trim();
    let value = value.trim();
    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(malformed)?;
    if name.is_empty() {
        return Err(malformed());
    }
    Ok(Predicate::AttrEquals {
        name: name.to_string(),
        value: unquoted.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> XmlDocument {
        XmlDocument::parse(
            r#"<r><ship name="argo" class="m"><part id="p1"/><part id="p2"/></ship><ship name="bolt" class="s"/></r>"#,
        )
        .unwrap()
    }

    fn element_name(doc: &XmlDocument, target: Option<SelectorTarget>) -> String {
        match target.unwrap() {
            SelectorTarget::Element(id) => {
                let mut s = doc.name(id).to_string();
                if let Some(n) = doc.attribute(id, "name").or(doc.attribute(id, "id")) {
                    s.push(':');
                    s.push_str(n);
                }
                s
            }
            SelectorTarget::Attribute { name, .. } => format!("@{name}"),
        }
    }

    #[test]
    fn test_child_steps_first_match() {
        let d = doc();
        let ns = Namespaces::new();
        let t = select_first(&d, "/r/ship", &ns).unwrap();
        assert_eq!(element_name(&d, t), "ship:argo");
    }

    #[test]
    fn test_attr_predicate() {
        let d = doc();
        let ns = Namespaces::new();
        let t = select_first(&d, "/r/ship[@name='bolt']", &ns).unwrap();
        assert_eq!(element_name(&d, t), "ship:bolt");
    }

    #[test]
    fn test_index_predicate() {
        let d = doc();
        let ns = Namespaces::new();
        let t = select_first(&d, "/r/ship[1]/part[2]", &ns).unwrap();
        assert_eq!(element_name(&d, t), "part:p2");
        assert!(select_first(&d, "/r/ship[5]", &ns).unwrap().is_none());
    }

    #[test]
    fn test_descendant_axis() {
        let d = doc();
        let ns = Namespaces::new();
        let t = select_first(&d, "//part", &ns).unwrap();
        assert_eq!(element_name(&d, t), "part:p1");
        let t = select_first(&d, "/r//part[@id='p2']", &ns).unwrap();
        assert_eq!(element_name(&d, t), "part:p2");
    }

    #[test]
    fn test_wildcard() {
        let d = doc();
        let ns = Namespaces::new();
        let t = select_first(&d, "/r/*[@class='s']", &ns).unwrap();
        assert_eq!(element_name(&d, t), "ship:bolt");
    }

    #[test]
    fn test_attribute_target() {
        let d = doc();
        let ns = Namespaces::new();
        let t = select_first(&d, "/r/ship/@class", &ns).unwrap();
        assert!(matches!(
            t,
            Some(SelectorTarget::Attribute { ref name, .. }) if name == "class"
        ));
    }

    #[test]
    fn test_no_match_is_none() {
        let d = doc();
        let ns = Namespaces::new();
        assert!(select_first(&d, "/r/station", &ns).unwrap().is_none());
        assert!(select_first(&d, "/r/ship/@missing", &ns).unwrap().is_none());
    }

    #[test]
    fn test_malformed_selectors_error() {
        let d = doc();
        let ns = Namespaces::new();
        for sel in ["", "/", "/r/ship[", "/r/ship[@a=b]", "/r/@a/ship", "/r/ship[0]"] {
            assert!(select_first(&d, sel, &ns).is_err(), "selector {sel:?}");
        }
    }

    #[test]
    fn test_namespace_prefix_resolution() {
        let d = XmlDocument::parse(r#"<w:r xmlns:w="urn:w"><w:x k="1"/></w:r>"#).unwrap();
        let mut ns = Namespaces::new();
        ns.declare("f", "urn:w");
        let t = select_first(&d, "/f:r/f:x", &ns).unwrap();
        assert!(matches!(t, Some(SelectorTarget::Element(_))));
        // Unknown prefix in the selector fails to match rather than erroring.
        let mut other = Namespaces::new();
        other.declare("f", "urn:other");
        assert!(select_first(&d, "/f:r", &other).unwrap().is_none());
    }

    #[test]
    fn test_default_namespace_resolution() {
        let d = XmlDocument::parse(r#"<r xmlns="urn:w"><x/></r>"#).unwrap();
        let mut ns = Namespaces::new();
        ns.declare("f", "urn:w");
        let t = select_first(&d, "/f:r/f:x", &ns).unwrap();
        assert!(matches!(t, Some(SelectorTarget::Element(_))));
    }
}
