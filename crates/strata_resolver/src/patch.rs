//! Merging of same-path XML documents across layers.
//!
//! A higher-priority layer can ship either a *diff envelope* (root element
//! `<diff>`, children `add`/`replace`/`remove` carrying a `sel` selector) or a
//! plain document. Diffs are applied instruction by instruction against the
//! accumulated base tree; plain documents are unioned in by appending their
//! root's children to the base root.
//!
//! The engine is a pure transform over two documents and keeps no state.
//! Faulty instructions are skipped, never fatal: a selector that matches
//! nothing, fails to parse, or an instruction with an unknown tag only costs
//! that one instruction. This mirrors how leniently mod content has to be
//! treated in practice.

use crate::dom::{local_name, NodeId, XmlDocument};
use crate::selector::{self, Namespaces, SelectorTarget};

/// Root element name marking a patch document.
pub const DIFF_ROOT: &str = "diff";

/// Merge `incoming` into `base`, diff-aware.
pub fn merge(base: &mut XmlDocument, incoming: &XmlDocument) {
    let incoming_root = incoming.root();
    if local_name(incoming.name(incoming_root)) == DIFF_ROOT {
        apply_diff(base, incoming);
    } else {
        // Whole-document augmentation: every child of the incoming root is
        // appended under the base root.
        let base_root = base.root();
        for &child in &incoming.children(incoming_root).to_vec() {
            let copied = base.import_from(incoming, child);
            base.append_child(base_root, copied);
        }
    }
}

fn apply_diff(base: &mut XmlDocument, diff: &XmlDocument) {
    let ns = collect_namespaces(diff);

    for instruction in diff.child_elements(diff.root()) {
        let Some(sel) = diff.attribute(instruction, "sel") else {
            tracing::debug!("diff instruction without sel attribute, skipping");
            continue;
        };
        let target = match selector::select_first(base, sel, &ns) {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::debug!("selector {:?} matched nothing, skipping instruction", sel);
                continue;
            }
            Err(err) => {
                tracing::debug!("skipping instruction: {}", err);
                continue;
            }
        };

        match local_name(diff.name(instruction)) {
            "add" => apply_add(base, diff, instruction, target),
            "replace" => apply_replace(base, diff, instruction, target),
            "remove" => apply_remove(base, target),
            other => {
                tracing::debug!("ignoring unknown diff instruction {:?}", other);
            }
        }
    }
}

/// Namespace declarations on the diff root, both `xmlns:p="uri"` and bare
/// `p="uri"` forms, used for selector evaluation.
fn collect_namespaces(diff: &XmlDocument) -> Namespaces {
    let mut ns = Namespaces::new();
    if let Some(root) = diff.element(diff.root()) {
        for (key, value) in &root.attributes {
            if let Some(prefix) = key.strip_prefix("xmlns:") {
                ns.declare(prefix, value);
            } else if key != "xmlns" {
                ns.declare(key, value);
            }
        }
    }
    ns
}

fn apply_add(
    base: &mut XmlDocument,
    diff: &XmlDocument,
    instruction: NodeId,
    target: SelectorTarget,
) {
    match diff.attribute(instruction, "type") {
        None => {
            let SelectorTarget::Element(element) = target else {
                tracing::debug!("add with node content needs an element target, skipping");
                return;
            };
            let payload: Vec<NodeId> = diff
                .children(instruction)
                .to_vec()
                .iter()
                .map(|&child| base.import_from(diff, child))
                .collect();
            match diff.attribute(instruction, "pos") {
                Some("before") => insert_siblings(base, element, 0, &payload),
                Some("after") => insert_siblings(base, element, 1, &payload),
                _ => {
                    for node in payload {
                        base.append_child(element, node);
                    }
                }
            }
        }
        Some(type_attr) if type_attr.starts_with('@') => {
            let SelectorTarget::Element(element) = target else {
                return;
            };
            let value = diff.text_content(instruction);
            base.set_attribute(element, &type_attr[1..], &value);
        }
        Some(type_attr) if type_attr.starts_with("xmlns") => {
            let SelectorTarget::Element(element) = target else {
                return;
            };
            let value = diff.text_content(instruction);
            base.set_attribute(element, type_attr, &value);
        }
        Some(other) => {
            tracing::debug!("unsupported add type {:?}, skipping", other);
        }
    }
}

fn insert_siblings(base: &mut XmlDocument, anchor: NodeId, offset: usize, payload: &[NodeId]) {
    let Some((parent, idx)) = base.position_in_parent(anchor) else {
        tracing::debug!("cannot insert siblings at the document root, skipping");
        return;
    };
    for (n, &node) in payload.iter().enumerate() {
        base.insert_child(parent, idx + offset + n, node);
    }
}

fn apply_replace(
    base: &mut XmlDocument,
    diff: &XmlDocument,
    instruction: NodeId,
    target: SelectorTarget,
) {
    match target {
        SelectorTarget::Attribute { element, name } => {
            let value = diff.text_content(instruction);
            base.set_attribute(element, &name, &value);
        }
        SelectorTarget::Element(element) => {
            let payload: Vec<NodeId> = diff
                .children(instruction)
                .to_vec()
                .iter()
                .map(|&child| base.import_from(diff, child))
                .collect();
            if base.parent(element).is_some() {
                base.replace_with(element, &payload);
            } else {
                // Replacing the root: re-point the document at the first
                // element in the payload.
                match payload.iter().find(|&&p| base.element(p).is_some()) {
                    Some(&new_root) => base.set_root(new_root),
                    None => tracing::debug!("replace of root without element payload, skipping"),
                }
            }
        }
    }
}

fn apply_remove(base: &mut XmlDocument, target: SelectorTarget) {
    match target {
        SelectorTarget::Attribute { element, name } => {
            base.remove_attribute(element, &name);
        }
        SelectorTarget::Element(element) => {
            if base.parent(element).is_some() {
                base.detach(element);
            } else {
                tracing::debug!("refusing to remove the document root, skipping");
            }
        }
    }
}
