//! Per-mod manifest metadata and load-order resolution.
//!
//! Every mod directory carries a `content.xml` manifest whose root element
//! declares identity attributes and zero or more `<dependency>` children. The
//! first line of the file is skipped unconditionally before parsing; shipped
//! manifests routinely carry a non-standard header line there.
//!
//! Attributes are exposed verbatim as text with no schema validation; missing
//! attributes read as empty strings. Interpretation (like
//! [`is_enabled`](ModDescriptor::is_enabled)) is layered on top.

use crate::dom::{local_name, XmlDocument};
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use std::collections::HashSet;

/// Manifest file name inside each mod directory.
pub const MANIFEST_FILE: &str = "content.xml";

/// Identity and enablement metadata for one mod, as written in its manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ModDescriptor {
    pub id: String,
    pub name: String,
    pub author: String,
    pub version: String,
    pub date: String,
    /// Raw `enabled` attribute text; see [`is_enabled`](Self::is_enabled).
    pub enabled: String,
    /// Raw `save` attribute text (whether the mod impacts save games).
    pub save: String,
    /// Directory the manifest was loaded from.
    pub dir: Utf8PathBuf,
}

impl ModDescriptor {
    /// Whether the mod participates in layer construction.
    ///
    /// Only an explicit `false`/`0` disables a mod; anything else (including
    /// a missing attribute) counts as enabled.
    pub fn is_enabled(&self) -> bool {
        let value = self.enabled.trim();
        !(value.eq_ignore_ascii_case("false") || value == "0")
    }
}

/// One `<dependency>` declaration from a manifest.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyDeclaration {
    /// Id of the mod depended upon.
    pub id: String,
    /// Optional dependencies order the mod when present but don't have to
    /// exist.
    pub optional: bool,
    /// Display name, informational only.
    pub name: String,
}

/// A parsed manifest: descriptor plus dependency declarations.
#[derive(Debug, Clone)]
pub struct ModManifest {
    pub descriptor: ModDescriptor,
    pub dependencies: Vec<DependencyDeclaration>,
}

impl ModManifest {
    /// Load and parse the manifest inside `mod_dir`.
    pub fn load(mod_dir: &Utf8Path) -> Result<Self> {
        let path = mod_dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(path.as_std_path())?;

        // The first line is always skipped before tree parsing.
        let body = raw.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        let doc = XmlDocument::parse(body).map_err(|err| Error::Manifest {
            path: path.clone(),
            message: err.to_string(),
        })?;

        let root = doc.root();
        let attr = |name: &str| doc.attribute(root, name).unwrap_or("").to_string();
        let descriptor = ModDescriptor {
            id: attr("id"),
            name: attr("name"),
            author: attr("author"),
            version: attr("version"),
            date: attr("date"),
            enabled: attr("enabled"),
            save: attr("save"),
            dir: mod_dir.to_owned(),
        };

        let mut dependencies = Vec::new();
        for child in doc.child_elements(root) {
            if local_name(doc.name(child)) != "dependency" {
                continue;
            }
            let id = doc.attribute(child, "id").unwrap_or("").to_string();
            if id.is_empty() {
                tracing::debug!("dependency without id in {}, discarding", path);
                continue;
            }
            let optional = doc
                .attribute(child, "optional")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);
            dependencies.push(DependencyDeclaration {
                id,
                optional,
                name: doc.attribute(child, "name").unwrap_or("").to_string(),
            });
        }

        Ok(Self {
            descriptor,
            dependencies,
        })
    }
}

/// Order manifests so that every mod comes after its required dependencies.
///
/// The sort is stable: mods whose dependencies don't force an order keep
/// their input (enumeration) order. Optional dependencies order the mod only
/// when the target is present in the set; required dependencies must be
/// present. An unsatisfiable set (missing required dependency or a cycle)
/// fails with [`Error::LoadOrder`] listing every mod that could not be
/// placed.
pub fn sort_load_order(mut manifests: Vec<ModManifest>) -> Result<Vec<ModManifest>> {
    let present: HashSet<String> = manifests
        .iter()
        .map(|m| m.descriptor.id.to_ascii_lowercase())
        .collect();

    let mut placed = Vec::with_capacity(manifests.len());
    let mut placed_ids: HashSet<String> = HashSet::new();

    while !manifests.is_empty() {
        let ready = manifests.iter().position(|m| {
            m.dependencies.iter().all(|dep| {
                let key = dep.id.to_ascii_lowercase();
                if placed_ids.contains(&key) {
                    return true;
                }
                if present.contains(&key) {
                    // Present but not yet placed: wait for it.
                    return false;
                }
                // Absent target: fine when optional, unsatisfiable otherwise.
                dep.optional
            })
        });
        match ready {
            Some(idx) => {
                let manifest = manifests.remove(idx);
                placed_ids.insert(manifest.descriptor.id.to_ascii_lowercase());
                placed.push(manifest);
            }
            None => {
                let unplaced = manifests
                    .iter()
                    .map(|m| m.descriptor.id.clone())
                    .collect::<Vec<_>>();
                return Err(Error::LoadOrder { unplaced });
            }
        }
    }
    Ok(placed)
}
