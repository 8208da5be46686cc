//! Layer orchestration: priority lookups and merged-XML resolution.
//!
//! A [`LayeredAssetResolver`] is scoped to one loaded game installation and
//! is meant to be passed by reference to consumers; there is deliberately no
//! process-wide "current installation". Construction enumerates the
//! installation:
//!
//! 1. the base layer over the installation root (always first, lowest
//!    priority),
//! 2. one layer per *enabled* mod directory under `extensions/`, in
//!    enumeration order refined by the dependency sort.
//!
//! Lookups come in two flavors. First-match (`open_first`) scans layers from
//! highest priority down and returns the winner's bytes. Merge-all
//! (`open_merged_xml`) walks layers lowest-first, parses each contribution,
//! and folds diffs into the accumulated tree via [`crate::patch`].
//!
//! Internal caches (parsed catalogs, layer state) are mutated in place and
//! are not safe for concurrent writers; use one resolver per logical caller
//! or add external synchronization.

use crate::dom::XmlDocument;
use crate::error::{Error, Result};
use crate::layer::{Layer, BASE_LAYER};
use crate::manifest::{sort_load_order, ModDescriptor, ModManifest, MANIFEST_FILE};
use crate::patch;
use camino::Utf8Path;
use std::fmt::Write as _;
use tokio_util::sync::CancellationToken;

/// Directory under the installation root holding mod directories.
pub const EXTENSIONS_DIR: &str = "extensions";

/// Priority-ordered stack of asset layers for one installation.
#[derive(Debug)]
pub struct LayeredAssetResolver {
    /// Index 0 is the base layer; later layers override earlier ones.
    layers: Vec<Layer>,
    /// Descriptors of the enabled mods, in layer order (base excluded).
    mods: Vec<ModDescriptor>,
}

impl LayeredAssetResolver {
    /// Build a resolver for the installation at `root`.
    ///
    /// Mods with a manifest that fails to parse abort construction; mods
    /// whose `enabled` attribute reads false are skipped. An unsatisfiable
    /// dependency set fails with [`Error::LoadOrder`].
    pub fn open(root: &Utf8Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::InvalidRoot(root.to_owned()));
        }

        let mut layers = vec![Layer::new(BASE_LAYER, root)?];

        let mut manifests = Vec::new();
        let extensions = root.join(EXTENSIONS_DIR);
        if extensions.is_dir() {
            for entry in extensions.read_dir_utf8()? {
                let entry = entry?;
                let mod_dir = entry.path();
                if !mod_dir.is_dir() {
                    continue;
                }
                if !mod_dir.join(MANIFEST_FILE).is_file() {
                    tracing::debug!("{} has no manifest, skipping", mod_dir);
                    continue;
                }
                let manifest = ModManifest::load(mod_dir)?;
                if !manifest.descriptor.is_enabled() {
                    tracing::debug!("mod '{}' is disabled, skipping", manifest.descriptor.id);
                    continue;
                }
                manifests.push(manifest);
            }
        }

        let mut mods = Vec::new();
        for manifest in sort_load_order(manifests)? {
            layers.push(Layer::new(
                &manifest.descriptor.id,
                &manifest.descriptor.dir,
            )?);
            mods.push(manifest.descriptor);
        }

        tracing::info!(
            "resolver ready for {}: {} layer(s), {} mod(s)",
            root,
            layers.len(),
            mods.len()
        );
        Ok(Self { layers, mods })
    }

    /// Normalize separators and strip a `extensions/<modId>/` prefix when
    /// `<modId>` names a loaded mod.
    ///
    /// This lets a mod's internal references use root-relative paths
    /// identical to the base game's. Unknown mod ids leave the path
    /// untouched.
    pub fn canonicalize(&self, path: &str) -> String {
        let normalized = path.replace('\\', "/");
        let mut parts = normalized.splitn(3, '/');
        if let (Some(first), Some(mod_id), Some(rest)) = (parts.next(), parts.next(), parts.next())
        {
            if first.eq_ignore_ascii_case(EXTENSIONS_DIR)
                && self.mods.iter().any(|m| m.id.eq_ignore_ascii_case(mod_id))
            {
                return rest.to_string();
            }
        }
        normalized
    }

    /// Raw bytes of the highest-priority layer holding `path`.
    pub fn open_first(&mut self, path: &str) -> Result<Vec<u8>> {
        self.try_open_first(path)?.ok_or_else(|| Error::NotFound {
            path: path.to_string(),
        })
    }

    /// Like [`open_first`](Self::open_first) but `Ok(None)` when absent.
    pub fn try_open_first(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let canonical = self.canonicalize(path);
        for layer in self.layers.iter_mut().rev() {
            if let Some(bytes) = layer.read(&canonical)? {
                tracing::debug!("'{}' resolved by layer '{}'", canonical, layer.name());
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    /// Byte buffers from every layer holding `path`, lowest priority first
    /// (the order merge operations consume them in).
    pub fn open_all_matches(&mut self, path: &str) -> Result<Vec<Vec<u8>>> {
        let canonical = self.canonicalize(path);
        let mut matches = Vec::new();
        for layer in self.layers.iter_mut() {
            if let Some(bytes) = layer.read(&canonical)? {
                matches.push(bytes);
            }
        }
        Ok(matches)
    }

    /// Merged XML document for `path` across all layers.
    pub fn open_merged_xml(&mut self, path: &str) -> Result<XmlDocument> {
        self.open_merged_xml_with_cancel(path, &CancellationToken::new())
    }

    /// Like [`open_merged_xml`](Self::open_merged_xml) but `Ok(None)` when no
    /// layer contributes a parseable document.
    pub fn try_open_merged_xml(&mut self, path: &str) -> Result<Option<XmlDocument>> {
        self.try_open_merged_xml_with_cancel(path, &CancellationToken::new())
    }

    /// Cancellable merged-XML open; see
    /// [`try_open_merged_xml_with_cancel`](Self::try_open_merged_xml_with_cancel).
    pub fn open_merged_xml_with_cancel(
        &mut self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<XmlDocument> {
        self.try_open_merged_xml_with_cancel(path, cancel)?
            .ok_or_else(|| Error::NotFound {
                path: path.to_string(),
            })
    }

    /// Walk layers lowest-priority first; the first contribution that parses
    /// becomes the base document and every later one is merged into it.
    ///
    /// A layer whose bytes fail to parse as XML is skipped silently: one
    /// malformed mod file must not poison the merge. Cancellation is checked
    /// at each layer boundary, so a merge across many layers aborts promptly
    /// between layers (never mid-layer).
    pub fn try_open_merged_xml_with_cancel(
        &mut self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<XmlDocument>> {
        let canonical = self.canonicalize(path);
        let mut merged: Option<XmlDocument> = None;

        for layer in self.layers.iter_mut() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(bytes) = layer.read(&canonical)? else {
                continue;
            };
            let doc = match XmlDocument::parse_bytes(&bytes) {
                Ok(doc) => doc,
                Err(err) => {
                    tracing::debug!(
                        "layer '{}' supplies malformed XML for '{}', skipping: {}",
                        layer.name(),
                        canonical,
                        err
                    );
                    continue;
                }
            };
            match merged.as_mut() {
                None => merged = Some(doc),
                Some(base) => patch::merge(base, &doc),
            }
        }
        Ok(merged)
    }

    /// Whether any mod layer is active on top of the base install.
    pub fn has_active_mods(&self) -> bool {
        !self.mods.is_empty()
    }

    /// Descriptors of the loaded mods, in layer order.
    pub fn descriptors(&self) -> &[ModDescriptor] {
        &self.mods
    }

    /// Aligned text table of the loaded mods' metadata.
    pub fn mod_table(&self) -> String {
        const HEADERS: [&str; 7] = ["ID", "NAME", "VERSION", "AUTHOR", "DATE", "ENABLED", "SAVE"];

        let rows: Vec<[String; 7]> = self
            .mods
            .iter()
            .map(|m| {
                [
                    m.id.clone(),
                    m.name.clone(),
                    m.version.clone(),
                    m.author.clone(),
                    m.date.clone(),
                    if m.is_enabled() { "yes" } else { "no" }.to_string(),
                    m.save.clone(),
                ]
            })
            .collect();

        let mut widths: [usize; 7] = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        let mut out = String::new();
        let write_row = |out: &mut String, cells: &[&str]| {
            for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
                if i > 0 {
                    out.push_str("  ");
                }
                let _ = write!(out, "{cell:<width$}");
            }
            // Trailing padding on the last column is noise.
            while out.ends_with(' ') {
                out.pop();
            }
            out.push('\n');
        };

        write_row(&mut out, &HEADERS);
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            write_row(&mut out, &cells);
        }
        out
    }
}
