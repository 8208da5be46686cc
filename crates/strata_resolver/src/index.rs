//! Symbolic-name resolution through index documents.
//!
//! Index documents map symbolic names (component and macro identifiers) to
//! concrete asset paths:
//!
//! ```xml
//! <index>
//!   <entry name="ship_argo" value="assets\\ships\\argo"/>
//! </index>
//! ```
//!
//! An [`IndexResolver`] wraps a [`LayeredAssetResolver`] and keeps two pieces
//! of state: which index paths have already been consulted, and the
//! accumulated name table. Each index document is loaded (merged across
//! layers) exactly once per resolver lifetime; consulting further indexes
//! *augments* the table, with later mappings overwriting earlier ones for the
//! same name.

use crate::dom::{local_name, XmlDocument};
use crate::error::{Error, Result};
use crate::resolver::LayeredAssetResolver;
use camino::Utf8Path;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct IndexResolver {
    inner: LayeredAssetResolver,
    consulted: HashSet<String>,
    names: HashMap<String, String>,
}

impl IndexResolver {
    pub fn new(inner: LayeredAssetResolver) -> Self {
        Self {
            inner,
            consulted: HashSet::new(),
            names: HashMap::new(),
        }
    }

    /// The wrapped layered resolver.
    pub fn inner(&self) -> &LayeredAssetResolver {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut LayeredAssetResolver {
        &mut self.inner
    }

    /// Resolve `name` through the index at `index_path` and open the merged
    /// document it points to.
    pub fn open_index_xml(&mut self, index_path: &str, name: &str) -> Result<XmlDocument> {
        self.open_index_xml_with_cancel(index_path, name, &CancellationToken::new())
    }

    /// Cancellable variant of [`open_index_xml`](Self::open_index_xml).
    ///
    /// On first consultation of `index_path`, its merged document is loaded
    /// and every `<entry name value>` pair is folded into the name table
    /// (doubled backslashes in values un-escaped). The resolved value gets an
    /// `.xml` extension when it has none, and exactly one leading separator
    /// stripped.
    pub fn open_index_xml_with_cancel(
        &mut self,
        index_path: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<XmlDocument> {
        if !self.consulted.contains(index_path) {
            let doc = self
                .inner
                .open_merged_xml_with_cancel(index_path, cancel)?;
            let mut ingested = 0usize;
            for entry in doc.child_elements(doc.root()) {
                if local_name(doc.name(entry)) != "entry" {
                    continue;
                }
                let (Some(entry_name), Some(value)) = (
                    doc.attribute(entry, "name"),
                    doc.attribute(entry, "value"),
                ) else {
                    continue;
                };
                self.names
                    .insert(entry_name.to_string(), value.replace("\\\\", "\\"));
                ingested += 1;
            }
            tracing::debug!(
                "consulted index '{}': {} entries ({} names total)",
                index_path,
                ingested,
                self.names.len()
            );
            self.consulted.insert(index_path.to_string());
        }

        let value = self.names.get(name).ok_or_else(|| Error::NameNotFound {
            name: name.to_string(),
        })?;
        let resolved = resolve_value(value);
        self.inner.open_merged_xml_with_cancel(&resolved, cancel)
    }
}

/// Apply the value normalization rules: default the extension to `.xml`,
/// strip exactly one leading separator.
fn resolve_value(value: &str) -> String {
    let mut resolved = value.replace('\\', "/");
    if Utf8Path::new(&resolved).extension().is_none() {
        resolved.push_str(".xml");
    }
    if resolved.starts_with('/') {
        resolved.remove(0);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fmt::Write as _;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_archive(dir: &Utf8Path, stem: &str, files: &[(&str, &[u8])]) {
        let mut catalog = String::new();
        let mut blob = Vec::new();
        for (path, bytes) in files {
            writeln!(catalog, "{} {} 0 {:08x}", path, bytes.len(), bytes.len()).unwrap();
            blob.extend_from_slice(bytes);
        }
        std::fs::write(dir.join(format!("{stem}.cat")), catalog).unwrap();
        std::fs::write(dir.join(format!("{stem}.dat")), blob).unwrap();
    }

    fn resolver_with(files: &[(&str, &[u8])]) -> (TempDir, IndexResolver) {
        let tmp = TempDir::new().unwrap();
        let root = utf8_dir(&tmp);
        write_archive(&root, "01", files);
        let index = IndexResolver::new(LayeredAssetResolver::open(&root).unwrap());
        (tmp, index)
    }

    #[test]
    fn test_resolves_value_without_extension() {
        let (_tmp, mut index) = resolver_with(&[
            (
                "index/components.xml",
                br#"<index><entry name="foo" value="foo/bar"/></index>"#.as_slice(),
            ),
            ("foo/bar.xml", b"<c/>"),
        ]);
        let doc = index.open_index_xml("index/components.xml", "foo").unwrap();
        assert_eq!(doc.to_xml(), "<c/>");
    }

    #[test]
    fn test_strips_one_leading_separator() {
        let (_tmp, mut index) = resolver_with(&[
            (
                "index/components.xml",
                br#"<index><entry name="foo" value="/foo/bar.xml"/></index>"#.as_slice(),
            ),
            ("foo/bar.xml", b"<c/>"),
        ]);
        let doc = index.open_index_xml("index/components.xml", "foo").unwrap();
        assert_eq!(doc.to_xml(), "<c/>");
    }

    #[test]
    fn test_unescapes_doubled_backslashes() {
        let (_tmp, mut index) = resolver_with(&[
            (
                "index/macros.xml",
                br#"<index><entry name="m" value="assets\\ships\\argo"/></index>"#.as_slice(),
            ),
            ("assets/ships/argo.xml", b"<m/>"),
        ]);
        let doc = index.open_index_xml("index/macros.xml", "m").unwrap();
        assert_eq!(doc.to_xml(), "<m/>");
    }

    #[test]
    fn test_unknown_name_not_found() {
        let (_tmp, mut index) = resolver_with(&[(
            "index/components.xml",
            br#"<index><entry name="foo" value="foo.xml"/></index>"#.as_slice(),
        )]);
        assert!(matches!(
            index.open_index_xml("index/components.xml", "nope"),
            Err(Error::NameNotFound { .. })
        ));
    }

    #[test]
    fn test_later_index_overwrites_earlier_names() {
        let (_tmp, mut index) = resolver_with(&[
            (
                "index/a.xml",
                br#"<index><entry name="foo" value="first.xml"/></index>"#.as_slice(),
            ),
            (
                "index/b.xml",
                br#"<index><entry name="foo" value="second.xml"/></index>"#.as_slice(),
            ),
            ("first.xml", b"<first/>"),
            ("second.xml", b"<second/>"),
        ]);
        let doc = index.open_index_xml("index/a.xml", "foo").unwrap();
        assert_eq!(doc.to_xml(), "<first/>");
        let doc = index.open_index_xml("index/b.xml", "foo").unwrap();
        assert_eq!(doc.to_xml(), "<second/>");
    }

    #[test]
    fn test_index_consulted_once() {
        let (tmp, mut index) = resolver_with(&[(
            "index/a.xml",
            br#"<index><entry name="foo" value="first.xml"/></index>"#.as_slice(),
        )]);
        let root = utf8_dir(&tmp);
        // The target is a loose file so it survives the archive's removal below.
        std::fs::write(root.join("first.xml"), b"<first/>").unwrap();
        index.open_index_xml("index/a.xml", "foo").unwrap();

        // Yank the archive out from under the resolver: a second call can only
        // succeed if the index document is not consulted (read) again.
        std::fs::remove_file(root.join("01.dat")).unwrap();
        let doc = index.open_index_xml("index/a.xml", "foo").unwrap();
        assert_eq!(doc.to_xml(), "<first/>");
    }

    #[test]
    fn test_missing_index_propagates_not_found() {
        let (_tmp, mut index) = resolver_with(&[]);
        assert!(matches!(
            index.open_index_xml("index/none.xml", "foo"),
            Err(Error::NotFound { .. })
        ));
    }
}
