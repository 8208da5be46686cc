//! One priority-ordered asset source.
//!
//! A [`Layer`] wraps the archives found in one directory (base install or a
//! mod directory) plus the directory itself for loose-file fallback. Archives
//! are consulted first; a loose file on disk only answers when no archive
//! holds the path. The layer is read-only after construction apart from the
//! archive index's internal lazy parsing.

use crate::error::Result;
use camino::{Utf8Path, Utf8PathBuf};
use strata_catalog::ArchiveIndex;

/// Name of the base-install layer.
pub const BASE_LAYER: &str = "base";

#[derive(Debug)]
pub struct Layer {
    name: String,
    root: Utf8PathBuf,
    archives: Vec<ArchiveIndex>,
}

impl Layer {
    /// Build a layer over `dir`, scanning it for archive pairs.
    pub fn new(name: &str, dir: &Utf8Path) -> Result<Self> {
        let archives = vec![ArchiveIndex::scan(dir)?];
        Ok(Self {
            name: name.to_string(),
            root: dir.to_owned(),
            archives,
        })
    }

    /// Layer name: [`BASE_LAYER`] or the owning mod's id.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory this layer serves loose files from.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The layer's archive indexes, in consultation order.
    pub fn archives(&self) -> &[ArchiveIndex] {
        &self.archives
    }

    /// Read `path` from this layer: archives first, loose file second.
    ///
    /// Returns `Ok(None)` when the layer doesn't hold the path at all.
    pub fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        for archive in &mut self.archives {
            let entry = archive.lookup(path)?.cloned();
            if let Some(entry) = entry {
                return Ok(Some(archive.read(&entry)?));
            }
        }

        let loose = self.root.join(path);
        if loose.is_file() {
            return Ok(Some(std::fs::read(loose.as_std_path())?));
        }
        Ok(None)
    }
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

    #[test]
    fn test_archive_beats_loose_file() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("a.txt", b"archived")]);
        std::fs::write(dir.join("a.txt"), b"loose").unwrap();

        let mut layer = Layer::new(BASE_LAYER, &dir).unwrap();
        assert_eq!(layer.read("a.txt").unwrap().unwrap(), b"archived");
    }

    #[test]
    fn test_loose_file_fallback() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("a.txt", b"archived")]);
        std::fs::create_dir_all(dir.join("assets")).unwrap();
        std::fs::write(dir.join("assets/b.txt"), b"loose").unwrap();

        let mut layer = Layer::new(BASE_LAYER, &dir).unwrap();
        assert_eq!(layer.read("assets/b.txt").unwrap().unwrap(), b"loose");
        assert!(layer.read("assets/c.txt").unwrap().is_none());
    }
}
