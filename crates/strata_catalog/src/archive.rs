//! Deferred catalog parsing and byte-range reads.
//!
//! An [`ArchiveIndex`] covers one directory's catalog/data pairs. Scanning
//! only enumerates the pairs; the catalogs themselves sit in a pending queue
//! until a [`lookup`](ArchiveIndex::lookup) misses the entry table, at which
//! point they are parsed one at a time until the requested path appears (or
//! the queue runs dry).
//!
//! A catalog record is one line of the form:
//!
//! ```text
//! <relative-path> <decimal-size> <numeric-field> <hex-digest>
//! ```
//!
//! The path may contain spaces; the size is the file's byte length inside the
//! paired data blob. The trailing numeric field and hex digest are validated
//! in shape but otherwise ignored; offsets are always the running sum of
//! preceding sizes in the same catalog, never derived from the digest.
//! CRLF endings and blank lines carry no record and are tolerated; every
//! line with content must match the shape above or the archive is rejected.

use crate::error::{CatalogError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::OnceLock;

/// File extension of catalog files.
pub const CATALOG_EXTENSION: &str = "cat";

/// File extension of the paired data blobs.
pub const DATA_EXTENSION: &str = "dat";

/// Catalogs whose file name contains this marker hold signatures, not
/// content, and are excluded from scanning.
const SIGNATURE_MARKER: &str = "signature";

/// `<path> <size> <field> <digest>`; the path is greedy so it may contain
/// spaces; the last three fields are anchored at the end of the line.
fn record_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+) (\d+) (\d+) ([0-9a-fA-F]+)$").expect("record pattern is valid")
    })
}

/// One file inside an archive: where its bytes live in the paired data blob.
///
/// Immutable once parsed; owned by its [`ArchiveIndex`] for the lifetime of
/// the index.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    path: String,
    data_file: Utf8PathBuf,
    size: u64,
    offset: u64,
}

impl ArchiveEntry {
    /// Relative path as written in the catalog, with separators normalized
    /// to `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The data blob holding this entry's bytes.
    pub fn data_file(&self) -> &Utf8Path {
        &self.data_file
    }

    /// Byte length inside the data blob.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Byte offset inside the data blob (running sum of preceding sizes).
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// A catalog that has been discovered but not yet parsed.
#[derive(Debug)]
struct PendingCatalog {
    catalog: Utf8PathBuf,
    data: Utf8PathBuf,
}

/// Lazy index over one directory's catalog/data pairs.
///
/// Lookup keys are case-insensitive and separator-normalized. Catalogs parse
/// in file-name order; the first catalog to supply a path wins.
#[derive(Debug)]
pub struct ArchiveIndex {
    root: Utf8PathBuf,
    entries: HashMap<String, ArchiveEntry>,
    pending: VecDeque<PendingCatalog>,
}

impl ArchiveIndex {
    /// Scan `dir` for catalog/data pairs without parsing any catalog.
    ///
    /// Catalogs with `"signature"` in their name are skipped, as are catalogs
    /// whose paired data file is missing.
    pub fn scan(dir: &Utf8Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CatalogError::DirNotFound(dir.to_owned()));
        }

        let mut discovered = Vec::new();
        for entry in dir.read_dir_utf8()? {
            let entry = entry?;
            let path = entry.path();
            if path.extension() != Some(CATALOG_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            if name.contains(SIGNATURE_MARKER) {
                tracing::debug!("skipping signature catalog {}", path);
                continue;
            }
            let data = path.with_extension(DATA_EXTENSION);
            if !data.is_file() {
                tracing::warn!("catalog {} has no paired data file, skipping", path);
                continue;
            }
            discovered.push(PendingCatalog {
                catalog: path.to_owned(),
                data,
            });
        }

        // Directory enumeration order is platform-dependent; catalogs are
        // numbered, so sorting by name gives the intended parse order.
        discovered.sort_by(|a, b| a.catalog.cmp(&b.catalog));
        let pending: VecDeque<_> = discovered.into();

        tracing::info!("scanned {}: {} archive pair(s) queued", dir, pending.len());
        Ok(Self {
            root: dir.to_owned(),
            entries: HashMap::new(),
            pending,
        })
    }

    /// The directory this index was scanned from.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Number of catalogs discovered but not yet parsed.
    pub fn pending_catalogs(&self) -> usize {
        self.pending.len()
    }

    /// Number of entries parsed into the table so far.
    pub fn cached_entries(&self) -> usize {
        self.entries.len()
    }

    /// Find the entry for `path`, parsing further catalogs only as needed.
    ///
    /// Returns `Ok(None)` once every pending catalog has been parsed and the
    /// path is still absent. A malformed catalog aborts with an error; entries
    /// already cached stay valid.
    pub fn lookup(&mut self, path: &str) -> Result<Option<&ArchiveEntry>> {
        let key = normalize_key(path);
        while !self.entries.contains_key(&key) {
            let Some(next) = self.pending.pop_front() else {
                return Ok(None);
            };
            self.parse_catalog(&next)?;
        }
        Ok(self.entries.get(&key))
    }

    /// Read the entry's bytes out of its data blob.
    ///
    /// Opens the file, seeks to the entry's offset, reads exactly
    /// [`size`](ArchiveEntry::size) bytes, and closes the file again. Any I/O
    /// failure (including a truncated blob) propagates to the caller.
    pub fn read(&self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let mut file = File::open(entry.data_file.as_std_path())?;
        file.seek(SeekFrom::Start(entry.offset))?;
        let mut buf = vec![0u8; entry.size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn parse_catalog(&mut self, pair: &PendingCatalog) -> Result<()> {
        let text = std::fs::read_to_string(pair.catalog.as_std_path())?;
        let mut offset = 0u64;
        let mut records: Vec<(String, ArchiveEntry)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }
            let malformed = || CatalogError::MalformedRecord {
                catalog: pair.catalog.clone(),
                line: idx + 1,
                text: line.to_string(),
            };
            let caps = record_pattern().captures(line).ok_or_else(malformed)?;
            let size: u64 = caps[2].parse().map_err(|_| malformed())?;

            records.push((
                normalize_key(&caps[1]),
                ArchiveEntry {
                    path: caps[1].replace('\\', "/"),
                    data_file: pair.data.clone(),
                    size,
                    offset,
                },
            ));
            offset += size;
        }

        // Commit only once the whole catalog validated; a malformed line is
        // fatal for the archive, so no earlier record of it may be served.
        let parsed = records.len();
        for (key, entry) in records {
            // First-parsed catalog wins for duplicate paths.
            self.entries.entry(key).or_insert(entry);
        }

        tracing::debug!(
            "parsed catalog {} ({} record(s), {} cached total)",
            pair.catalog,
            parsed,
            self.entries.len()
        );
        Ok(())
    }
}

fn normalize_key(path: &str) -> String {
    path.replace('\\', "/").to_ascii_lowercase()
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
    fn test_scan_skips_signature_and_unpaired() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("a.txt", b"aaa")]);
        std::fs::write(dir.join("01_signature.cat"), "x 1 0 ff\n").unwrap();
        std::fs::write(dir.join("01_signature.dat"), "x").unwrap();
        std::fs::write(dir.join("orphan.cat"), "x 1 0 ff\n").unwrap();

        let index = ArchiveIndex::scan(&dir).unwrap();
        assert_eq!(index.pending_catalogs(), 1);
    }

    #[test]
    fn test_scan_missing_dir() {
        let err = ArchiveIndex::scan(Utf8Path::new("/nonexistent/archive/dir")).unwrap_err();
        assert!(matches!(err, CatalogError::DirNotFound(_)));
    }

    #[test]
    fn test_lookup_and_read_with_offsets() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("a.txt", b"aaa"), ("b/c.txt", b"bbbb")]);

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        let entry = index.lookup("b/c.txt").unwrap().unwrap().clone();
        assert_eq!(entry.offset(), 3);
        assert_eq!(entry.size(), 4);
        assert_eq!(index.read(&entry).unwrap(), b"bbbb");

        let entry = index.lookup("a.txt").unwrap().unwrap().clone();
        assert_eq!(entry.offset(), 0);
        assert_eq!(index.read(&entry).unwrap(), b"aaa");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("Assets/Foo.xml", b"<r/>")]);

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        assert!(index.lookup("assets/foo.xml").unwrap().is_some());
        assert!(index.lookup("ASSETS\\FOO.XML").unwrap().is_some());
    }

    #[test]
    fn test_paths_may_contain_spaces() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("music/main theme.ogg", b"oggdata")]);

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        let entry = index.lookup("music/main theme.ogg").unwrap().unwrap().clone();
        assert_eq!(index.read(&entry).unwrap(), b"oggdata");
    }

    #[test]
    fn test_blank_lines_and_crlf_tolerated() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        std::fs::write(dir.join("01.cat"), "a.txt 1 0 ff\r\n\r\nb.txt 2 0 aa\r\n").unwrap();
        std::fs::write(dir.join("01.dat"), b"abb").unwrap();

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        let entry = index.lookup("b.txt").unwrap().unwrap().clone();
        // Blank lines contribute no offset.
        assert_eq!(entry.offset(), 1);
        assert_eq!(index.read(&entry).unwrap(), b"bb");
    }

    #[test]
    fn test_lazy_parsing_stops_at_first_hit() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("shared.txt", b"one")]);
        write_archive(&dir, "02", &[("shared.txt", b"two")]);

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        assert_eq!(index.pending_catalogs(), 2);
        let entry = index.lookup("shared.txt").unwrap().unwrap().clone();
        // 01.cat parses first and satisfies the lookup; 02.cat stays pending.
        assert_eq!(index.read(&entry).unwrap(), b"one");
        assert_eq!(index.pending_catalogs(), 1);
    }

    #[test]
    fn test_first_record_wins_for_duplicate_paths() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        std::fs::write(dir.join("01.cat"), "dup.txt 3 0 aa\ndup.txt 5 0 bb\n").unwrap();
        std::fs::write(dir.join("01.dat"), b"aaabbbbb").unwrap();

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        let entry = index.lookup("dup.txt").unwrap().unwrap().clone();
        assert_eq!(entry.size(), 3);
        assert_eq!(entry.offset(), 0);
        assert_eq!(index.read(&entry).unwrap(), b"aaa");
    }

    #[test]
    fn test_not_found_exhausts_queue() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        write_archive(&dir, "01", &[("a.txt", b"aaa")]);
        write_archive(&dir, "02", &[("b.txt", b"bbb")]);

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        assert!(index.lookup("missing.txt").unwrap().is_none());
        assert_eq!(index.pending_catalogs(), 0);
    }

    #[test]
    fn test_malformed_record_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        std::fs::write(dir.join("01.cat"), "ok.txt 2 0 ff\nnot a record\n").unwrap();
        std::fs::write(dir.join("01.dat"), b"ok").unwrap();

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        let err = index.lookup("ok.txt").unwrap_err();
        assert!(matches!(err, CatalogError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_malformed_catalog_serves_no_records() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        std::fs::write(dir.join("01.cat"), "ok.txt 2 0 ff\nnot a record\n").unwrap();
        std::fs::write(dir.join("01.dat"), b"ok").unwrap();

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        assert!(index.lookup("ok.txt").is_err());
        // Records parsed before the bad line must not linger in the table:
        // a repeated lookup finds nothing instead of half the archive.
        assert!(index.lookup("ok.txt").unwrap().is_none());
        assert_eq!(index.cached_entries(), 0);
    }

    #[test]
    fn test_digest_field_must_be_hex() {
        let tmp = TempDir::new().unwrap();
        let dir = utf8_dir(&tmp);
        std::fs::write(dir.join("01.cat"), "a.txt 1 0 zz\n").unwrap();
        std::fs::write(dir.join("01.dat"), b"a").unwrap();

        let mut index = ArchiveIndex::scan(&dir).unwrap();
        assert!(matches!(
            index.lookup("a.txt").unwrap_err(),
            CatalogError::MalformedRecord { .. }
        ));
    }
}
