//! Importers
//!
//! - `FsImporter`: reads from a `FileTree`, memoizing hits and misses forever
//! - `FileImporter`: reads from the local filesystem with search paths
//! - `MemoryImporter`: fixed path-to-contents map
//! - `CompoundImporter`: ordered fallback over other importers

use jpoet_core::{join_relative, Contents, ImportError, Imported, Importer};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

// ========== File Trees ==========

/// Read-only file tree addressed by slash-separated relative paths
pub trait FileTree {
    /// A missing file must be reported as `io::ErrorKind::NotFound`.
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;
}

impl<T: FileTree + ?Sized> FileTree for Rc<T> {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        (**self).read_file(path)
    }
}

impl<T: FileTree + ?Sized> FileTree for Box<T> {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        (**self).read_file(path)
    }
}

/// A directory on disk viewed as a file tree rooted at `root`
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileTree for DirTree {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        // Paths outside the tree are absent from it, so a later importer can try them
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("open {}: not inside the tree root", path),
            ));
        }
        fs::read(self.root.join(relative))
    }
}

/// In-memory file tree; files can be added and removed through a shared
/// handle while an importer holds it.
#[derive(Debug, Default)]
pub struct MapTree {
    files: RefCell<HashMap<String, Vec<u8>>>,
}

impl MapTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(path.into(), contents.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.borrow_mut().remove(path);
    }
}

impl FileTree for MapTree {
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("open {}: file does not exist", path)))
    }
}

// ========== Filesystem Importer ==========

/// Importer over a `FileTree`.
///
/// Looks up the path relative to the importing file first, then the bare
/// path. Contents and confirmed absences are cached for the importer's
/// lifetime and never revalidated.
pub struct FsImporter<T> {
    tree: T,
    cache: RefCell<HashMap<String, Option<Contents>>>,
}

impl<T: FileTree> FsImporter<T> {
    pub fn new(tree: T) -> Self {
        Self { tree, cache: RefCell::new(HashMap::new()) }
    }

    fn try_path(&self, path: &str) -> Result<Option<Contents>, ImportError> {
        if let Some(entry) = self.cache.borrow().get(path) {
            return Ok(entry.clone());
        }
        let entry = match self.tree.read_file(path) {
            Ok(bytes) => Some(Contents::from_bytes(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            // Not cached: only absence is trusted
            Err(source) => return Err(ImportError::Io { path: path.to_string(), source }),
        };
        self.cache.borrow_mut().insert(path.to_string(), entry.clone());
        Ok(entry)
    }
}

impl<T: FileTree> Importer for FsImporter<T> {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError> {
        let relative = join_relative(imported_from, imported_path);
        if let Some(contents) = self.try_path(&relative)? {
            return Ok(Imported::new(contents, relative));
        }
        if let Some(contents) = self.try_path(imported_path)? {
            return Ok(Imported::new(contents, imported_path));
        }
        Err(ImportError::not_found(imported_path))
    }
}

// ========== Local File Importer ==========

/// Importer over the local filesystem.
///
/// Tries the path relative to the importing file, then each search path with
/// the last one taking precedence. Absolute paths are used as is.
#[derive(Default)]
pub struct FileImporter {
    jpaths: Vec<PathBuf>,
    cache: RefCell<HashMap<PathBuf, Option<Contents>>>,
}

impl FileImporter {
    pub fn new<P: Into<PathBuf>>(jpaths: impl IntoIterator<Item = P>) -> Self {
        Self {
            jpaths: jpaths.into_iter().map(Into::into).collect(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn candidates(&self, imported_from: &str, imported_path: &str) -> Vec<PathBuf> {
        let path = Path::new(imported_path);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        let dir = Path::new(imported_from).parent().unwrap_or_else(|| Path::new(""));
        let mut candidates = vec![dir.join(path)];
        candidates.extend(self.jpaths.iter().rev().map(|jpath| jpath.join(path)));
        candidates
    }

    fn try_path(&self, path: &Path) -> Result<Option<Contents>, ImportError> {
        if let Some(entry) = self.cache.borrow().get(path) {
            return Ok(entry.clone());
        }
        let entry = match fs::read(path) {
            Ok(bytes) => Some(Contents::from_bytes(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ImportError::Io { path: path.display().to_string(), source });
            }
        };
        self.cache.borrow_mut().insert(path.to_path_buf(), entry.clone());
        Ok(entry)
    }
}

impl Importer for FileImporter {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError> {
        for candidate in self.candidates(imported_from, imported_path) {
            if let Some(contents) = self.try_path(&candidate)? {
                tracing::trace!(path = %candidate.display(), "import found");
                return Ok(Imported::new(contents, candidate.to_string_lossy()));
            }
        }
        Err(ImportError::not_found(imported_path))
    }
}

// ========== Memory Importer ==========

/// Importer over a fixed map. The path relative to the importing file wins
/// over the bare path.
#[derive(Debug, Clone, Default)]
pub struct MemoryImporter {
    data: BTreeMap<String, Contents>,
}

impl MemoryImporter {
    pub fn new(data: BTreeMap<String, Contents>) -> Self {
        Self { data }
    }
}

impl Importer for MemoryImporter {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError> {
        let relative = join_relative(imported_from, imported_path);
        for key in [relative.as_str(), imported_path] {
            if let Some(contents) = self.data.get(key) {
                return Ok(Imported::new(contents.clone(), key));
            }
        }
        Err(ImportError::NotAvailable { path: imported_path.to_string() })
    }
}

// ========== Compound Importer ==========

/// Tries each importer in order and returns the first success.
///
/// A not-found result moves on to the next importer; any other error stops
/// the chain. When every importer misses, the last miss is returned.
#[derive(Default)]
pub struct CompoundImporter {
    importers: Vec<Box<dyn Importer>>,
}

impl CompoundImporter {
    pub fn new(importers: Vec<Box<dyn Importer>>) -> Self {
        Self { importers }
    }

    pub fn push(&mut self, importer: Box<dyn Importer>) {
        self.importers.push(importer);
    }

    pub fn is_empty(&self) -> bool {
        self.importers.is_empty()
    }
}

impl Importer for CompoundImporter {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError> {
        let mut last = None;
        for importer in &self.importers {
            match importer.import(imported_from, imported_path) {
                Ok(imported) => return Ok(imported),
                Err(e) if e.is_not_found() => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| ImportError::not_found(imported_path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn text(imported: &Imported) -> &str {
        imported.contents.to_str().unwrap()
    }

    #[test]
    fn test_fs_import_success() {
        let importer = FsImporter::new(MapTree::new().with_file("test.jsonnet", "local x = 1; x"));
        let imported = importer.import("", "test.jsonnet").unwrap();
        assert_eq!(imported.found_at, "test.jsonnet");
        assert!(text(&imported).contains("local x = 1"));
    }

    #[test]
    fn test_fs_import_missing() {
        let importer = FsImporter::new(MapTree::new());
        let err = importer.import("", "nonexistent.jsonnet").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("couldn't open import"));
    }

    #[test]
    fn test_fs_import_relative_then_bare() {
        let tree = MapTree::new()
            .with_file("lib/util.libsonnet", "relative")
            .with_file("shared.libsonnet", "bare");
        let importer = FsImporter::new(tree);
        assert_eq!(text(&importer.import("lib/main.jsonnet", "util.libsonnet").unwrap()), "relative");
        let bare = importer.import("lib/main.jsonnet", "shared.libsonnet").unwrap();
        assert_eq!(text(&bare), "bare");
        assert_eq!(bare.found_at, "shared.libsonnet");
    }

    #[test]
    fn test_fs_cache_survives_deletion() {
        let tree = Rc::new(MapTree::new().with_file("cached.jsonnet", "local x = 1; x"));
        let importer = FsImporter::new(tree.clone());
        let first = importer.import("", "cached.jsonnet").unwrap();
        tree.remove("cached.jsonnet");
        let second = importer.import("", "cached.jsonnet").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fs_tombstone_is_trusted() {
        let tree = Rc::new(MapTree::new());
        let importer = FsImporter::new(tree.clone());
        assert!(importer.import("", "late.jsonnet").is_err());
        tree.insert("late.jsonnet", "1");
        assert!(importer.import("", "late.jsonnet").unwrap_err().is_not_found());
    }

    #[test]
    fn test_dir_tree_reads_and_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/a.libsonnet"), "{}").unwrap();
        fs::write(dir.path().join("outside.jsonnet"), "{}").unwrap();
        let importer = FsImporter::new(DirTree::new(dir.path().join("lib")));
        assert_eq!(importer.import("main.jsonnet", "a.libsonnet").unwrap().found_at, "a.libsonnet");
        assert!(importer.import("", "../outside.jsonnet").unwrap_err().is_not_found());
        let absolute = dir.path().join("outside.jsonnet");
        assert!(importer.import("", &absolute.to_string_lossy()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_compound_falls_through_dir_tree_for_absolute_paths() {
        let lib = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let absolute = other.path().join("main.jsonnet");
        fs::write(&absolute, "outside").unwrap();
        let compound = CompoundImporter::new(vec![
            Box::new(FsImporter::new(DirTree::new(lib.path()))),
            Box::new(FileImporter::default()),
        ]);
        let imported = compound.import("", &absolute.to_string_lossy()).unwrap();
        assert_eq!(text(&imported), "outside");
    }

    #[test]
    fn test_file_importer_jpaths_last_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("lib.libsonnet"), "first").unwrap();
        fs::write(second.path().join("lib.libsonnet"), "second").unwrap();
        let importer = FileImporter::new([first.path(), second.path()]);
        let imported = importer.import("", "lib.libsonnet").unwrap();
        assert_eq!(text(&imported), "second");
    }

    #[test]
    fn test_file_importer_relative_first() {
        let dir = tempfile::tempdir().unwrap();
        let jpath = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.libsonnet"), "local").unwrap();
        fs::write(jpath.path().join("lib.libsonnet"), "library").unwrap();
        let importer = FileImporter::new([jpath.path()]);
        let from = dir.path().join("main.jsonnet");
        let imported = importer.import(&from.to_string_lossy(), "lib.libsonnet").unwrap();
        assert_eq!(text(&imported), "local");
    }

    #[test]
    fn test_memory_importer_joined_path_wins() {
        let importer = MemoryImporter::new(BTreeMap::from([
            ("lib/a.jsonnet".to_string(), Contents::from("joined")),
            ("a.jsonnet".to_string(), Contents::from("bare")),
        ]));
        assert_eq!(text(&importer.import("lib/main.jsonnet", "a.jsonnet").unwrap()), "joined");
        assert_eq!(text(&importer.import("main.jsonnet", "a.jsonnet").unwrap()), "bare");
    }

    #[test]
    fn test_memory_importer_miss() {
        let err = MemoryImporter::default().import("", "x.jsonnet").unwrap_err();
        assert_eq!(err.to_string(), "import not available x.jsonnet");
        assert!(err.is_not_found());
    }

    struct Mock {
        result: fn() -> Result<Imported, ImportError>,
        calls: Rc<Cell<usize>>,
    }

    impl Importer for Mock {
        fn import(&self, _: &str, _: &str) -> Result<Imported, ImportError> {
            self.calls.set(self.calls.get() + 1);
            (self.result)()
        }
    }

    fn mock(result: fn() -> Result<Imported, ImportError>) -> (Box<dyn Importer>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (Box::new(Mock { result, calls: calls.clone() }), calls)
    }

    fn found() -> Result<Imported, ImportError> {
        Ok(Imported::new(Contents::from("valid content"), "valid.jsonnet"))
    }

    fn missing() -> Result<Imported, ImportError> {
        Err(ImportError::not_found("test.jsonnet"))
    }

    fn broken() -> Result<Imported, ImportError> {
        Err(ImportError::Io {
            path: "test.jsonnet".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        })
    }

    #[test]
    fn test_compound_continues_on_not_found() {
        let (a, _) = mock(missing);
        let (b, _) = mock(found);
        let imported = CompoundImporter::new(vec![a, b]).import("", "test.jsonnet").unwrap();
        assert_eq!(imported.found_at, "valid.jsonnet");
    }

    #[test]
    fn test_compound_stops_on_success() {
        let (a, _) = mock(found);
        let (b, b_calls) = mock(missing);
        CompoundImporter::new(vec![a, b]).import("", "test.jsonnet").unwrap();
        assert_eq!(b_calls.get(), 0);
    }

    #[test]
    fn test_compound_stops_on_fatal_error() {
        let (a, _) = mock(broken);
        let (b, b_calls) = mock(found);
        let err = CompoundImporter::new(vec![a, b]).import("", "test.jsonnet").unwrap_err();
        assert!(!err.is_not_found());
        assert_eq!(b_calls.get(), 0);
    }

    #[test]
    fn test_compound_returns_last_not_found() {
        let (a, _) = mock(missing);
        let b: Box<dyn Importer> = Box::new(MemoryImporter::default());
        let err = CompoundImporter::new(vec![a, b]).import("", "test.jsonnet").unwrap_err();
        assert_eq!(err.to_string(), "import not available test.jsonnet");
    }
}
