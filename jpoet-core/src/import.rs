//! Import resolution contract

use crate::ImportError;
use std::fmt;
use std::rc::Rc;
use std::str::Utf8Error;
use std::sync::Arc;

/// Source bytes of an imported module
#[derive(Clone, PartialEq, Eq)]
pub struct Contents(Arc<[u8]>);

impl Contents {
    pub fn new(text: impl Into<String>) -> Self {
        Self(Arc::from(text.into().into_bytes()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.0)
    }
}

impl fmt::Debug for Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_str() {
            Ok(s) => write!(f, "Contents({:?})", s),
            Err(_) => write!(f, "Contents({} bytes)", self.0.len()),
        }
    }
}

impl From<&str> for Contents {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Contents {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// A resolved import: the module source and the canonical path it was found at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imported {
    pub contents: Contents,
    pub found_at: String,
}

impl Imported {
    pub fn new(contents: Contents, found_at: impl Into<String>) -> Self {
        Self { contents, found_at: found_at.into() }
    }
}

/// Resolves `imported_path` as requested by the module at `imported_from`.
///
/// Implementations report a missing module with an error for which
/// [`ImportError::is_not_found`] is true; any other error is fatal to the
/// lookup.
pub trait Importer {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError>;
}

impl<I: Importer + ?Sized> Importer for Box<I> {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError> {
        (**self).import(imported_from, imported_path)
    }
}

impl<I: Importer + ?Sized> Importer for Rc<I> {
    fn import(&self, imported_from: &str, imported_path: &str) -> Result<Imported, ImportError> {
        (**self).import(imported_from, imported_path)
    }
}

/// Joins `imported_path` onto the directory of `imported_from` and cleans the
/// result (slash-separated, `.` and `..` folded).
pub fn join_relative(imported_from: &str, imported_path: &str) -> String {
    let dir = match imported_from.rfind('/') {
        Some(idx) => &imported_from[..=idx],
        None => "",
    };
    clean_path(&format!("{}{}", dir, imported_path))
}

/// Lexical path cleaning on slash-separated paths.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
