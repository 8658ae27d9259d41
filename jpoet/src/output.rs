//! Output sinks
//!
//! The evaluation result is routed to exactly one sink: a writer, a typed
//! value, or a directory tree where each nested object becomes a directory
//! and each other value a file.

use jpoet_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Where the evaluation result goes
pub enum Output<'a> {
    Writer(Box<dyn Write + 'a>),
    Value(&'a mut dyn ValueTarget),
    Directory(PathBuf),
}

impl Default for Output<'_> {
    fn default() -> Self {
        Output::Writer(Box::new(io::stdout()))
    }
}

/// Receiver of the evaluation result as a value
pub trait ValueTarget {
    /// Serialized mode: the JSON text itself, as a string value
    fn set_serialized(&mut self, json: String) -> Result<()>;

    /// Raw mode: the JSON text decoded into the target
    fn set_raw(&mut self, json: &str) -> Result<()>;
}

impl<T: DeserializeOwned> ValueTarget for T {
    fn set_serialized(&mut self, json: String) -> Result<()> {
        *self = serde_json::from_value(Value::String(json))?;
        Ok(())
    }

    fn set_raw(&mut self, json: &str) -> Result<()> {
        *self = serde_json::from_str(json)?;
        Ok(())
    }
}

/// JSON type name used in output errors
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Route the serialized result `json` to `output`
pub fn route(output: Output<'_>, json: String, serialize: bool) -> Result<()> {
    match output {
        Output::Writer(mut writer) => {
            let text = if serialize {
                json
            } else {
                match serde_json::from_str::<Value>(&json)? {
                    Value::String(s) => s,
                    other => return Err(Error::NonStringOutput { found: json_type(&other) }),
                }
            };
            writer
                .write_all(text.as_bytes())
                .and_then(|_| writer.flush())
                .map_err(|e| Error::io("failed to write output", e))
        }
        Output::Value(target) => {
            if serialize {
                target.set_serialized(json)
            } else {
                target.set_raw(&json)
            }
        }
        Output::Directory(dir) => match serde_json::from_str::<Value>(&json)? {
            Value::Object(entries) => {
                let written = write_entries(&dir, &entries, serialize)?;
                tracing::debug!(dir = %dir.display(), written, "directory output done");
                Ok(())
            }
            other => Err(Error::NonObjectOutput { path: dir, found: json_type(&other) }),
        },
    }
}

/// Mirror `entries` under `directory`. Returns the number of files written;
/// files whose bytes are already identical are left alone.
pub fn write_entries(directory: &Path, entries: &Map<String, Value>, serialize: bool) -> Result<usize> {
    let mut written = 0;
    for (name, content) in entries {
        let path = directory.join(name);
        written += match content {
            Value::Object(nested) => write_entries(&path, nested, serialize)?,
            leaf => usize::from(write_file(&path, leaf, serialize)?),
        };
    }
    Ok(written)
}

/// Write one leaf. Returns false when the file already had these bytes.
pub fn write_file(path: &Path, content: &Value, serialize: bool) -> Result<bool> {
    let bytes = if serialize {
        serde_json::to_vec(content)?
    } else {
        match content {
            Value::String(s) => s.as_bytes().to_vec(),
            other => {
                return Err(Error::NonStringLeaf { path: path.to_path_buf(), found: json_type(other) });
            }
        }
    };

    match fs::read(path) {
        Ok(existing) if existing == bytes => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(format!("failed to read {}", path.display()), e)),
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(format!("failed to create {}", parent.display()), e))?;
    }
    fs::write(path, &bytes).map_err(|e| Error::io(format!("failed to write {}", path.display()), e))?;
    tracing::trace!(path = %path.display(), "wrote file");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_directory_mirrors_tree() {
        let dir = tempfile::tempdir().unwrap();
        let entries = object(json!({ "a.txt": "alpha", "nested": { "b.txt": "beta" } }));
        assert_eq!(write_entries(dir.path(), &entries, false).unwrap(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(dir.path().join("nested/b.txt")).unwrap(), "beta");
    }

    #[test]
    fn test_second_write_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let entries = object(json!({ "a.json": [1, 2], "sub": { "b.json": "text" } }));
        assert_eq!(write_entries(dir.path(), &entries, true).unwrap(), 2);
        let before = fs::metadata(dir.path().join("a.json")).unwrap().modified().unwrap();
        assert_eq!(write_entries(dir.path(), &entries, true).unwrap(), 0);
        let after = fs::metadata(dir.path().join("a.json")).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert_eq!(fs::read_to_string(dir.path().join("sub/b.json")).unwrap(), "\"text\"");
    }

    #[test]
    fn test_raw_number_leaf_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let entries = object(json!({ "deep": { "n.txt": 42 } }));
        let err = write_entries(dir.path(), &entries, false).unwrap_err();
        let path = dir.path().join("deep").join("n.txt");
        assert!(err.to_string().contains(&path.display().to_string()));
        assert!(err.to_string().starts_with("expect string when writing output to file"));
        assert!(!path.exists());
    }

    #[test]
    fn test_unrelated_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "mine").unwrap();
        write_entries(dir.path(), &object(json!({ "new.txt": "x" })), false).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "mine");
    }

    #[test]
    fn test_writer_raw_requires_string() {
        let mut buf = Vec::new();
        route(Output::Writer(Box::new(&mut buf)), "\"hello\\n\"".to_string(), false).unwrap();
        assert_eq!(buf, b"hello\n");
        let err = route(Output::Writer(Box::new(Vec::new())), "3".to_string(), false).unwrap_err();
        assert!(matches!(err, Error::NonStringOutput { found: "number" }));
    }

    #[test]
    fn test_value_target_modes() {
        let mut text = String::new();
        route(Output::Value(&mut text), "{\n   \"a\": 1\n}".to_string(), true).unwrap();
        assert_eq!(text, "{\n   \"a\": 1\n}");

        let mut value: Value = Value::Null;
        route(Output::Value(&mut value), "{\"a\": 1}".to_string(), false).unwrap();
        assert_eq!(value, json!({ "a": 1 }));
    }

    #[test]
    fn test_directory_requires_object() {
        let dir = tempfile::tempdir().unwrap();
        let err = route(Output::Directory(dir.path().to_path_buf()), "[1]".to_string(), true).unwrap_err();
        assert!(matches!(err, Error::NonObjectOutput { found: "array", .. }));
    }
}
