//! End-to-end evaluation through the public builder

use jpoet::{DirTree, Error, Eval, MapTree, MemoryImporter};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[test]
fn test_memory_import() {
    let mut out = String::new();
    Eval::new()
        .string_import("input/a.jsonnet", "1 + 1")
        .snippet_input("main.jsonnet", "import 'input/a.jsonnet'")
        .value_output(&mut out)
        .eval()
        .unwrap();
    assert_eq!(out, "2");
}

#[test]
fn test_relative_import_from_file_tree() {
    let tree = MapTree::new()
        .with_file("lib/util.libsonnet", "{ twice(x): x * 2 }")
        .with_file("lib/main.jsonnet", "local util = import 'util.libsonnet'; { v: util.twice(21) }");
    let mut value = Value::Null;
    Eval::new()
        .fs_import(tree)
        .snippet_input("entry.jsonnet", "import 'lib/main.jsonnet'")
        .serialize(false)
        .value_output(&mut value)
        .eval()
        .unwrap();
    assert_eq!(value, json!({ "v": 42 }));
}

#[test]
fn test_file_input_with_search_paths() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("vendor")).unwrap();
    fs::write(dir.path().join("vendor/base.libsonnet"), "{ name: 'base' }").unwrap();
    let main = dir.path().join("main.jsonnet");
    fs::write(&main, "(import 'base.libsonnet') + { extra: true }").unwrap();

    let mut value = Value::Null;
    Eval::new()
        .file_import([dir.path().join("vendor")])
        .file_input(main.to_string_lossy())
        .serialize(false)
        .value_output(&mut value)
        .eval()
        .unwrap();
    assert_eq!(value, json!({ "name": "base", "extra": true }));
}

#[test]
fn test_absolute_file_input_behind_dir_tree() {
    let lib = tempfile::tempdir().unwrap();
    fs::write(lib.path().join("base.libsonnet"), "{ name: 'base' }").unwrap();
    let work = tempfile::tempdir().unwrap();
    let main = work.path().join("main.jsonnet");
    fs::write(&main, "(import 'base.libsonnet') + { extra: true }").unwrap();

    let mut value = Value::Null;
    Eval::new()
        .fs_import(DirTree::new(lib.path()))
        .file_import(Vec::<PathBuf>::new())
        .file_input(main.to_string_lossy())
        .serialize(false)
        .value_output(&mut value)
        .eval()
        .unwrap();
    assert_eq!(value, json!({ "name": "base", "extra": true }));
}

#[test]
fn test_missing_import_reports_evaluation_error() {
    let err = Eval::new()
        .importer(MemoryImporter::new(BTreeMap::new()))
        .snippet_input("main.jsonnet", "import 'nope.jsonnet'")
        .writer_output(Vec::new())
        .eval()
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to evaluate Jsonnet: "));
    assert!(err.to_string().contains("nope.jsonnet"));
    assert!(matches!(err.causes(), [Error::Evaluation(_)]));
}

#[test]
fn test_directory_output_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let program = "{ 'README.md': '# hi\\n', config: { 'app.yaml': 'port: 80\\n' } }";
    for _ in 0..2 {
        Eval::new()
            .snippet_input("main.jsonnet", program)
            .serialize(false)
            .directory_output(dir.path())
            .eval()
            .unwrap();
    }
    assert_eq!(fs::read_to_string(dir.path().join("README.md")).unwrap(), "# hi\n");
    assert_eq!(fs::read_to_string(dir.path().join("config/app.yaml")).unwrap(), "port: 80\n");
}

#[test]
fn test_directory_output_serialized_leaves() {
    let dir = tempfile::tempdir().unwrap();
    Eval::new()
        .snippet_input("main.jsonnet", "{ 'a.json': { x: 1 }.x, 'b.json': [1, 'two'] }")
        .directory_output(dir.path())
        .eval()
        .unwrap();
    assert_eq!(fs::read_to_string(dir.path().join("a.json")).unwrap(), "1");
    assert_eq!(fs::read_to_string(dir.path().join("b.json")).unwrap(), "[1,\"two\"]");
}

#[test]
fn test_raw_directory_output_rejects_number_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let err = Eval::new()
        .snippet_input("main.jsonnet", "{ sub: { 'count.txt': 3 } }")
        .serialize(false)
        .directory_output(dir.path())
        .eval()
        .unwrap_err();
    let path = dir.path().join("sub").join("count.txt");
    assert!(matches!(err.causes(), [Error::NonStringLeaf { found: "number", .. }]));
    assert!(err.to_string().contains(&path.display().to_string()));
    assert!(!path.exists());
}

#[test]
fn test_tla_var_passed_to_top_level_function() {
    let mut out = String::new();
    Eval::new()
        .tla_var("who", "world")
        .snippet_input("main.jsonnet", "function(who) 'hello ' + who")
        .serialize(false)
        .value_output(&mut out)
        .eval()
        .unwrap();
    assert_eq!(out, "hello world");
}

#[test]
fn test_tree_input() {
    let tree = jpoet::parse("tree.jsonnet", "[1, 2, 3]").unwrap();
    let mut value = Value::Null;
    Eval::new()
        .tree_input(tree)
        .serialize(false)
        .value_output(&mut value)
        .eval()
        .unwrap();
    assert_eq!(value, json!([1, 2, 3]));
}
