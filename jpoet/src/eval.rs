//! Evaluation builder
//!
//! Collects input, importers, native functions, plugins and the output sink,
//! then runs a single evaluation. Configuration problems are recorded and
//! reported at `eval()`, after every owned plugin has been closed.

use crate::config;
use crate::importer::{CompoundImporter, FileImporter, FileTree, FsImporter, MemoryImporter};
use crate::output::{self, Output, ValueTarget};
use crate::plugin::{CloserFunction, Plugin};
use jpoet_core::{Contents, Error, Importer, NativeFunction, Result};
use jpoet_plugin::Client;
use jpoet_vm::{Expr, Vm};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// The program to evaluate
#[derive(Debug, Clone)]
pub enum Input {
    Snippet { filename: String, snippet: String },
    File(String),
    Tree(Expr),
}

pub struct Eval<'a> {
    vm: Vm,
    importers: Vec<Box<dyn Importer>>,
    contents: BTreeMap<String, Contents>,
    closers: Vec<Box<dyn CloserFunction>>,
    input: Option<Input>,
    output: Output<'a>,
    serialize: bool,
    errs: Vec<Error>,
}

impl Default for Eval<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Eval<'a> {
    /// Defaults: serialized output to stdout
    pub fn new() -> Self {
        Self {
            vm: Vm::new(),
            importers: Vec::new(),
            contents: BTreeMap::new(),
            closers: Vec::new(),
            input: None,
            output: Output::default(),
            serialize: true,
            errs: Vec::new(),
        }
    }

    // ========== Input ==========

    /// Set the input; replaces any previously set input
    pub fn input(mut self, input: Input) -> Self {
        self.input = Some(input);
        self
    }

    pub fn snippet_input(self, filename: impl Into<String>, snippet: impl Into<String>) -> Self {
        self.input(Input::Snippet { filename: filename.into(), snippet: snippet.into() })
    }

    pub fn file_input(self, filename: impl Into<String>) -> Self {
        self.input(Input::File(filename.into()))
    }

    pub fn tree_input(self, tree: Expr) -> Self {
        self.input(Input::Tree(tree))
    }

    // ========== Imports ==========

    /// Append an importer to the fallback chain
    pub fn importer(mut self, importer: impl Importer + 'static) -> Self {
        self.importers.push(Box::new(importer));
        self
    }

    /// Local filesystem with search paths
    pub fn file_import<P: Into<PathBuf>>(self, jpaths: impl IntoIterator<Item = P>) -> Self {
        self.importer(FileImporter::new(jpaths))
    }

    pub fn fs_import(self, tree: impl FileTree + 'static) -> Self {
        self.importer(FsImporter::new(tree))
    }

    /// Stage an in-memory module. All staged modules form one importer placed
    /// last in the chain when `eval()` runs.
    pub fn string_import(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.contents.insert(path.into(), Contents::new(contents));
        self
    }

    // ========== Native Functions ==========

    pub fn native_function(mut self, function: NativeFunction) -> Self {
        self.vm.native_function(function);
        self
    }

    pub fn plugin(self, plugin: &Plugin) -> Self {
        self.native_function(plugin.native_function())
    }

    /// Register the function and take ownership of closing it
    pub fn closer_function(mut self, closer: impl CloserFunction + 'static) -> Self {
        self.vm.native_function(closer.function());
        self.closers.push(Box::new(closer));
        self
    }

    /// Start every plugin under `dir`, found at `<dir>/<name>/<name>`.
    ///
    /// A missing directory registers nothing. A plugin that fails to start
    /// is recorded as an error and does not stop its siblings.
    pub fn plugins_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let names = match read_entries(dir) {
            Ok(names) => names,
            Err(e) => {
                self.errs.push(e);
                return self;
            }
        };
        for name in names {
            match Client::new(dir.join(&name).join(&name)) {
                Ok(client) => {
                    tracing::debug!(plugin = client.name(), "plugin loaded");
                    self = self.closer_function(client);
                }
                Err(e) => {
                    tracing::warn!(entry = %name, error = %e, "plugin failed to start");
                    self.errs.push(e.into());
                }
            }
        }
        self
    }

    /// Load plugins from the project's `.jpoet/plugins` directory
    pub fn context_dir(self, dir: impl AsRef<Path>) -> Self {
        self.plugins_dir(config::plugins_dir(dir))
    }

    // ========== Top-level Arguments ==========

    pub fn tla_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vm.tla_var(name, value);
        self
    }

    pub fn tla_code(mut self, name: impl Into<String>, code: impl Into<String>) -> Self {
        self.vm.tla_code(name, code);
        self
    }

    pub fn tla_node(mut self, name: impl Into<String>, node: Expr) -> Self {
        self.vm.tla_node(name, node);
        self
    }

    // ========== Output ==========

    pub fn output(mut self, output: Output<'a>) -> Self {
        self.output = output;
        self
    }

    pub fn writer_output(self, writer: impl Write + 'a) -> Self {
        self.output(Output::Writer(Box::new(writer)))
    }

    pub fn value_output(self, target: &'a mut dyn ValueTarget) -> Self {
        self.output(Output::Value(target))
    }

    pub fn directory_output(self, dir: impl Into<PathBuf>) -> Self {
        self.output(Output::Directory(dir.into()))
    }

    /// `true` (default) delivers JSON text; `false` delivers decoded values
    /// and requires string leaves for writer and directory output.
    pub fn serialize(mut self, serialize: bool) -> Self {
        self.serialize = serialize;
        self
    }

    // ========== Evaluation ==========

    /// Evaluate and route the result, then close every owned plugin.
    ///
    /// Every failure, including ones recorded while configuring and while
    /// closing, is returned together as `Error::Aggregate`.
    pub fn eval(self) -> Result<()> {
        let Eval { mut vm, mut importers, contents, closers, input, output, serialize, mut errs } = self;

        let result = match input {
            None => Err(Error::MissingInput),
            Some(input) => {
                if !contents.is_empty() {
                    importers.push(Box::new(MemoryImporter::new(contents)));
                }
                if importers.is_empty() {
                    vm.importer(Box::new(FileImporter::default()));
                } else {
                    vm.importer(Box::new(CompoundImporter::new(importers)));
                }
                evaluate(&vm, input).and_then(|json| output::route(output, json, serialize))
            }
        };
        if let Err(e) = result {
            errs.push(e);
        }

        for closer in &closers {
            if let Err(e) = closer.close() {
                errs.push(e);
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errs))
        }
    }
}

fn evaluate(vm: &Vm, input: Input) -> Result<String> {
    let json = match input {
        Input::Snippet { filename, snippet } => vm.evaluate_snippet(&filename, &snippet)?,
        Input::File(filename) => vm.evaluate_file(&filename)?,
        Input::Tree(tree) => vm.evaluate(&tree)?,
    };
    Ok(json)
}

/// Sorted entry names of `dir`; a missing directory has none.
fn read_entries(dir: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(format!("failed to read plugins dir {}", dir.display()), e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(format!("failed to read plugins dir {}", dir.display()), e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingCloser {
        name: &'static str,
        closes: Rc<Cell<usize>>,
        fail: bool,
    }

    impl CloserFunction for CountingCloser {
        fn function(&self) -> NativeFunction {
            NativeFunction::new(self.name, &[], |_: &[Value]| Ok(json!(true)))
        }

        fn close(&self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            if self.fail {
                return Err(Error::io("close failed", io::Error::new(io::ErrorKind::Other, self.name)));
            }
            Ok(())
        }
    }

    fn closer(name: &'static str, fail: bool) -> (CountingCloser, Rc<Cell<usize>>) {
        let closes = Rc::new(Cell::new(0));
        (CountingCloser { name, closes: closes.clone(), fail }, closes)
    }

    #[test]
    fn test_missing_input_still_closes() {
        let (a, closes) = closer("a", false);
        let err = Eval::new().closer_function(a).eval().unwrap_err();
        assert_eq!(err.causes().len(), 1);
        assert!(matches!(err.causes()[0], Error::MissingInput));
        assert_eq!(err.to_string(), "failed to evaluate Jsonnet: missing input");
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn test_every_closer_closed_once_on_success() {
        let (a, a_closes) = closer("a", false);
        let (b, b_closes) = closer("b", false);
        let mut out = String::new();
        Eval::new()
            .closer_function(a)
            .closer_function(b)
            .snippet_input("main.jsonnet", "std.native('a')()")
            .value_output(&mut out)
            .eval()
            .unwrap();
        assert_eq!(out, "true");
        assert_eq!((a_closes.get(), b_closes.get()), (1, 1));
    }

    #[test]
    fn test_close_errors_are_aggregated() {
        let (a, a_closes) = closer("a", true);
        let (b, b_closes) = closer("b", true);
        let err = Eval::new()
            .closer_function(a)
            .closer_function(b)
            .snippet_input("main.jsonnet", "error 'bad'")
            .writer_output(Vec::new())
            .eval()
            .unwrap_err();
        assert_eq!(err.causes().len(), 3);
        assert!(matches!(err.causes()[0], Error::Evaluation(_)));
        assert_eq!((a_closes.get(), b_closes.get()), (1, 1));
    }

    #[test]
    fn test_last_input_wins() {
        let mut out = String::new();
        Eval::new()
            .file_input("does-not-exist.jsonnet")
            .snippet_input("main.jsonnet", "{ a: 1 }")
            .value_output(&mut out)
            .eval()
            .unwrap();
        assert_eq!(out, "{\n   \"a\": 1\n}");
    }

    #[test]
    fn test_string_imports_are_last_in_chain() {
        let mut out = String::new();
        Eval::new()
            .importer(MemoryImporter::new(BTreeMap::from([(
                "lib.libsonnet".to_string(),
                Contents::from("'first'"),
            )])))
            .string_import("lib.libsonnet", "'staged'")
            .string_import("other.libsonnet", "'other'")
            .snippet_input("main.jsonnet", "[import 'lib.libsonnet', import 'other.libsonnet']")
            .value_output(&mut out)
            .eval()
            .unwrap();
        assert_eq!(out, "[\n   \"first\",\n   \"other\"\n]");
    }

    #[test]
    fn test_raw_value_output() {
        let mut value = Value::Null;
        Eval::new()
            .snippet_input("main.jsonnet", "{ n: 1 + 2, s: 'x' }")
            .serialize(false)
            .value_output(&mut value)
            .eval()
            .unwrap();
        assert_eq!(value, json!({ "n": 3, "s": "x" }));
    }

    #[test]
    fn test_raw_writer_output() {
        let mut buf = Vec::new();
        Eval::new()
            .snippet_input("main.jsonnet", "'line one\\nline two\\n'")
            .serialize(false)
            .writer_output(&mut buf)
            .eval()
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "line one\nline two\n");
    }

    #[test]
    fn test_tla_and_in_process_plugin() {
        let plugin = Plugin::from_functions(
            "math",
            vec![NativeFunction::new("double", &["x"], |args: &[Value]| {
                Ok(json!(args.first().and_then(Value::as_f64).unwrap_or(0.0) * 2.0))
            })],
        );
        let mut out = String::new();
        Eval::new()
            .plugin(&plugin)
            .tla_code("n", "20 + 1")
            .snippet_input("main.jsonnet", "function(n) std.native('invoke:math')('double', [n])")
            .value_output(&mut out)
            .eval()
            .unwrap();
        assert_eq!(out, "42");
    }

    #[test]
    fn test_missing_plugins_dir_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = String::new();
        Eval::new()
            .context_dir(dir.path())
            .snippet_input("main.jsonnet", "std.native('invoke:math')")
            .value_output(&mut out)
            .eval()
            .unwrap();
        assert_eq!(out, "null");
    }

    #[test]
    fn test_bad_plugin_entry_is_deferred() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = config::plugins_dir(dir.path());
        fs::create_dir_all(plugins.join("math")).unwrap();
        let mut out = String::new();
        let err = Eval::new()
            .context_dir(dir.path())
            .snippet_input("main.jsonnet", "1 + 1")
            .value_output(&mut out)
            .eval()
            .unwrap_err();
        // The evaluation itself still ran
        assert_eq!(out, "2");
        assert_eq!(err.causes().len(), 1);
        assert!(err.to_string().contains("plugin path does not start with jsonnet-plugin"));
    }
}
