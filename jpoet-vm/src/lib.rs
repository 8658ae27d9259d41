//! jpoet VM - Embedded evaluator
//!
//! A compact interpreter for the core of the configuration language, exposed
//! through the boundary the pipeline needs: an importer, native functions,
//! top-level arguments, and evaluation of a snippet, a file or a parsed tree.

pub mod ast;
mod eval;
mod format;
mod lexer;
mod parser;
mod render;
mod stdlib;
mod value;
mod worker;

pub use ast::Expr;
pub use eval::{MAX_DEPTH, MAX_STACK};
pub use parser::MAX_NESTING;
pub use worker::STACK_SIZE;

use eval::Interpreter;
use jpoet_core::{EvalError, Importer, NativeFunction};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use value::Val;

/// Parse a program into a tree that can be stored and evaluated later
pub fn parse(file: &str, source: &str) -> Result<Expr, EvalError> {
    worker::run(None, |_| parser::parse(file, source))
}

/// A top-level argument bound to a parameter of a top-level function
#[derive(Debug, Clone)]
pub enum TlaArg {
    /// Bound as a string value
    Var(String),
    /// Evaluated as code
    Code(String),
    /// Evaluated from an already parsed tree
    Node(Expr),
}

/// What one evaluation runs
enum Program<'p> {
    Source { file: &'p str, text: &'p str },
    Tree { file: &'p str, expr: &'p Expr },
}

/// Evaluator configuration; each `evaluate_*` call runs with fresh caches.
#[derive(Default)]
pub struct Vm {
    importer: Option<Box<dyn Importer>>,
    natives: HashMap<String, NativeFunction>,
    tla: BTreeMap<String, TlaArg>,
}

impl Vm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the importer used for `import`, `importstr` and `evaluate_file`
    pub fn importer(&mut self, importer: Box<dyn Importer>) {
        self.importer = Some(importer);
    }

    /// Register a function reachable through `std.native(name)`
    pub fn native_function(&mut self, function: NativeFunction) {
        self.natives.insert(function.name().to_string(), function);
    }

    pub fn tla_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tla.insert(name.into(), TlaArg::Var(value.into()));
    }

    pub fn tla_code(&mut self, name: impl Into<String>, code: impl Into<String>) {
        self.tla.insert(name.into(), TlaArg::Code(code.into()));
    }

    pub fn tla_node(&mut self, name: impl Into<String>, node: Expr) {
        self.tla.insert(name.into(), TlaArg::Node(node));
    }

    pub fn evaluate_snippet(&self, filename: &str, snippet: &str) -> Result<String, EvalError> {
        tracing::debug!(file = filename, "evaluating snippet");
        self.run(Program::Source { file: filename, text: snippet })
    }

    /// Load `filename` through the importer and evaluate it
    pub fn evaluate_file(&self, filename: &str) -> Result<String, EvalError> {
        let importer = self
            .importer
            .as_deref()
            .ok_or_else(|| EvalError::runtime(format!("couldn't open import {:?}: no importer configured", filename)))?;
        let imported = importer
            .import("", filename)
            .map_err(|e| EvalError::runtime(e.to_string()))?;
        let source = imported
            .contents
            .to_str()
            .map_err(|e| EvalError::runtime(format!("{} is not valid UTF-8: {}", imported.found_at, e)))?;
        tracing::debug!(file = %imported.found_at, "evaluating file");
        self.run(Program::Source { file: &imported.found_at, text: source })
    }

    /// Evaluate a parsed tree; imports resolve relative to the working root.
    pub fn evaluate(&self, node: &Expr) -> Result<String, EvalError> {
        tracing::debug!("evaluating tree");
        self.run(Program::Tree { file: "<tree>", expr: node })
    }

    /// Evaluate and manifest on the evaluation thread
    fn run(&self, program: Program<'_>) -> Result<String, EvalError> {
        let natives = &self.natives;
        let tla = &self.tla;
        worker::run(self.importer.as_deref(), move |importer| {
            let interp = Interpreter::new(importer, natives);
            let value = match program {
                Program::Source { file, text } => interp.eval_source(file, text)?,
                Program::Tree { file, expr } => {
                    let file: Rc<str> = Rc::from(file);
                    interp.eval(expr, &interp.root_env(&file), &file)?
                }
            };
            let value = apply_tla(&interp, tla, value)?;
            render::manifest(&interp, &value)
        })
    }
}

/// A top-level function is called with the TLAs as named arguments;
/// any other value is returned unchanged.
fn apply_tla(interp: &Interpreter<'_>, tla: &BTreeMap<String, TlaArg>, value: Val) -> Result<Val, EvalError> {
    if !matches!(value, Val::Func(_)) {
        return Ok(value);
    }
    let mut named = Vec::with_capacity(tla.len());
    for (name, arg) in tla {
        let file = format!("<top-level-arg:{}>", name);
        let arg = match arg {
            TlaArg::Var(s) => Val::str(s),
            TlaArg::Code(code) => interp.eval_source(&file, code)?,
            TlaArg::Node(node) => {
                let file: Rc<str> = Rc::from(file);
                interp.eval(node, &interp.root_env(&file), &file)?
            }
        };
        named.push((name.clone(), arg));
    }
    interp.call(&value, Vec::new(), named)
}
