//! jpoet - Jsonnet evaluation pipeline
//!
//! Configure an [`Eval`] with an input, importers, native functions and
//! plugins, and an output sink, then call [`Eval::eval`]:
//!
//! ```no_run
//! let mut out = String::new();
//! jpoet::Eval::new()
//!     .string_import("lib.libsonnet", "{ greeting: 'hi' }")
//!     .snippet_input("main.jsonnet", "(import 'lib.libsonnet').greeting")
//!     .value_output(&mut out)
//!     .eval()?;
//! # Ok::<(), jpoet::Error>(())
//! ```
//!
//! Plugin executables call [`serve`] with their functions.

pub mod config;
mod eval;
pub mod importer;
pub mod output;
mod plugin;

pub use eval::{Eval, Input};
pub use importer::{CompoundImporter, DirTree, FileImporter, FileTree, FsImporter, MapTree, MemoryImporter};
pub use output::{Output, ValueTarget};
pub use plugin::{CloserFunction, Plugin};

pub use jpoet_core::{Contents, Error, Imported, Importer, NativeError, NativeFunction, PluginError, Result};
pub use jpoet_plugin::{serve, Client};
pub use jpoet_vm::{parse, Expr};
