//! jpoet Core - Fundamental types
//!
//! This crate provides the types shared by the evaluator, the plugin bridge
//! and the evaluation pipeline:
//! - `Error`: structured, aggregatable errors
//! - `Importer`: the module resolution contract
//! - `NativeFunction`: host-implemented functions callable from evaluated code

mod error;
mod import;
mod native;

pub use error::{
    codes, EvalError, EvalErrorKind, Error, ImportError, Location, NativeError, PluginError,
    Result,
};
pub use import::{clean_path, join_relative, Contents, Imported, Importer};
pub use native::{NativeFn, NativeFunction};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Contents, Error, ImportError, Imported, Importer, NativeError, NativeFunction,
    };
    pub use serde_json::Value;
}
