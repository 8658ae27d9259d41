//! Project layout configuration

use std::path::{Path, PathBuf};

/// Per-project configuration directory
pub const CONFIG_DIR: &str = ".jpoet";

/// Plugin directory inside `CONFIG_DIR`; each plugin lives at
/// `<name>/<name>` below it.
pub const PLUGINS_DIR: &str = "plugins";

/// `<context_dir>/.jpoet/plugins`
pub fn plugins_dir(context_dir: impl AsRef<Path>) -> PathBuf {
    context_dir.as_ref().join(CONFIG_DIR).join(PLUGINS_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugins_dir() {
        assert_eq!(plugins_dir("/work"), PathBuf::from("/work/.jpoet/plugins"));
    }
}
