//! Host side of the plugin bridge
//!
//! A `Client` owns one plugin child process. Calls are serialized over the
//! child's stdin/stdout; the child's stderr is forwarded to `tracing`.

use crate::handshake::{self, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, START_TIMEOUT};
use crate::invoker::{invoke_function, Invoker};
use crate::wire::{Request, Response};
use jpoet_core::{NativeError, NativeFunction, PluginError};
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;

/// A running plugin, ready for calls until closed
pub struct Client {
    name: String,
    pid: u32,
    connection: Arc<Connection>,
}

struct Connection {
    plugin: String,
    process: Mutex<Process>,
}

struct Process {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
    next_id: u64,
    closed: bool,
}

impl Client {
    /// Launch the plugin at `path` and complete the handshake.
    ///
    /// The executable's base name must start with `jsonnet-plugin-`; the rest
    /// is the plugin name. On any failure after spawning, the child is killed
    /// and reaped before returning.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|base| base.to_str())
            .and_then(handshake::plugin_name)
            .ok_or_else(|| PluginError::InvalidName {
                prefix: "jsonnet-plugin",
                path: path.to_path_buf(),
            })?
            .to_string();

        tracing::debug!(plugin = %name, path = %path.display(), "starting plugin");
        let mut child = Command::new(path)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PluginError::Spawn { path: path.to_path_buf(), source })?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                reap(&mut child);
                return Err(PluginError::Handshake {
                    plugin: name,
                    message: "plugin stdio was not captured".to_string(),
                });
            }
        };

        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let log_name = name.clone();
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                tracing::debug!(plugin = %log_name, "{}", line);
            }
        });

        let handshake = match lines.recv_timeout(START_TIMEOUT) {
            Ok(line) => handshake::check_handshake(&line),
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "timed out after {}s waiting for handshake",
                START_TIMEOUT.as_secs()
            )),
            Err(RecvTimeoutError::Disconnected) => Err("plugin exited before completing handshake".to_string()),
        };
        if let Err(message) = handshake {
            reap(&mut child);
            return Err(PluginError::Handshake { plugin: name, message });
        }
        tracing::debug!(plugin = %name, "plugin ready");

        Ok(Self {
            pid: child.id(),
            connection: Arc::new(Connection {
                plugin: name.clone(),
                process: Mutex::new(Process { child, stdin, lines, next_id: 0, closed: false }),
            }),
            name,
        })
    }

    /// Logical plugin name, the executable name without its prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process id of the plugin child
    pub fn id(&self) -> u32 {
        self.pid
    }

    /// Call `func_name` inside the plugin
    pub fn invoke(&self, func_name: &str, args: Vec<Value>) -> Result<Value, PluginError> {
        self.connection.call(func_name, args)
    }

    /// The `invoke:<name>` native function backed by this plugin
    pub fn function(&self) -> NativeFunction {
        invoke_function(&self.name, self.connection.clone())
    }

    /// Kill the plugin. Calling again is a no-op.
    pub fn close(&self) -> Result<(), PluginError> {
        self.connection.close()
    }
}

impl Connection {
    fn transport(&self, message: impl Into<String>) -> PluginError {
        PluginError::Transport { plugin: self.plugin.clone(), message: message.into() }
    }

    fn call(&self, func_name: &str, args: Vec<Value>) -> Result<Value, PluginError> {
        let mut process = self
            .process
            .lock()
            .map_err(|_| self.transport("connection lock poisoned"))?;
        if process.closed {
            return Err(self.transport("plugin is closed"));
        }
        process.next_id += 1;
        let id = process.next_id;

        let mut line = serde_json::to_string(&Request::invoke(id, func_name, args))
            .map_err(|e| self.transport(format!("failed to encode request: {}", e)))?;
        line.push('\n');
        tracing::trace!(plugin = %self.plugin, id, function = func_name, "invoking");
        let stdin = &mut process.stdin;
        stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| self.transport(format!("failed to send request: {}", e)))?;

        loop {
            let line = process
                .lines
                .recv()
                .map_err(|_| self.transport("plugin exited while handling a call"))?;
            let response: Response = serde_json::from_str(&line)
                .map_err(|e| self.transport(format!("malformed response: {}", e)))?;
            match (response.id, response.error) {
                (Some(got), _) if got != id => {
                    tracing::warn!(plugin = %self.plugin, expected = id, got, "discarding stale response");
                }
                (Some(_), Some(error)) => return Err(PluginError::Remote { message: error.message }),
                (Some(_), None) => return Ok(response.result.unwrap_or(Value::Null)),
                (None, error) => {
                    let message = error.map(|e| e.message).unwrap_or_else(|| "response without id".to_string());
                    return Err(self.transport(message));
                }
            }
        }
    }

    fn close(&self) -> Result<(), PluginError> {
        let mut process = self
            .process
            .lock()
            .map_err(|_| self.transport("connection lock poisoned"))?;
        if process.closed {
            return Ok(());
        }
        process.closed = true;
        tracing::debug!(plugin = %self.plugin, "stopping plugin");
        match process.child.kill() {
            Ok(()) => {}
            // Already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(source) => return Err(PluginError::Kill { plugin: self.plugin.clone(), source }),
        }
        process
            .child
            .wait()
            .map(|_| ())
            .map_err(|source| PluginError::Kill { plugin: self.plugin.clone(), source })
    }
}

impl Invoker for Connection {
    fn invoke(&self, func_name: &str, args: Vec<Value>) -> Result<Value, NativeError> {
        self.call(func_name, args).map_err(NativeError::from)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Ok(process) = self.process.get_mut() {
            if !process.closed {
                process.closed = true;
                reap(&mut process.child);
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_name_without_spawning() {
        // A spawn attempt on this path would fail with Spawn instead
        let err = Client::new("/nonexistent/dir/math").err().unwrap();
        assert!(matches!(err, PluginError::InvalidName { .. }));
        assert!(err.to_string().starts_with("plugin path does not start with jsonnet-plugin"));
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let err = Client::new("/nonexistent/dir/jsonnet-plugin-math").err().unwrap();
        assert!(matches!(err, PluginError::Spawn { .. }));
    }
}
