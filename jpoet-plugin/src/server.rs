//! Plugin side of the bridge
//!
//! Prints the handshake line, then answers one request per stdin line until
//! the host closes the pipe or kills the process.

use crate::handshake::{self, INVOKE_METHOD};
use crate::invoker::{FunctionInvoker, Invoker};
use crate::wire::{codes, Request, Response};
use jpoet_core::NativeFunction;
use std::io::{self, BufRead, Write};

pub struct Server {
    invoker: FunctionInvoker,
}

impl Server {
    pub fn new(functions: Vec<NativeFunction>) -> Self {
        Self { invoker: FunctionInvoker::new(functions) }
    }

    /// Serve the host over this process's stdin/stdout
    pub fn serve(&self) -> io::Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve_io(stdin.lock(), stdout.lock())
    }

    /// Handshake and request loop over arbitrary streams
    pub fn serve_io<R: BufRead, W: Write>(&self, mut reader: R, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", handshake::handshake_line())?;
        writer.flush()?;
        tracing::info!(functions = self.invoker.function_names(), "plugin serving");

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                tracing::debug!("host disconnected");
                return Ok(());
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Request>(line) {
                Ok(request) => self.handle(request),
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable request");
                    Response::failure(None, codes::PARSE_ERROR, format!("Parse error: {}", e))
                }
            };
            let encoded = serde_json::to_string(&response)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{}", encoded)?;
            writer.flush()?;
        }
    }

    fn handle(&self, request: Request) -> Response {
        if request.method != INVOKE_METHOD {
            return Response::failure(
                Some(request.id),
                codes::METHOD_NOT_FOUND,
                format!("unknown method: {}", request.method),
            );
        }
        let func_name = request.params.func_name;
        tracing::debug!(function = %func_name, "invoke");
        match self.invoker.invoke(&func_name, request.params.args) {
            Ok(value) => Response::success(request.id, value),
            Err(e) => Response::failure(Some(request.id), codes::INVOKE_FAILED, e.message),
        }
    }
}

/// Entry point for plugin executables.
///
/// Refuses to run unless launched by a host (the magic cookie is set), then
/// serves until the host goes away.
pub fn serve(functions: Vec<NativeFunction>) {
    crate::logging::init();
    if !handshake::cookie_present() {
        eprintln!(
            "This binary is a plugin. These are not meant to be executed directly. \
             Please execute the program that consumes these plugins, which will \
             load any plugins automatically"
        );
        std::process::exit(1);
    }
    if let Err(e) = Server::new(functions).serve() {
        tracing::error!(error = %e, "plugin server failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpoet_core::NativeError;
    use serde_json::{json, Value};
    use std::io::Cursor;

    fn server() -> Server {
        Server::new(vec![
            NativeFunction::new("echo", &["x"], |args: &[Value]| Ok(args.first().cloned().unwrap_or(Value::Null))),
            NativeFunction::new("fail", &[], |_: &[Value]| Err(NativeError::new("nope"))),
        ])
    }

    fn run(input: &str) -> Vec<String> {
        let mut out = Vec::new();
        server().serve_io(Cursor::new(input.as_bytes()), &mut out).unwrap();
        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn test_handshake_comes_first() {
        let lines = run("");
        assert_eq!(lines, vec!["1|1|stdio|jsonrpc".to_string()]);
    }

    #[test]
    fn test_invoke_round_trip() {
        let request = serde_json::to_string(&Request::invoke(1, "echo", vec![json!({"a": 1})])).unwrap();
        let lines = run(&format!("{}\n", request));
        let response: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"], json!({"a": 1}));
    }

    #[test]
    fn test_unknown_function_and_errors() {
        let requests = [
            serde_json::to_string(&Request::invoke(1, "missing", vec![])).unwrap(),
            serde_json::to_string(&Request::invoke(2, "fail", vec![])).unwrap(),
        ];
        let lines = run(&format!("{}\n\n{}\n", requests[0], requests[1]));
        let first: Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(
            first["error"]["message"],
            json!("no such function: missing, available functions: echo, fail")
        );
        let second: Value = serde_json::from_str(&lines[2]).unwrap();
        assert_eq!(second["error"]["message"], json!("nope"));
    }

    #[test]
    fn test_parse_error_has_no_id() {
        let lines = run("not json\n");
        let response: Value = serde_json::from_str(&lines[1]).unwrap();
        assert!(response.get("id").is_none());
        assert_eq!(response["error"]["code"], json!(codes::PARSE_ERROR));
    }
}
