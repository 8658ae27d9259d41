//! Evaluation thread
//!
//! Evaluation recurses with the depth of the program, so it runs on a thread
//! with a large stack. The importer stays on the calling thread and imports
//! are forwarded to it over a channel.

use jpoet_core::{EvalError, ImportError, Imported, Importer};
use std::panic;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

/// Stack reserved for the evaluation thread
pub const STACK_SIZE: usize = 256 * 1024 * 1024;

struct Request {
    from: String,
    path: String,
}

/// Importer used on the evaluation thread
struct ForwardingImporter {
    requests: Sender<Request>,
    replies: Receiver<Result<Imported, ImportError>>,
}

impl Importer for ForwardingImporter {
    fn import(&self, from: &str, path: &str) -> Result<Imported, ImportError> {
        let request = Request { from: from.to_string(), path: path.to_string() };
        let lost = || ImportError::NotAvailable { path: path.to_string() };
        self.requests.send(request).map_err(|_| lost())?;
        self.replies.recv().map_err(|_| lost())?
    }
}

/// Run `work` on the evaluation thread, serving its imports from `importer`
pub fn run<T, F>(importer: Option<&dyn Importer>, work: F) -> Result<T, EvalError>
where
    T: Send,
    F: FnOnce(Option<&dyn Importer>) -> Result<T, EvalError> + Send,
{
    let (request_tx, request_rx) = mpsc::channel::<Request>();
    let (reply_tx, reply_rx) = mpsc::channel();
    let forward = importer.is_some();
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    thread::scope(|scope| {
        let handle = thread::Builder::new()
            .name("jpoet-eval".to_string())
            .stack_size(STACK_SIZE)
            .spawn_scoped(scope, move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    let forwarding = ForwardingImporter { requests: request_tx, replies: reply_rx };
                    work(if forward { Some(&forwarding as &dyn Importer) } else { None })
                })
            })
            .map_err(|e| EvalError::runtime(format!("couldn't start evaluation thread: {}", e)))?;
        if let Some(importer) = importer {
            // Ends once the evaluation thread drops its sender
            for request in request_rx {
                let reply = importer.import(&request.from, &request.path);
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
        }
        match handle.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpoet_core::Contents;
    use std::cell::RefCell;

    /// Single-threaded importer recording the requests it served
    #[derive(Default)]
    struct Recording(RefCell<Vec<String>>);

    impl Importer for Recording {
        fn import(&self, from: &str, path: &str) -> Result<Imported, ImportError> {
            self.0.borrow_mut().push(format!("{}:{}", from, path));
            if path == "missing" {
                return Err(ImportError::not_found(path));
            }
            Ok(Imported::new(Contents::from(path), path.to_string()))
        }
    }

    #[test]
    fn test_imports_are_served_on_calling_thread() {
        let importer = Recording::default();
        let found = run(Some(&importer as &dyn Importer), |importer| {
            let importer = importer.ok_or_else(|| EvalError::runtime("no importer"))?;
            let first = importer.import("main", "a").map_err(|e| EvalError::runtime(e.to_string()))?;
            let missing = importer.import("main", "missing");
            assert!(missing.is_err_and(|e| e.is_not_found()));
            Ok(first.found_at)
        })
        .unwrap();
        assert_eq!(found, "a");
        assert_eq!(*importer.0.borrow(), vec!["main:a".to_string(), "main:missing".to_string()]);
    }

    #[test]
    fn test_without_importer() {
        let seen = run(None, |importer| Ok(importer.is_none())).unwrap();
        assert!(seen);
    }

    #[test]
    fn test_errors_are_returned() {
        let err = run(None, |_| -> Result<(), EvalError> { Err(EvalError::runtime("failed")) }).unwrap_err();
        assert_eq!(err.message, "failed");
    }
}
