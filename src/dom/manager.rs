use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use anyhow::{Context as AnyhowContext, Result};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, error, warn};

use crate::argument::ArgumentBag;
use crate::invoker::{InvocationRequest, NodeId, UiManager};
use crate::value::GenericValue;

/// Handler for one named UI function. `Ok(None)` means the function has no
/// result; the callback is released without being invoked.
pub type UiFunction =
    Box<dyn Fn(NodeId, &ArgumentBag) -> Result<Option<GenericValue>, String> + Send + Sync>;

/// UI manager that executes requests on a dedicated render thread.
///
/// Requests are queued in arrival order and results are delivered from the
/// render thread, never from the caller's.
pub struct ThreadedUiManager {
    tx: Mutex<Option<UnboundedSender<InvocationRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
pub struct ThreadedUiManagerBuilder {
    functions: HashMap<String, UiFunction>,
    thread_name: Option<String>,
}

impl ThreadedUiManagerBuilder {
    pub fn function<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(NodeId, &ArgumentBag) -> Result<Option<GenericValue>, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(handler));
        self
    }

    pub fn thread_name(mut self, name: &str) -> Self {
        self.thread_name = Some(name.to_string());
        self
    }

    pub fn spawn(self) -> Result<ThreadedUiManager> {
        let (tx, mut rx) = unbounded_channel::<InvocationRequest>();
        let functions = self.functions;
        let name = self.thread_name.unwrap_or_else(|| "ui-render".to_string());

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || {
                while let Some(request) = rx.blocking_recv() {
                    execute(&functions, request);
                }
                debug!(target: "bridge", "ui render thread stopped");
            })
            .context("failed to spawn ui render thread")?;

        Ok(ThreadedUiManager {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }
}

fn execute(functions: &HashMap<String, UiFunction>, request: InvocationRequest) {
    let InvocationRequest {
        root_id,
        node_id,
        name,
        arguments,
        callback,
    } = request;

    let Some(function) = functions.get(&name) else {
        warn!(target: "bridge", root_id, node_id, name = %name, "unknown UI function");
        return;
    };

    match function(node_id, &arguments) {
        Ok(Some(result)) => {
            if let Some(callback) = callback {
                callback.deliver(result);
            }
        }
        Ok(None) => {}
        Err(message) => {
            error!(target: "bridge", root_id, node_id, name = %name, %message, "UI function failed");
        }
    }
}

impl ThreadedUiManager {
    pub fn builder() -> ThreadedUiManagerBuilder {
        ThreadedUiManagerBuilder::default()
    }

    /// Stop accepting requests and wait for queued ones to finish.
    pub fn shutdown(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!(target: "bridge", "ui render thread panicked");
            }
        }
    }
}

impl UiManager for ThreadedUiManager {
    fn call_function(&self, request: InvocationRequest) {
        let Ok(tx) = self.tx.lock() else {
            return;
        };
        match tx.as_ref() {
            Some(tx) => {
                if tx.send(request).is_err() {
                    warn!(target: "bridge", "ui render thread gone, dropping call");
                }
            }
            None => debug!(target: "bridge", "ui manager shut down, dropping call"),
        }
    }
}

impl Drop for ThreadedUiManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    fn bag(value: GenericValue) -> ArgumentBag {
        ArgumentBag::build(value).unwrap()
    }

    #[test]
    fn runs_functions_on_the_render_thread() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let seen_tx = Mutex::new(seen_tx);
        let manager = ThreadedUiManager::builder()
            .thread_name("test-render")
            .function("probe", move |node_id, args| {
                let thread = thread::current().name().map(str::to_string);
                seen_tx
                    .lock()
                    .unwrap()
                    .send((thread, node_id, args.get("value").cloned()))
                    .unwrap();
                Ok(None)
            })
            .spawn()
            .unwrap();

        manager.call_function(InvocationRequest {
            root_id: 1,
            node_id: 9,
            name: "probe".to_string(),
            arguments: bag([("value", GenericValue::from(3))].into_iter().collect()),
            callback: None,
        });

        let (thread, node_id, value) = seen_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(thread.as_deref(), Some("test-render"));
        assert_eq!(node_id, 9);
        assert_eq!(value, Some(GenericValue::Number(3.0)));
    }

    #[test]
    fn calls_after_shutdown_are_ignored() {
        let manager = Arc::new(ThreadedUiManager::builder().spawn().unwrap());
        manager.shutdown();
        manager.call_function(InvocationRequest {
            root_id: 1,
            node_id: 1,
            name: "missing".to_string(),
            arguments: ArgumentBag::default(),
            callback: None,
        });
    }
}
