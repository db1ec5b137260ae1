use std::sync::{Arc, Weak};

use tracing::debug;

use crate::argument::ArgumentBag;
use crate::callback::CallbackHandle;

pub type NodeId = i32;
pub type FunctionName = String;

/// One UI call, moved to the UI manager as a single value.
#[derive(Debug)]
pub struct InvocationRequest {
    pub root_id: u32,
    pub node_id: NodeId,
    pub name: FunctionName,
    pub arguments: ArgumentBag,
    pub callback: Option<CallbackHandle>,
}

/// Native collaborator that owns nodes and executes named UI functions.
///
/// Implementations may run the function on any thread and deliver the result
/// later through the request's callback handle.
pub trait UiManager: Send + Sync {
    fn call_function(&self, request: InvocationRequest);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome {
    Forwarded,
    Expired,
}

/// Forwards requests through a non-owning handle to the UI manager.
#[derive(Clone)]
pub struct Invoker {
    manager: Weak<dyn UiManager>,
}

impl Invoker {
    pub fn new(manager: Weak<dyn UiManager>) -> Self {
        Self { manager }
    }

    pub fn resolve(&self) -> Option<Arc<dyn UiManager>> {
        self.manager.upgrade()
    }

    pub fn is_expired(&self) -> bool {
        self.manager.strong_count() == 0
    }

    pub fn invoke(&self, request: InvocationRequest) -> InvokeOutcome {
        let Some(manager) = self.resolve() else {
            debug!(
                target: "bridge",
                node_id = request.node_id,
                name = %request.name,
                "ui manager expired, dropping call"
            );
            return InvokeOutcome::Expired;
        };
        manager.call_function(request);
        InvokeOutcome::Forwarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::GenericValue;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(NodeId, FunctionName)>>,
    }

    impl UiManager for Recorder {
        fn call_function(&self, request: InvocationRequest) {
            self.calls
                .lock()
                .unwrap()
                .push((request.node_id, request.name));
        }
    }

    fn request(node_id: NodeId, name: &str) -> InvocationRequest {
        InvocationRequest {
            root_id: 1,
            node_id,
            name: name.to_string(),
            arguments: ArgumentBag::build(GenericValue::Object(Default::default())).unwrap(),
            callback: None,
        }
    }

    #[test]
    fn forwards_while_manager_is_alive() {
        let recorder = Arc::new(Recorder::default());
        let manager: Arc<dyn UiManager> = recorder.clone();
        let invoker = Invoker::new(Arc::downgrade(&manager));

        assert_eq!(invoker.invoke(request(7, "focus")), InvokeOutcome::Forwarded);
        assert_eq!(*recorder.calls.lock().unwrap(), vec![(7, "focus".to_string())]);
    }

    #[test]
    fn expired_manager_is_a_no_op() {
        let recorder = Arc::new(Recorder::default());
        let manager: Arc<dyn UiManager> = recorder.clone();
        let invoker = Invoker::new(Arc::downgrade(&manager));
        drop(manager);
        drop(recorder);

        assert!(invoker.is_expired());
        assert_eq!(invoker.invoke(request(1, "x")), InvokeOutcome::Expired);

        let never_set = Invoker::new(Weak::<Recorder>::new());
        assert!(never_set.is_expired());
        assert_eq!(never_set.invoke(request(1, "x")), InvokeOutcome::Expired);
    }
}
