use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use rquickjs::{Ctx, Function, Persistent};
use tracing::{debug, trace, warn};

use crate::runner::TaskRunner;
use crate::value::GenericValue;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Liveness marker for one script context. The scope holds the only strong
/// reference and drops it when the context is torn down.
#[derive(Debug)]
pub struct ContextToken {
    id: u64,
}

impl ContextToken {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Script functions waiting for a result, keyed by id.
///
/// Lives next to the context that created the functions and is dropped before
/// it, so no persistent reference outlives its runtime.
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: u64,
    entries: HashMap<CallbackId, Persistent<Function<'static>>>,
}

impl CallbackRegistry {
    pub fn register<'js>(&mut self, ctx: &Ctx<'js>, function: Function<'js>) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.entries.insert(id, Persistent::save(ctx, function));
        id
    }

    pub fn take(&mut self, id: CallbackId) -> Option<Persistent<Function<'static>>> {
        self.entries.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallbackState {
    Created = 0,
    Armed = 1,
    Delivered = 2,
    Dropped = 3,
    Failed = 4,
}

impl CallbackState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Armed,
            2 => Self::Delivered,
            3 => Self::Dropped,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Dropped | Self::Failed)
    }
}

struct CallbackShared {
    id: CallbackId,
    context: Weak<ContextToken>,
    runner: Weak<TaskRunner>,
    state: AtomicU8,
}

impl CallbackShared {
    fn state(&self) -> CallbackState {
        CallbackState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: CallbackState, to: CallbackState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Drop for CallbackShared {
    fn drop(&mut self) {
        if self.state() != CallbackState::Created {
            return;
        }
        // Never delivered: free the registry slot on the script thread.
        let Some(runner) = self.runner.upgrade() else {
            return;
        };
        let context = self.context.clone();
        let id = self.id;
        runner.post_task(move |scope| scope.release_callback(&context, id));
    }
}

/// Result callback handed to the UI manager with a request.
///
/// The handle owns nothing it points at. The context is observed through a
/// `Weak<ContextToken>`, the script function through a [`CallbackId`] into the
/// scope's [`CallbackRegistry`] and the runner through a `Weak<TaskRunner>`.
/// All of them are re-checked when the posted task runs on the script thread;
/// anything gone by then settles the delivery as [`CallbackState::Dropped`].
///
/// Clones share one state machine, so however many copies race to
/// [`deliver`](Self::deliver), at most one result reaches the script.
#[derive(Clone)]
pub struct CallbackHandle {
    shared: Arc<CallbackShared>,
}

impl CallbackHandle {
    pub(crate) fn new(
        context: Weak<ContextToken>,
        function: CallbackId,
        runner: Weak<TaskRunner>,
    ) -> Self {
        Self {
            shared: Arc::new(CallbackShared {
                id: function,
                context,
                runner,
                state: AtomicU8::new(CallbackState::Created as u8),
            }),
        }
    }

    pub fn state(&self) -> CallbackState {
        self.shared.state()
    }

    /// Hand a result to the script side. Safe to call from any thread.
    ///
    /// The result is captured immediately and a task is posted to the scope's
    /// runner; script code never runs on the calling thread. Returns `false`
    /// when the handle had already been delivered.
    pub fn deliver(&self, result: GenericValue) -> bool {
        if !self
            .shared
            .transition(CallbackState::Created, CallbackState::Armed)
        {
            warn!(target: "bridge", "callback already delivered, ignoring result");
            return false;
        }

        let delivery = PendingDelivery {
            context: self.shared.context.clone(),
            function: self.shared.id,
            result,
            shared: Arc::clone(&self.shared),
            settled: false,
        };

        match self.shared.runner.upgrade() {
            Some(runner) => {
                if !runner.post_task(move |scope| delivery.run(scope)) {
                    debug!(target: "bridge", "task runner closed, callback dropped");
                }
            }
            None => {
                debug!(target: "bridge", "task runner expired, callback dropped");
                drop(delivery);
            }
        }
        true
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Capture record moved into the posted task.
struct PendingDelivery {
    context: Weak<ContextToken>,
    function: CallbackId,
    result: GenericValue,
    shared: Arc<CallbackShared>,
    settled: bool,
}

impl PendingDelivery {
    fn run(mut self, scope: &crate::js::scope::JsScope) {
        let outcome = scope.enter_callback(&self.context, self.function, &self.result);
        trace!(target: "bridge", callback = ?self.function, ?outcome, "callback settled");
        self.settle(outcome);
    }

    fn settle(&mut self, outcome: CallbackState) {
        self.settled = true;
        self.shared.transition(CallbackState::Armed, outcome);
    }
}

impl Drop for PendingDelivery {
    fn drop(&mut self) {
        if !self.settled {
            self.settle(CallbackState::Dropped);
        }
    }
}
