use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::thread::{self, ThreadId};

use futures_util::task::AtomicWaker;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::js::scope::JsScope;

pub type Task = Box<dyn FnOnce(&JsScope) + Send + 'static>;

/// Task queue bound to the thread that owns a script scope.
///
/// Any thread may post; only the owning scope drains, from inside
/// [`JsScope::pump`]. Tasks from one producer run in the order they were
/// posted.
pub struct TaskRunner {
    tx: UnboundedSender<Task>,
    queued: AtomicUsize,
    waker: AtomicWaker,
    owner: ThreadId,
}

impl TaskRunner {
    /// Creates the runner for the current thread together with the receiving
    /// end that the scope drains.
    pub(crate) fn new() -> (Arc<Self>, TaskQueue) {
        let (tx, rx) = unbounded_channel();
        let runner = Arc::new(Self {
            tx,
            queued: AtomicUsize::new(0),
            waker: AtomicWaker::new(),
            owner: thread::current().id(),
        });
        (Arc::clone(&runner), TaskQueue { rx, runner })
    }

    /// Queue `work` for the owning thread. Returns `false` when the owning
    /// scope is gone and the task was discarded.
    pub fn post_task<F>(&self, work: F) -> bool
    where
        F: FnOnce(&JsScope) + Send + 'static,
    {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Box::new(work)).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        self.waker.wake();
        true
    }

    pub fn pending(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.waker.register(waker);
    }
}

pub(crate) struct TaskQueue {
    rx: UnboundedReceiver<Task>,
    runner: Arc<TaskRunner>,
}

impl TaskQueue {
    /// Takes up to `limit` queued tasks without running them.
    pub(crate) fn drain(&mut self, limit: usize) -> Vec<Task> {
        let mut tasks = Vec::new();
        while tasks.len() < limit {
            match self.rx.try_recv() {
                Ok(task) => {
                    self.runner.queued.fetch_sub(1, Ordering::SeqCst);
                    tasks.push(task);
                }
                Err(_) => break,
            }
        }
        tasks
    }
}
