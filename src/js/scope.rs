use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak as RcWeak};
use std::sync::{Arc, Weak};
use std::task::{Poll, Waker};
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result};
use futures_util::future::poll_fn;
use rquickjs::{Ctx, Error as JsError, Exception, Function, Value};
use tracing::{debug, error, warn};

use super::modules::{self, NativeModule};
use super::runtime::{capture_exception_message, describe_exception, QuickJsEngine};
use crate::callback::{CallbackHandle, CallbackId, CallbackRegistry, CallbackState, ContextToken};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::invoker::{Invoker, UiManager};
use crate::runner::{TaskQueue, TaskRunner};
use crate::value::convert::to_script;
use crate::value::GenericValue;

/// Work done by one [`JsScope::pump`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    pub tasks: usize,
    pub jobs: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl PumpReport {
    fn merge(&mut self, other: PumpReport) {
        self.tasks += other.tasks;
        self.jobs += other.jobs;
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.failed += other.failed;
    }

    pub fn did_work(&self) -> bool {
        self.tasks > 0 || self.jobs > 0
    }
}

/// Owns a script context together with everything that may re-enter it: the
/// task runner, the callback registry and the bound native modules.
///
/// A scope is pinned to the thread that created it. Other threads talk to it
/// only through its [`TaskRunner`].
pub struct JsScope {
    inner: Rc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    config: BridgeConfig,
    modules: Vec<NativeModule>,
    invoker: Invoker,
    runner: Arc<TaskRunner>,
    queue: RefCell<TaskQueue>,
    slot: RefCell<Option<ContextSlot>>,
    exceptions: RefCell<Vec<String>>,
    report: Cell<PumpReport>,
}

// Field order matters: callbacks hold persistent references into the engine
// and must be released before it.
struct ContextSlot {
    callbacks: RefCell<CallbackRegistry>,
    token: Arc<ContextToken>,
    engine: QuickJsEngine,
}

impl JsScope {
    /// Create a scope with the default module table.
    pub fn new(config: BridgeConfig, manager: Weak<dyn UiManager>) -> Result<Self> {
        Self::with_modules(config, manager, modules::default_modules())
    }

    pub fn with_modules(
        config: BridgeConfig,
        manager: Weak<dyn UiManager>,
        modules: Vec<NativeModule>,
    ) -> Result<Self> {
        let (runner, queue) = TaskRunner::new();
        let scope = Self {
            inner: Rc::new(ScopeInner {
                config,
                modules,
                invoker: Invoker::new(manager),
                runner,
                queue: RefCell::new(queue),
                slot: RefCell::new(None),
                exceptions: RefCell::new(Vec::new()),
                report: Cell::new(PumpReport::default()),
            }),
        };
        scope.create_context()?;
        Ok(scope)
    }

    pub(crate) fn from_inner(inner: Rc<ScopeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> RcWeak<ScopeInner> {
        Rc::downgrade(&self.inner)
    }

    /// Build a fresh context and bind the module table into it. Any previous
    /// context is torn down first.
    pub fn create_context(&self) -> Result<()> {
        self.destroy_context()?;

        let engine = QuickJsEngine::new()?;
        let weak = self.downgrade();
        engine
            .with_context(|ctx| modules::bind_modules(&ctx, &weak, &self.inner.modules))
            .context("failed to bind native modules")?;

        let token = ContextToken::new();
        debug!(target: "bridge", context = token.id(), "script context created");
        *self.inner.slot.borrow_mut() = Some(ContextSlot {
            callbacks: RefCell::new(CallbackRegistry::default()),
            token,
            engine,
        });
        Ok(())
    }

    /// Tear down the script context. Results that arrive afterwards are
    /// dropped without touching script state.
    pub fn destroy_context(&self) -> Result<(), BridgeError> {
        let mut slot = self
            .inner
            .slot
            .try_borrow_mut()
            .map_err(|_| BridgeError::ContextBusy)?;
        if let Some(previous) = slot.take() {
            debug!(
                target: "bridge",
                context = previous.token.id(),
                pending = previous.callbacks.borrow().len(),
                "script context destroyed"
            );
        }
        Ok(())
    }

    pub fn is_context_alive(&self) -> bool {
        self.inner.slot.borrow().is_some()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn runner(&self) -> &Arc<TaskRunner> {
        &self.inner.runner
    }

    pub(crate) fn invoker(&self) -> &Invoker {
        &self.inner.invoker
    }

    pub fn eval(&self, source: &str, filename: &str) -> Result<()> {
        self.with_engine(|engine| engine.eval(source, filename))
    }

    pub fn eval_with<V>(&self, source: &str, filename: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        self.with_engine(|engine| engine.eval_with(source, filename))
    }

    pub fn with_context<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> rquickjs::Result<T>,
    {
        self.with_engine(|engine| engine.with_context(f))
    }

    fn with_engine<T>(&self, f: impl FnOnce(&QuickJsEngine) -> Result<T>) -> Result<T> {
        let slot = self.inner.slot.borrow();
        let slot = slot.as_ref().ok_or(BridgeError::ContextGone)?;
        f(&slot.engine)
    }

    /// Number of script callbacks still waiting for a result.
    pub fn pending_callbacks(&self) -> usize {
        self.inner
            .slot
            .borrow()
            .as_ref()
            .map(|slot| slot.callbacks.borrow().len())
            .unwrap_or(0)
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.inner.runner.pending() > 0
    }

    fn has_pending_jobs(&self) -> bool {
        self.inner
            .slot
            .borrow()
            .as_ref()
            .map(|slot| slot.engine.has_pending_jobs())
            .unwrap_or(false)
    }

    pub fn register_waker(&self, waker: &Waker) {
        self.inner.runner.register_waker(waker);
    }

    /// Exceptions raised by callbacks since the last call.
    pub fn take_exceptions(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.exceptions.borrow_mut())
    }

    /// Run queued tasks and pending promise jobs until both are exhausted or
    /// the configured limits are reached.
    pub fn pump(&self) -> PumpReport {
        let max_tasks = self.inner.config.max_tasks_per_pump;
        let max_jobs = self.inner.config.max_jobs_per_pump;
        self.inner.report.set(PumpReport::default());

        loop {
            let budget = max_tasks.saturating_sub(self.inner.report.get().tasks);
            let tasks = self.inner.queue.borrow_mut().drain(budget);
            let ran = tasks.len();
            for task in tasks {
                task(self);
            }

            let job_budget = max_jobs.saturating_sub(self.inner.report.get().jobs);
            let jobs = self
                .inner
                .slot
                .borrow()
                .as_ref()
                .map(|slot| slot.engine.execute_pending_jobs(job_budget))
                .unwrap_or(0);

            let mut report = self.inner.report.get();
            report.tasks += ran;
            report.jobs += jobs;
            self.inner.report.set(report);

            if ran == 0 && jobs == 0 {
                break;
            }
            if report.tasks >= max_tasks || report.jobs >= max_jobs {
                break;
            }
        }

        self.inner.report.take()
    }

    /// Pump until no callback is waiting for a result, sleeping on the
    /// runner's waker in between. Gives up after `idle_timeout` without any
    /// new task.
    pub async fn run_until_idle(&self, idle_timeout: Duration) -> PumpReport {
        let mut total = PumpReport::default();
        loop {
            total.merge(self.pump());
            if self.pending_callbacks() == 0 && !self.has_pending_tasks() && !self.has_pending_jobs() {
                break;
            }
            if tokio::time::timeout(idle_timeout, self.ready()).await.is_err() {
                warn!(
                    target: "bridge",
                    pending = self.pending_callbacks(),
                    "timed out waiting for UI results"
                );
                break;
            }
        }
        total
    }

    fn ready(&self) -> impl Future<Output = ()> + '_ {
        poll_fn(move |cx| {
            self.register_waker(cx.waker());
            if self.has_pending_tasks() || self.has_pending_jobs() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
    }

    /// Register `function` and hand out a handle that can deliver into it.
    pub(crate) fn arm_callback<'js>(
        &self,
        ctx: &Ctx<'js>,
        function: Function<'js>,
    ) -> Option<CallbackHandle> {
        let slot = self.inner.slot.borrow();
        let slot = slot.as_ref()?;
        let id = slot.callbacks.borrow_mut().register(ctx, function);
        Some(CallbackHandle::new(
            Arc::downgrade(&slot.token),
            id,
            Arc::downgrade(&self.inner.runner),
        ))
    }

    /// Drop a registered function that will never receive a result.
    pub(crate) fn release_callback(&self, context: &Weak<ContextToken>, id: CallbackId) {
        let Ok(slot) = self.inner.slot.try_borrow() else {
            return;
        };
        if let Some(slot) = slot.as_ref().filter(|slot| slot.is_token(context)) {
            slot.callbacks.borrow_mut().take(id);
        }
    }

    /// Re-enter the script for one delivered result. Runs on the scope's
    /// thread from inside [`pump`](Self::pump).
    pub(crate) fn enter_callback(
        &self,
        context: &Weak<ContextToken>,
        id: CallbackId,
        result: &GenericValue,
    ) -> CallbackState {
        let outcome = self.try_enter_callback(context, id, result);
        let mut report = self.inner.report.get();
        match outcome {
            CallbackState::Delivered => report.delivered += 1,
            CallbackState::Failed => report.failed += 1,
            _ => report.dropped += 1,
        }
        self.inner.report.set(report);
        outcome
    }

    fn try_enter_callback(
        &self,
        context: &Weak<ContextToken>,
        id: CallbackId,
        result: &GenericValue,
    ) -> CallbackState {
        let Ok(slot) = self.inner.slot.try_borrow() else {
            return CallbackState::Dropped;
        };
        let Some(slot) = slot.as_ref().filter(|slot| slot.is_token(context)) else {
            debug!(target: "bridge", "context gone before callback ran");
            return CallbackState::Dropped;
        };
        let Some(function) = slot.callbacks.borrow_mut().take(id) else {
            debug!(target: "bridge", "callback function already released");
            return CallbackState::Dropped;
        };

        let entered = slot.engine.with_context(|ctx| {
            let function = function.restore(&ctx)?;
            let argument = if result.is_object() {
                to_script(&ctx, result)
            } else {
                None
            };

            let Some(argument) = argument else {
                let err = BridgeError::ResultCoercion {
                    found: result.kind(),
                };
                let _ = Exception::throw_type(&ctx, &err.to_string());
                return Ok(Entry::Failed(report_exception(&ctx)));
            };

            match function.call::<_, Value>((argument,)) {
                Ok(_) => Ok(Entry::Delivered(None)),
                Err(JsError::Exception) => Ok(Entry::Delivered(Some(report_exception(&ctx)))),
                Err(err) => Err(err),
            }
        });

        match entered {
            Ok(Entry::Delivered(exception)) => {
                if let Some(message) = exception {
                    self.record_exception(message);
                }
                CallbackState::Delivered
            }
            Ok(Entry::Failed(message)) => {
                self.record_exception(message);
                CallbackState::Failed
            }
            Err(err) => {
                error!(target: "bridge", error = %err, "failed to enter script callback");
                CallbackState::Dropped
            }
        }
    }

    fn record_exception(&self, message: String) {
        error!(target: "quickjs", %message, "uncaught exception in UI callback");
        self.inner.exceptions.borrow_mut().push(message);
    }
}

impl ContextSlot {
    fn is_token(&self, context: &Weak<ContextToken>) -> bool {
        context
            .upgrade()
            .map(|token| token.id() == self.token.id())
            .unwrap_or(false)
    }
}

enum Entry {
    Delivered(Option<String>),
    Failed(String),
}

/// Hand the pending exception to a script-installed `onerror` handler, if
/// any, and describe it for the host.
fn report_exception(ctx: &Ctx<'_>) -> String {
    let exception: Value = ctx.catch();
    let message = describe_exception(&exception);

    if let Ok(handler) = ctx.globals().get::<_, Function>("onerror") {
        if let Err(JsError::Exception) = handler.call::<_, Value>((exception,)) {
            let nested = capture_exception_message(ctx);
            warn!(target: "quickjs", %nested, "onerror handler threw");
        }
    }
    message
}
