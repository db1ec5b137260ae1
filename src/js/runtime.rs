use anyhow::{Context as AnyhowContext, Result};
use rquickjs::{Context, Ctx, Error as JsError, Function, Runtime, Value};

/// JavaScript engine backed by QuickJS.
///
/// Owns one QuickJS runtime and its context. `console.*` is wired to Rust
/// tracing on construction.
pub struct QuickJsEngine {
    runtime: Runtime,
    context: Context,
}

impl QuickJsEngine {
    pub fn new() -> Result<Self> {
        let runtime = Runtime::new().context("failed to create QuickJS runtime")?;
        let context = Context::full(&runtime).context("failed to create QuickJS context")?;
        let engine = Self { runtime, context };
        engine.init_console()?;
        Ok(engine)
    }

    /// Evaluate a script and discard the result.
    pub fn eval(&self, source: &str, filename: &str) -> Result<()> {
        self.eval_with::<()>(source, filename)
    }

    /// Evaluate a script and convert the completion value into `V`.
    ///
    /// Pending promise jobs are left queued; the owning scope drains them on
    /// its next pump.
    pub fn eval_with<V>(&self, source: &str, filename: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        let script = Self::with_source_url(source, filename);
        let eval_result = self.context.with(|ctx| match ctx.eval::<V, _>(script) {
            Ok(value) => Ok(value),
            Err(JsError::Exception) => Err(anyhow::anyhow!(capture_exception_message(&ctx))),
            Err(err) => Err(anyhow::Error::from(err)),
        });
        eval_result.with_context(|| format!("failed to evaluate {filename}"))
    }

    /// Run queued promise jobs, at most `limit` of them. Returns how many ran.
    pub fn execute_pending_jobs(&self, limit: usize) -> usize {
        let mut job_count = 0;

        while job_count < limit && self.runtime.is_job_pending() {
            match self.runtime.execute_pending_job() {
                Ok(true) => job_count += 1,
                Ok(false) => break,
                Err(job_exception) => {
                    // One failing job must not stall the rest of the queue.
                    tracing::error!(
                        target: "quickjs",
                        "Job execution error: {:?}",
                        job_exception
                    );
                    job_count += 1;
                }
            }
        }

        if job_count >= limit && self.runtime.is_job_pending() {
            tracing::warn!(
                target: "quickjs",
                "Stopped processing jobs after {} iterations (possible infinite loop)",
                limit
            );
        }

        job_count
    }

    pub fn has_pending_jobs(&self) -> bool {
        self.runtime.is_job_pending()
    }

    /// Provide access to the underlying QuickJS context for native bindings.
    pub fn with_context<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> rquickjs::Result<T>,
    {
        self.context.with(f).map_err(anyhow::Error::from)
    }

    fn init_console(&self) -> Result<()> {
        self.context
            .with(|ctx| {
                let global = ctx.globals();
                let log_fn = Function::new(ctx.clone(), log_from_js)?.with_name("__bridge_log")?;
                global.set("__bridge_log", log_fn)?;
                ctx.eval::<(), _>(CONSOLE_BOOTSTRAP.as_bytes())
            })
            .map_err(anyhow::Error::from)
    }

    fn with_source_url(source: &str, filename: &str) -> Vec<u8> {
        let mut script = String::with_capacity(source.len() + filename.len() + 32);
        script.push_str(source);
        if !source.ends_with('\n') {
            script.push('\n');
        }
        script.push_str("//# sourceURL=");
        script.push_str(filename);
        script.push('\n');
        script.into_bytes()
    }
}

fn log_from_js(level: String, message: String) -> rquickjs::Result<()> {
    match level.as_str() {
        "error" => tracing::error!(target: "quickjs", message = %message),
        "warn" => tracing::warn!(target: "quickjs", message = %message),
        "debug" => tracing::debug!(target: "quickjs", message = %message),
        _ => tracing::info!(target: "quickjs", message = %message),
    }
    Ok(())
}

/// Take the pending exception out of `ctx` and render it for logs.
pub(crate) fn capture_exception_message(ctx: &Ctx<'_>) -> String {
    let exception: Value = ctx.catch();
    describe_exception(&exception)
}

pub(crate) fn describe_exception(exception: &Value<'_>) -> String {
    if let Some(obj) = exception.as_object() {
        if let Ok(message) = obj.get::<_, String>("message") {
            let name = obj
                .get::<_, String>("name")
                .unwrap_or_else(|_| "Error".to_string());
            if let Ok(stack) = obj.get::<_, String>("stack") {
                if !stack.is_empty() {
                    return format!("{name}: {message}\nStack: {stack}");
                }
            }
            return format!("{name}: {message}");
        }
    }

    if let Some(text) = exception.as_string().and_then(|s| s.to_string().ok()) {
        return text;
    }

    format!("{:?}", exception)
}

const CONSOLE_BOOTSTRAP: &str = r#"
(() => {
    const global = globalThis;
    const stringify = (value) => {
        try {
            if (typeof value === 'string') {
                return value;
            }
            if (value === undefined) {
                return 'undefined';
            }
            if (value === null) {
                return 'null';
            }
            if (typeof value === 'object') {
                return JSON.stringify(value);
            }
            return String(value);
        } catch (err) {
            return '[unprintable]';
        }
    };

    const logAt = (level) => (...args) => {
        try {
            global.__bridge_log(level, args.map(stringify).join(' '));
        } catch (err) {
            // console must never throw
        }
    };

    if (typeof global.console !== 'object' || global.console === null) {
        global.console = {};
    }

    global.console.log = logAt('info');
    global.console.info = logAt('info');
    global.console.debug = logAt('debug');
    global.console.warn = logAt('warn');
    global.console.error = logAt('error');
})();
"#;
