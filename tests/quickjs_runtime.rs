use ui_bridge::js::runtime::QuickJsEngine;

#[test]
fn quickjs_executes_inline_script() {
    let engine = QuickJsEngine::new().expect("engine");
    let result: i32 = engine
        .eval_with(
            "(() => { console.log('hello from test'); return 40 + 2; })()",
            "quickjs_runtime_test.js",
        )
        .expect("script result");
    assert_eq!(result, 42);
}

#[test]
fn quickjs_reports_uncaught_exceptions() {
    let engine = QuickJsEngine::new().expect("engine");
    let err = engine
        .eval("throw new RangeError('out of range')", "throws.js")
        .expect_err("script should fail");
    let message = format!("{err:#}");
    assert!(message.contains("throws.js"), "{message}");
    assert!(message.contains("out of range"), "{message}");
}

#[test]
fn quickjs_runs_promise_jobs_on_demand() {
    let engine = QuickJsEngine::new().expect("engine");
    engine
        .eval(
            "globalThis.done = false; Promise.resolve().then(() => { done = true; });",
            "jobs.js",
        )
        .expect("script");

    assert!(engine.has_pending_jobs());
    let before: bool = engine.eval_with("done", "check.js").expect("done");
    assert!(!before);

    assert!(engine.execute_pending_jobs(100) >= 1);
    let after: bool = engine.eval_with("done", "check.js").expect("done");
    assert!(after);
    assert!(!engine.has_pending_jobs());
}

#[test]
fn quickjs_console_accepts_every_level() {
    let engine = QuickJsEngine::new().expect("engine");
    engine
        .eval(
            "console.log('a', 1); console.info({ b: 2 }); console.debug('c'); \
             console.warn('d'); console.error(new Error('e'));",
            "console.js",
        )
        .expect("console calls");
}
