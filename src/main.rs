use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result};
use tracing_subscriber::EnvFilter;
use ui_bridge::dom::ThreadedUiManager;
use ui_bridge::{ArgumentBag, BridgeConfig, GenericValue, JsScope, NodeId, UiManager};

fn main() {
    let Some(script_path) = std::env::args().nth(1).map(PathBuf::from) else {
        eprintln!("usage: ui-bridge <script.js>");
        std::process::exit(2);
    };

    let config = BridgeConfig::load(BridgeConfig::default_path()).unwrap_or_else(|err| {
        eprintln!("Failed to load bridge configuration: {err}. Using defaults.");
        BridgeConfig::default()
    });

    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("Failed to start tokio runtime: {err}");
            std::process::exit(1);
        });

    if let Err(err) = rt.block_on(run(&script_path, config)) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(script_path: &Path, config: BridgeConfig) -> Result<()> {
    let source = std::fs::read_to_string(script_path)
        .with_context(|| format!("failed to read {}", script_path.display()))?;

    let manager = Arc::new(
        ThreadedUiManager::builder()
            .function("measureText", measure_text)
            .function("echo", |_, args: &ArgumentBag| Ok(Some(args.to_value())))
            .spawn()?,
    );
    let handle: Weak<dyn UiManager> = Arc::downgrade(&manager) as Weak<dyn UiManager>;

    let idle_timeout = Duration::from_millis(config.idle_timeout_ms);
    let scope = JsScope::new(config, handle)?;
    scope.eval(&source, &script_path.display().to_string())?;

    let report = scope.run_until_idle(idle_timeout).await;
    tracing::info!(
        target: "bridge",
        delivered = report.delivered,
        failed = report.failed,
        dropped = report.dropped,
        "script finished"
    );
    for exception in scope.take_exceptions() {
        eprintln!("{exception}");
    }

    manager.shutdown();
    Ok(())
}

/// Rough monospace metrics: every character is half an em wide.
fn measure_text(_node: NodeId, args: &ArgumentBag) -> Result<Option<GenericValue>, String> {
    let text = args
        .get("text")
        .and_then(GenericValue::as_str)
        .ok_or_else(|| "measureText requires a text argument".to_string())?;
    let font_size = args
        .get("fontSize")
        .and_then(GenericValue::as_number)
        .unwrap_or(16.0);

    let width = text.chars().count() as f64 * font_size * 0.5;
    Ok(Some(
        [
            ("width", GenericValue::Number(width)),
            ("height", GenericValue::Number(font_size)),
        ]
        .into_iter()
        .collect(),
    ))
}
