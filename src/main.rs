//! browser-agent - command line entry point
//!
//! Runs one task given as arguments (or read from stdin) and prints the
//! final answer to stdout. Progress goes to stderr.

use std::io::Write;
use std::sync::Arc;

use browser_agent::agents::{AgentContext, AgentEvent};
use browser_agent::bootstrap::build_executor;
use browser_agent::browser::HttpBrowser;
use browser_agent::config::Config;
use browser_agent::interaction::{render_event, ConsoleInteraction};
use browser_agent::llm::OpenRouterClient;
use browser_agent::logging;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn, Instrument};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    logging::init_global();

    let config = Config::from_env()?;
    info!(
        model = %config.default_model,
        mode = %config.mode,
        "Loaded configuration"
    );

    let console = Arc::new(ConsoleInteraction::new());
    let task = match std::env::args().skip(1).collect::<Vec<_>>().join(" ") {
        args if !args.trim().is_empty() => args,
        _ => {
            eprint!("Task: ");
            std::io::stderr().flush()?;
            console.read_line().await?
        }
    };
    if task.is_empty() {
        anyhow::bail!("no task given");
    }

    let browser = Arc::new(HttpBrowser::new(config.browser_timeout)?);
    let llm = Arc::new(OpenRouterClient::from_config(&config));
    let executor = build_executor(&config, browser, console);

    let cancel_token = CancellationToken::new();
    let (events, mut rx) = broadcast::channel::<AgentEvent>(256);
    let ctx = AgentContext::new(llm)
        .with_cancel_token(cancel_token.clone())
        .with_events(events);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling task");
            cancel_token.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let mut stderr = std::io::stderr();
                    let _ = write!(stderr, "{}", render_event(&event));
                    let _ = stderr.flush();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Progress output fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let dispatch = match logging::task_dispatch(&config, &task) {
        Ok(log) => {
            if let Some(path) = &log.path {
                info!(path = %path.display(), "Writing task log");
            }
            log.dispatch
        }
        Err(e) => {
            warn!("Could not create task log: {}", e);
            tracing::dispatcher::get_default(|d| d.clone())
        }
    };

    let run = async {
        let span = tracing::info_span!("run", run_id = %ctx.run_id);
        async {
            info!(task = %task, "Starting task");
            let result = executor.execute(&ctx, &task).await;
            match &result {
                Ok(r) => info!(iterations = r.iterations, "Task completed"),
                Err(e) => warn!("Task failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    };
    let result = run.with_subscriber(dispatch).await;

    drop(ctx);
    let _ = printer.await;

    let result = result?;
    println!("\n{}", result.final_answer);
    Ok(())
}
