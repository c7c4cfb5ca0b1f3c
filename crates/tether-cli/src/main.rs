//! tether — queued tool-call client for stdio MCP servers.

mod config;

use anyhow::{Context, Result, bail};
use clap::Parser;
use config::ConfigFile;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tether_mcp::{McpClient, ToolContent, ToolOutcome};
use tether_runs::{RunMeta, Scheduler, ToolCall};

#[derive(Parser)]
#[command(name = "tether", version, about = "Queued tool-call client for stdio MCP servers")]
struct Cli {
    /// Path to the TOML config describing the server process
    #[arg(short, long, default_value = "tether.toml")]
    config: PathBuf,

    /// Tool invocations, each NAME or NAME=ARGUMENTS-JSON
    calls: Vec<String>,

    /// Display model label attached to every run
    #[arg(long)]
    model: Option<String>,

    /// Override the per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// List the server's tools and exit
    #[arg(long)]
    list: bool,

    /// Print lifecycle events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = ConfigFile::load(&cli.config)?;
    config.resolve_timeout(cli.timeout_ms);
    tracing::debug!(
        "loaded {} (server: {}, timeout {}ms)",
        cli.config.display(),
        config.server.command,
        config.server.timeout_ms
    );

    let client = Arc::new(McpClient::new(config.server.clone()));

    if cli.list {
        let tools = client.tools().await.context("failed to reach the server")?;
        for tool in tools {
            println!("{}\t{}", tool.name, tool.description);
        }
        client.shutdown().await;
        return Ok(());
    }

    if cli.calls.is_empty() {
        bail!("nothing to do: pass at least one NAME or NAME=ARGUMENTS-JSON call, or --list");
    }

    let calls = cli
        .calls
        .iter()
        .map(|raw| parse_call(raw, cli.model.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    let scheduler = Scheduler::new(
        Arc::clone(&client) as Arc<dyn tether_runs::ToolChannel>,
        config.queue.scheduler_options(),
    );

    // Mirror lifecycle events to stdout for consumers that want them.
    let event_printer = cli.json.then(|| {
        let mut events = scheduler.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            }
        })
    });

    let results = scheduler.run_tools(calls).await;

    let mut failures = 0usize;
    for (label, result) in cli.calls.iter().zip(results) {
        match result {
            Ok(value) => print_result(label, &value),
            Err(e) => {
                failures += 1;
                eprintln!("{label}: {e}");
            }
        }
    }

    if let Some(printer) = event_printer {
        printer.abort();
    }
    client.shutdown().await;

    if failures > 0 {
        bail!("{failures} of {} calls failed", cli.calls.len());
    }
    Ok(())
}

/// Parse `NAME` or `NAME={"json":"args"}` into a call.
fn parse_call(raw: &str, model: Option<&str>) -> Result<ToolCall> {
    let (tool, arguments) = match raw.split_once('=') {
        Some((tool, raw)) => {
            let arguments: serde_json::Value = serde_json::from_str(raw)
                .with_context(|| format!("arguments for '{tool}' are not valid JSON"))?;
            (tool, arguments)
        }
        None => (raw, serde_json::json!({})),
    };
    if tool.is_empty() {
        bail!("empty tool name in '{raw}'");
    }
    let mut call = ToolCall::new(tool, arguments);
    if let Some(model) = model {
        call.meta = Some(RunMeta {
            model: Some(model.to_string()),
        });
    }
    Ok(call)
}

/// Print a tool result: text content when it parses as the typed shape,
/// raw JSON otherwise.
fn print_result(label: &str, value: &serde_json::Value) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match ToolOutcome::from_value(value) {
        Ok(outcome) => {
            for item in &outcome.content {
                match item {
                    ToolContent::Text { text } => {
                        let _ = writeln!(out, "{text}");
                    }
                    ToolContent::Image { mime_type, data } => {
                        let _ = writeln!(out, "[{} image, {} bytes base64]", mime_type, data.len());
                    }
                }
            }
            if outcome.is_error {
                eprintln!("{label}: server reported a tool error");
            }
        }
        Err(_) => {
            let _ = writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            );
        }
    }
}
