use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::notify::TerminalNotifier;
use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::cli::usage_cmd::UsagePayload;
use crate::core::models::usage::UsageSnapshot;
use crate::core::poller::{PollObserver, PollOutcome, PollState, UsagePoller};

#[derive(Debug, PartialEq)]
enum WatchCommand {
    Refresh,
    Quit,
}

fn parse_command(line: &str) -> WatchCommand {
    match line.trim().to_lowercase().as_str() {
        "q" | "quit" | "exit" => WatchCommand::Quit,
        _ => WatchCommand::Refresh,
    }
}

/// Prints every committed snapshot and every failure.
struct WatchPrinter {
    opts: OutputOptions,
}

impl PollObserver for WatchPrinter {
    fn on_snapshot_updated(&self, snapshot: &UsageSnapshot) {
        if !snapshot.has_data() {
            return;
        }
        match self.opts.format {
            OutputFormat::Text => {
                println!(
                    "{}\n",
                    renderer::render_snapshot(snapshot, self.opts.use_color, Utc::now())
                );
            }
            OutputFormat::Json => {
                let payload = UsagePayload::new(PollState::Ready, snapshot, Vec::new());
                match to_json(&payload, &self.opts) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Failed to serialize snapshot: {}", e),
                }
            }
        }
    }

    fn on_error(&self, message: &str) {
        if self.opts.use_color {
            eprintln!("{} {}", "error:".red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }

    fn on_state_changed(&self, state: PollState) {
        debug!("State: {}", state);
    }
}

/// Poll on a timer until Ctrl-C; each line on stdin triggers an immediate poll.
pub async fn run(poller: UsagePoller, interval: Duration, opts: &OutputOptions) -> Result<()> {
    let poller = Arc::new(
        poller
            .with_observer(Arc::new(WatchPrinter { opts: opts.clone() }))
            .with_observer(Arc::new(TerminalNotifier::new(opts.use_color))),
    );

    let shutdown = CancellationToken::new();
    let runner = tokio::spawn(Arc::clone(&poller).run(interval, shutdown.clone()));

    eprintln!(
        "Polling every {}s. Press Enter to refresh, q + Enter or Ctrl-C to quit.",
        interval.as_secs()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    WatchCommand::Quit => break,
                    WatchCommand::Refresh => {
                        let poller = Arc::clone(&poller);
                        tokio::spawn(async move {
                            if poller.poll_now().await == PollOutcome::Coalesced {
                                debug!("Refresh ignored, poll already running");
                            }
                        });
                    }
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    shutdown.cancel();
    runner.await.context("Poller task panicked")?;
    Ok(())
}
