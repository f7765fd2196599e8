use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::cli::notify::TerminalNotifier;
use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::error::PollError;
use crate::core::formatter::UsageLevel;
use crate::core::models::usage::UsageSnapshot;
use crate::core::poller::{PollOutcome, PollState, UsagePoller};

#[derive(Serialize)]
pub struct UsagePayload<'a> {
    pub state: PollState,
    #[serde(flatten)]
    pub snapshot: &'a UsageSnapshot,
    pub session_percent: u8,
    pub weekly_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_secondary_percent: Option<u8>,
    pub level: UsageLevel,
    pub alerts: Vec<u8>,
}

impl<'a> UsagePayload<'a> {
    pub fn new(state: PollState, snapshot: &'a UsageSnapshot, alerts: Vec<u8>) -> Self {
        Self {
            state,
            snapshot,
            session_percent: snapshot.session.percent(),
            weekly_percent: snapshot.weekly.percent(),
            weekly_secondary_percent: snapshot.secondary().map(|p| p.percent()),
            level: UsageLevel::from_fraction(snapshot.session.percentage()),
            alerts,
        }
    }
}

/// Run a single poll cycle and print the result.
pub async fn run(poller: UsagePoller, opts: &OutputOptions) -> Result<()> {
    let poller = poller.with_observer(Arc::new(TerminalNotifier::new(opts.use_color)));

    let outcome = poller.poll_now().await;
    let snapshot = poller.snapshot().await;
    let state = poller.state().await;
    let alerts = match &outcome {
        PollOutcome::Updated { alerts } => alerts.clone(),
        _ => Vec::new(),
    };

    match opts.format {
        OutputFormat::Text => {
            println!("{}", renderer::render_snapshot(&snapshot, opts.use_color, Utc::now()));
        }
        OutputFormat::Json => {
            let payload = UsagePayload::new(state, &snapshot, alerts);
            println!("{}", to_json(&payload, opts)?);
        }
    }

    if let PollOutcome::Failed(err) = outcome {
        if err == PollError::CredentialMissing {
            eprintln!("Run `ubar cookie set` with your claude.ai Cookie header first.");
        }
        if opts.verbose {
            eprintln!("Poll failed: {:#}", anyhow::Error::new(err));
        }
        std::process::exit(1);
    }

    Ok(())
}
