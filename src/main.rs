mod cli;
mod core;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

use crate::core::config::AppConfig;
use crate::core::poller::UsagePoller;
use crate::core::store::CredentialStore;

#[derive(Parser)]
#[command(name = "ubar", about = "Claude usage polling and threshold alerts", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    format: Option<cli::output::OutputFormat>,

    /// Shorthand for --format json
    #[arg(short = 'j', long = "json", global = true)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and display current usage once
    Usage,
    /// Keep polling on a timer and print alerts as thresholds are crossed
    Watch {
        /// Seconds between polls (default: poll.interval_secs from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Manage the claude.ai session cookie
    Cookie {
        #[command(subcommand)]
        action: CookieAction,
    },
    /// Turn usage alerts on or off
    Notifications {
        #[command(subcommand)]
        action: NotificationAction,
    },
    /// Remember whether to start at login
    LoginItem {
        #[arg(value_enum)]
        state: Option<Toggle>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Save the cookie (reads stdin when VALUE is omitted)
    Set { value: Option<String> },
    /// Remove the cookie and reset alert state
    Clear,
    /// Show a masked preview of the saved cookie
    Show,
}

#[derive(Subcommand)]
enum NotificationAction {
    On,
    Off,
    /// Show whether alerts are enabled and the last alerted threshold
    Status,
    /// Emit a sample alert
    Test,
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate default config file
    Init,
    /// Validate config file
    Check,
    /// Print config and state file locations
    Path,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ubar=debug" } else { "ubar=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_poller(config: &AppConfig) -> anyhow::Result<UsagePoller> {
    UsagePoller::from_config(config, CredentialStore::open_default())
        .context("Failed to build HTTP client")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{}; using defaults", e);
            AppConfig::default()
        }
    };

    let opts = cli::output::OutputOptions::resolve(
        &config.settings,
        cli.format,
        cli.json,
        cli.pretty,
        cli.no_color,
        cli.verbose,
    );

    match cli.command {
        None | Some(Commands::Usage) => {
            cli::usage_cmd::run(build_poller(&config)?, &opts).await?;
        }
        Some(Commands::Watch { interval }) => {
            let interval = interval
                .map(|secs| Duration::from_secs(secs.max(10)))
                .unwrap_or_else(|| config.poll.interval());
            cli::watch_cmd::run(build_poller(&config)?, interval, &opts).await?;
        }
        Some(Commands::Cookie { action }) => match action {
            CookieAction::Set { value } => {
                cli::cookie_cmd::set(value, &build_poller(&config)?).await?
            }
            CookieAction::Clear => cli::cookie_cmd::clear(&build_poller(&config)?).await?,
            CookieAction::Show => {
                cli::cookie_cmd::show(&CredentialStore::open_default(), &opts)?
            }
        },
        Some(Commands::Notifications { action }) => match action {
            NotificationAction::On => {
                cli::config_cmd::set_notifications(&build_poller(&config)?, true).await?
            }
            NotificationAction::Off => {
                cli::config_cmd::set_notifications(&build_poller(&config)?, false).await?
            }
            NotificationAction::Status => {
                cli::config_cmd::notifications_status(&build_poller(&config)?, &opts).await?
            }
            NotificationAction::Test => cli::config_cmd::test_notification(&opts)?,
        },
        Some(Commands::LoginItem { state }) => {
            let enabled = state.map(|s| matches!(s, Toggle::On));
            cli::config_cmd::set_launch_at_login(&mut CredentialStore::open_default(), enabled)?;
        }
        Some(Commands::Config { action }) => match action {
            ConfigAction::Init => cli::config_cmd::init()?,
            ConfigAction::Check => cli::config_cmd::check(&opts)?,
            ConfigAction::Path => {
                cli::config_cmd::path(&CredentialStore::open_default(), &opts)?
            }
        },
    }

    Ok(())
}
