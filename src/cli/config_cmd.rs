use anyhow::{Context, Result};

use crate::cli::notify::TerminalNotifier;
use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::core::config::AppConfig;
use crate::core::poller::UsagePoller;
use crate::core::store::CredentialStore;

pub fn init() -> Result<()> {
    let path = AppConfig::config_path();
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    AppConfig::default()
        .save_to(&path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Generated config at {}", path.display());
    Ok(())
}

pub fn check(opts: &OutputOptions) -> Result<()> {
    let path = AppConfig::config_path();
    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    let issues = config.validate();

    match opts.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.exists(),
                "valid": issues.is_empty(),
                "issues": issues,
            });
            println!("{}", to_json(&payload, opts)?);
        }
        OutputFormat::Text => {
            if !path.exists() {
                println!("No config file at {} (using defaults)", path.display());
            }
            if issues.is_empty() {
                println!("Config is valid");
            } else {
                for issue in &issues {
                    eprintln!("  {}", issue);
                }
            }
        }
    }

    if !issues.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn path(store: &CredentialStore, opts: &OutputOptions) -> Result<()> {
    let config = AppConfig::config_path();
    match opts.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "config": config.display().to_string(),
                "state": store.path().display().to_string(),
            });
            println!("{}", to_json(&payload, opts)?);
        }
        OutputFormat::Text => {
            println!("config: {}", config.display());
            println!("state:  {}", store.path().display());
        }
    }
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

pub async fn set_notifications(poller: &UsagePoller, enabled: bool) -> Result<()> {
    poller
        .set_notifications_enabled(enabled)
        .await
        .context("Failed to save notification setting")?;
    println!("Notifications {}", on_off(enabled));
    Ok(())
}

pub async fn notifications_status(poller: &UsagePoller, opts: &OutputOptions) -> Result<()> {
    let enabled = poller.notifications_enabled().await;
    let last = poller.last_notified_threshold().await;
    match opts.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "enabled": enabled,
                "last_notified_threshold": last,
            });
            println!("{}", to_json(&payload, opts)?);
        }
        OutputFormat::Text => {
            println!("Notifications {}", on_off(enabled));
            println!("Last alerted threshold: {}%", last);
        }
    }
    Ok(())
}

/// Send a sample alert through the same sink real alerts use.
pub fn test_notification(opts: &OutputOptions) -> Result<()> {
    TerminalNotifier::new(opts.use_color).deliver(75);
    Ok(())
}

pub fn set_launch_at_login(store: &mut CredentialStore, enabled: Option<bool>) -> Result<()> {
    if let Some(enabled) = enabled {
        store
            .set_launch_at_login(enabled)
            .context("Failed to save launch-at-login setting")?;
    }
    println!("Launch at login {}", on_off(store.launch_at_login()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_off_text() {
        assert_eq!(on_off(true), "on");
        assert_eq!(on_off(false), "off");
    }

    #[test]
    fn launch_at_login_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = CredentialStore::open(&path);
        set_launch_at_login(&mut store, Some(true)).unwrap();
        assert!(CredentialStore::open(&path).launch_at_login());
        set_launch_at_login(&mut store, None).unwrap();
        assert!(store.launch_at_login());
    }

    #[tokio::test]
    async fn notifications_toggle_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let poller =
            UsagePoller::from_config(&AppConfig::default(), CredentialStore::open(&path)).unwrap();
        set_notifications(&poller, false).await.unwrap();
        assert!(!poller.notifications_enabled().await);
        assert!(!CredentialStore::open(&path).notifications_enabled());
    }
}
