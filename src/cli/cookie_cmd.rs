use anyhow::{Context, Result};
use std::io::Read;

use crate::cli::output::{to_json, OutputFormat, OutputOptions};
use crate::core::poller::UsagePoller;
use crate::core::store::CredentialStore;

const PREVIEW_CHARS: usize = 20;

/// First characters of the credential followed by an ellipsis.
fn mask(credential: &str) -> String {
    let preview: String = credential.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", preview)
}

/// Store a credential, reading it from stdin when no value is given.
pub async fn set(value: Option<String>, poller: &UsagePoller) -> Result<()> {
    let credential = match value {
        Some(v) => v,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read cookie from stdin")?;
            buf
        }
    };
    let credential = credential.trim();
    if credential.is_empty() {
        anyhow::bail!("Cookie is empty. Paste the full Cookie header value from claude.ai.");
    }
    poller
        .set_credential(credential)
        .await
        .context("Failed to save cookie")?;
    println!("Saved cookie ({} chars)", credential.len());
    Ok(())
}

pub async fn clear(poller: &UsagePoller) -> Result<()> {
    poller
        .clear_credential()
        .await
        .context("Failed to clear cookie")?;
    println!("Cookie cleared");
    Ok(())
}

pub fn show(store: &CredentialStore, opts: &OutputOptions) -> Result<()> {
    let preview = store.get().map(mask);
    match opts.format {
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "set": preview.is_some(),
                "preview": preview,
            });
            println!("{}", to_json(&payload, opts)?);
        }
        OutputFormat::Text => match preview {
            Some(preview) => println!("{}", preview),
            None => println!("No cookie set. Run `ubar cookie set` to add one."),
        },
    }
    Ok(())
}
