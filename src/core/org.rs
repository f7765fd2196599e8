use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::client::UsageApi;
use crate::core::error::OrgError;

#[derive(Deserialize)]
struct BootstrapAccount {
    #[serde(rename = "lastActiveOrgId")]
    last_active_org_id: Option<String>,
}

#[derive(Deserialize)]
struct BootstrapResponse {
    account: Option<BootstrapAccount>,
}

/// Derives the organization id that scopes the usage query.
#[derive(Debug, Clone)]
pub struct OrgResolver {
    org_cookie_key: String,
}

impl OrgResolver {
    pub fn new(org_cookie_key: impl Into<String>) -> Self {
        Self {
            org_cookie_key: org_cookie_key.into(),
        }
    }

    /// Resolve from the credential's own cookie fragments, falling back to bootstrap.
    pub async fn resolve(&self, credential: &str, api: &dyn UsageApi) -> Result<String, OrgError> {
        if credential.trim().is_empty() {
            return Err(OrgError::EmptyCredential);
        }

        if let Some(org_id) = self.from_credential(credential) {
            debug!("Found org ID in cookie");
            return Ok(org_id.to_string());
        }

        debug!("Fetching bootstrap to get org ID");
        let body = api.fetch_bootstrap(credential).await.map_err(|e| {
            warn!("Bootstrap request failed: {}", e);
            OrgError::from(e)
        })?;
        let org_id = parse_bootstrap(&body)?;
        debug!("Got org ID from bootstrap");
        Ok(org_id)
    }

    /// Fast path: a `<key>=<value>` fragment inside a `;`-separated cookie string.
    pub fn from_credential<'a>(&self, credential: &'a str) -> Option<&'a str> {
        credential
            .split(';')
            .map(str::trim)
            .filter_map(|part| part.split_once('='))
            .find(|(key, _)| *key == self.org_cookie_key)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }
}

fn parse_bootstrap(body: &str) -> Result<String, OrgError> {
    let data: BootstrapResponse =
        serde_json::from_str(body).map_err(|e| OrgError::InvalidBody(e.to_string()))?;
    data.account
        .and_then(|a| a.last_active_org_id)
        .filter(|id| !id.is_empty())
        .ok_or(OrgError::MissingOrgId)
}
