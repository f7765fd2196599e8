use thiserror::Error;

/// Failure of a single HTTP exchange, before the body is interpreted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    HttpStatus(u16),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Why no organization id could be derived from the credential.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrgError {
    #[error("credential is empty")]
    EmptyCredential,
    #[error("bootstrap request failed: {0}")]
    Bootstrap(#[from] FetchError),
    #[error("bootstrap response is not valid JSON: {0}")]
    InvalidBody(String),
    #[error("bootstrap response has no account.lastActiveOrgId")]
    MissingOrgId,
}

/// Everything that can end a poll cycle early. All variants are recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("Session cookie not set")]
    CredentialMissing,
    #[error("Could not get org ID from cookie")]
    OrganizationUnresolved(#[source] OrgError),
    #[error("Network error: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("Parse error: {0}")]
    BodyParse(String),
}

impl From<FetchError> for PollError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport(cause) => Self::Transport(cause),
            FetchError::HttpStatus(code) => Self::HttpStatus(code),
        }
    }
}

impl From<OrgError> for PollError {
    fn from(err: OrgError) -> Self {
        Self::OrganizationUnresolved(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn credential_missing_message() {
        assert_eq!(PollError::CredentialMissing.to_string(), "Session cookie not set");
    }

    #[test]
    fn org_unresolved_keeps_cause() {
        let err = PollError::from(OrgError::Bootstrap(FetchError::HttpStatus(403)));
        assert_eq!(err.to_string(), "Could not get org ID from cookie");
        let source = err.source().unwrap().to_string();
        assert!(source.contains("HTTP 403"), "got: {}", source);
    }

    #[test]
    fn fetch_error_maps_to_poll_error() {
        assert_eq!(
            PollError::from(FetchError::HttpStatus(429)),
            PollError::HttpStatus(429)
        );
        assert_eq!(
            PollError::from(FetchError::Transport("timed out".into())).to_string(),
            "Network error: timed out"
        );
    }
}
