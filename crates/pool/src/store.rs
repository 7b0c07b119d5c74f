//! Seed-file loading for the credential pool.
//!
//! Credential creation is an administrative action outside the
//! gateway: accounts are provisioned elsewhere and their session
//! tokens dropped into a JSON file that is read once at startup.
//!
//! ```json
//! [
//!   { "label": "acct-1@example.com", "session_token": "st-...", "tier": "standard" },
//!   { "label": "acct-2@example.com", "session_token": "st-...", "tier": "elevated",
//!     "token_expires": "2026-09-01T00:00:00Z" }
//! ]
//! ```

use std::path::Path;

use serde::Deserialize;

use flowgate_core::types::{Tier, Timestamp};

use crate::credential::Credential;

/// One entry in the seed file.
#[derive(Debug, Deserialize)]
pub struct SeedCredential {
    pub label: String,
    pub session_token: String,
    pub tier: Tier,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub token_expires: Option<Timestamp>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read credential file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credential file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Credential file contains no entries")]
    Empty,
}

/// Load credentials from a JSON seed file. Ids are assigned in file
/// order starting at 1.
pub fn load_credentials(path: impl AsRef<Path>) -> Result<Vec<Credential>, StoreError> {
    let raw = std::fs::read_to_string(path)?;
    parse_credentials(&raw)
}

/// Parse seed JSON into credential records.
pub fn parse_credentials(json: &str) -> Result<Vec<Credential>, StoreError> {
    let seeds: Vec<SeedCredential> = serde_json::from_str(json)?;
    if seeds.is_empty() {
        return Err(StoreError::Empty);
    }
    Ok(seeds
        .into_iter()
        .enumerate()
        .map(|(idx, seed)| {
            let mut credential = Credential::new(
                idx as i64 + 1,
                seed.label,
                seed.session_token,
                seed.tier,
            );
            credential.enabled = seed.enabled;
            credential.token_expires = seed.token_expires;
            credential
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_minimal_entries() {
        let json = r#"[
            { "label": "a@example.com", "session_token": "st-a", "tier": "standard" },
            { "label": "b@example.com", "session_token": "st-b", "tier": "elevated" }
        ]"#;
        let credentials = parse_credentials(json).unwrap();
        assert_eq!(credentials.len(), 2);
        assert_eq!(credentials[0].id, 1);
        assert_eq!(credentials[1].id, 2);
        assert_eq!(credentials[1].tier, Tier::Elevated);
        assert!(credentials[0].enabled);
        assert!(credentials[0].token_expires.is_none());
    }

    #[test]
    fn respects_disabled_flag_and_expiry() {
        let json = r#"[
            { "label": "a", "session_token": "st", "tier": "standard",
              "enabled": false, "token_expires": "2026-01-01T00:00:00Z" }
        ]"#;
        let credentials = parse_credentials(json).unwrap();
        assert!(!credentials[0].enabled);
        assert!(credentials[0].token_expires.is_some());
    }

    #[test]
    fn empty_file_rejected() {
        assert_matches!(parse_credentials("[]"), Err(StoreError::Empty));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"[{ "label": "a", "session_token": "st", "tier": "standard" }]"#,
        )
        .unwrap();

        let credentials = load_credentials(&path).unwrap();
        assert_eq!(credentials.len(), 1);
    }
}
