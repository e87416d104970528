//! Credentials for the agent host
//!
//! A [`Credential`] is handed to [`crate::client::AgentsClient`] explicitly;
//! nothing in this crate reads process-wide identity on its own.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, TriageError};

/// Audience requested from the Azure CLI for the agents data plane
pub const AI_RESOURCE: &str = "https://ai.azure.com";

/// Refresh cached tokens this long before they expire
const REFRESH_MARGIN_SECS: i64 = 300;

/// A bearer token and, when known, its expiry
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Whether the token is still usable at `now`, leaving a refresh margin
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => exp - Duration::seconds(REFRESH_MARGIN_SECS) > now,
            None => false,
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &mask_secret(&self.token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of bearer tokens for the agent host
#[async_trait]
pub trait Credential: Send + Sync {
    async fn token(&self) -> Result<AccessToken>;
}

/// A fixed token supplied by configuration
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(TriageError::credential("static token is empty"));
        }
        Ok(Self { token })
    }
}

impl std::fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenCredential")
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

#[async_trait]
impl Credential for StaticTokenCredential {
    async fn token(&self) -> Result<AccessToken> {
        Ok(AccessToken::new(self.token.clone()))
    }
}

/// Tokens obtained from a logged-in Azure CLI (`az login`)
#[derive(Debug)]
pub struct AzureCliCredential {
    resource: String,
    cached: Mutex<Option<AccessToken>>,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new(AI_RESOURCE)
    }
}

impl AzureCliCredential {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<AccessToken> {
        debug!("Requesting access token from Azure CLI for {}", self.resource);
        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                &self.resource,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| TriageError::credential(format!("failed to launch Azure CLI: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TriageError::credential(format!(
                "Azure CLI exited with {}: {}. Run `az login` first.",
                output.status,
                stderr.trim()
            )));
        }

        parse_cli_token(&output.stdout)
    }
}

#[async_trait]
impl Credential for AzureCliCredential {
    async fn token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.clone());
            }
        }
        let token = self.fetch().await?;
        info!("Obtained access token from Azure CLI (expires {:?})", token.expires_at);
        *cached = Some(token.clone());
        Ok(token)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<i64>,
    /// Local wall-clock time; the only expiry older CLI releases print
    #[serde(default, rename = "expiresOn")]
    expires_on_local: Option<String>,
}

/// Parse the JSON printed by `az account get-access-token`
pub(crate) fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken> {
    let resp: CliTokenResponse = serde_json::from_slice(stdout)
        .map_err(|e| TriageError::credential(format!("unexpected Azure CLI output: {}", e)))?;
    let expires_at = match resp.expires_on {
        Some(secs) => Utc.timestamp_opt(secs, 0).single(),
        None => resp.expires_on_local.as_deref().and_then(parse_local_expiry),
    };
    Ok(AccessToken {
        token: resp.access_token,
        expires_at,
    })
}

/// `expiresOn` as printed by the Azure CLI, e.g. `2026-10-16 12:00:00.000000`
fn parse_local_expiry(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Mask a secret for Debug output and logs.
/// Shows first 3 and last 4 chars for secrets longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let cred = StaticTokenCredential::new("eyJ0eXAiOiJKV1Qi").unwrap();
        let token = cred.token().await.unwrap();
        assert_eq!(token.token, "eyJ0eXAiOiJKV1Qi");
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn test_static_token_rejects_empty() {
        assert!(StaticTokenCredential::new("  ").is_err());
    }

    #[test]
    fn test_static_token_debug_masks() {
        let cred = StaticTokenCredential::new("eyJ0eXAiOiJKV1Qi").unwrap();
        let debug = format!("{:?}", cred);
        assert!(debug.contains("eyJ...V1Qi"));
        assert!(!debug.contains("eyJ0eXAiOiJKV1Qi"));
    }

    #[test]
    fn test_parse_cli_token() {
        let out = br#"{
            "accessToken": "tok-abcdef123456",
            "expiresOn": "2026-10-16 12:00:00.000000",
            "expires_on": 1791460800,
            "subscription": "sub",
            "tenant": "tenant",
            "tokenType": "Bearer"
        }"#;
        let token = parse_cli_token(out).unwrap();
        assert_eq!(token.token, "tok-abcdef123456");
        assert_eq!(token.expires_at.unwrap().timestamp(), 1791460800);
    }

    #[test]
    fn test_parse_cli_token_local_expiry_only() {
        let out = br#"{
            "accessToken": "tok-abcdef123456",
            "expiresOn": "2026-10-16 12:00:00.000000",
            "tokenType": "Bearer"
        }"#;
        let token = parse_cli_token(out).unwrap();
        let naive = NaiveDateTime::parse_from_str("2026-10-16 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(token.expires_at, Some(expected));
    }

    #[test]
    fn test_parse_cli_token_garbage() {
        let err = parse_cli_token(b"ERROR: Please run 'az login'").unwrap_err();
        assert!(matches!(err, TriageError::Credential(_)));
    }

    #[test]
    fn test_token_freshness() {
        let now = Utc::now();
        let fresh = AccessToken {
            token: "t".to_string(),
            expires_at: Some(now + Duration::hours(1)),
        };
        assert!(fresh.is_fresh(now));

        let nearly_expired = AccessToken {
            token: "t".to_string(),
            expires_at: Some(now + Duration::seconds(60)),
        };
        assert!(!nearly_expired.is_fresh(now));

        assert!(!AccessToken::new("t").is_fresh(now));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-1234567890abcdef"), "sk-...cdef");
    }
}
