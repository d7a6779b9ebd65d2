//! Google sign-in verification
//!
//! ID tokens from the Google button are checked at the tokeninfo endpoint;
//! OAuth access tokens are exchanged at the userinfo endpoint. Either way
//! Google does the signature work and we only read back the profile.

use anyhow::{anyhow, bail, Context, Result};
use learnloop_shared::GoogleLoginRequest;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::GoogleConfig;

const GOOGLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Profile fields both Google endpoints return
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    /// Stable Google account id
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// Only present on tokeninfo responses
    #[serde(default)]
    pub aud: Option<String>,
}

/// Which credential the client presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoogleCredential {
    IdToken(String),
    AccessToken(String),
}

impl GoogleCredential {
    /// ID token wins when both are present; blanks count as missing
    pub fn from_request(req: &GoogleLoginRequest) -> Option<Self> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        present(&req.credential)
            .map(GoogleCredential::IdToken)
            .or_else(|| present(&req.access_token).map(GoogleCredential::AccessToken))
    }
}

/// Thin client over Google's token endpoints
pub struct GoogleVerifier<'a> {
    http: &'a reqwest::Client,
    config: &'a GoogleConfig,
}

impl<'a> GoogleVerifier<'a> {
    pub fn new(http: &'a reqwest::Client, config: &'a GoogleConfig) -> Self {
        Self { http, config }
    }

    pub async fn profile(&self, credential: &GoogleCredential) -> Result<GoogleProfile> {
        match credential {
            GoogleCredential::IdToken(token) => self.verify_id_token(token).await,
            GoogleCredential::AccessToken(token) => self.fetch_userinfo(token).await,
        }
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<GoogleProfile> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow!("Google client id is not configured"))?;

        let response = self
            .http
            .get(&self.config.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .timeout(GOOGLE_TIMEOUT)
            .send()
            .await
            .context("tokeninfo request failed")?;

        if !response.status().is_success() {
            bail!("tokeninfo rejected the ID token: {}", response.status());
        }

        let profile: GoogleProfile = response
            .json()
            .await
            .context("tokeninfo returned an unexpected body")?;

        if profile.aud.as_deref() != Some(client_id) {
            debug!(aud = ?profile.aud, "ID token issued for another client");
            bail!("ID token audience mismatch");
        }

        Ok(profile)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleProfile> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .timeout(GOOGLE_TIMEOUT)
            .send()
            .await
            .context("userinfo request failed")?;

        if !response.status().is_success() {
            bail!("userinfo rejected the access token: {}", response.status());
        }

        response
            .json()
            .await
            .context("userinfo returned an unexpected body")
    }
}
