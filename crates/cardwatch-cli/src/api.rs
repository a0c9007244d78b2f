//! REST client for the dashboard backend. Only login is needed here.

use std::time::Duration;

use cardwatch_common::CardwatchError;
use cardwatch_presence::{AuthSession, Identity};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// `POST /auth/login` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<Identity>,
}

impl LoginResponse {
    pub fn into_session(self) -> AuthSession {
        AuthSession::new(self.token, self.user)
    }
}

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CardwatchError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| CardwatchError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, CardwatchError> {
        let url = self.url("auth/login");
        debug!(%url, "Login request");

        let response = self
            .http
            .post(&url)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(|e| CardwatchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(CardwatchError::Network(format!("HTTP {status}: {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| CardwatchError::Other(format!("unexpected login response: {e}")))
    }
}

/// Show enough of a token to tell two apart.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}…")
}
