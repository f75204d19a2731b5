use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::backoff::{retry_async, RetryPolicy};

const ERROR_BODY_SNIPPET_LEN: usize = 220;
pub const AUTH_API_BASE_URL: &str = "https://collaborative-code-editor-1-darj.onrender.com";
pub const LOCAL_AUTH_API_BASE_URL: &str = "http://localhost:8000";
/// Environment variable overriding the auth service base URL.
pub const AUTH_URL_ENV: &str = "CODESYNC_BACKEND_URL";

const REGISTER_PATH: &str = "/api/auth/register/";
const LOGIN_PATH: &str = "/api/auth/login/";
const GOOGLE_PATH: &str = "/api/auth/google/";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AuthApiDefaults;

impl AuthApiDefaults {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);
}

#[derive(Clone, Debug)]
pub struct AuthClientOptions {
    pub connect_timeout: Duration,
    pub attempt_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for AuthClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: AuthApiDefaults::CONNECT_TIMEOUT,
            attempt_timeout: AuthApiDefaults::ATTEMPT_TIMEOUT,
            retry_policy: RetryPolicy::interactive(),
        }
    }
}

/// Signed-in user as reported by the auth service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Stable identity; doubles as the room participant name.
    pub email: String,
}

/// Credential pair returned by a successful sign-in.
#[derive(Clone, Debug)]
pub struct Credentials {
    /// Bearer token for subsequent authenticated requests.
    pub access: SecretString,
    /// The signed-in user.
    pub user: UserProfile,
}

/// HTTP client for the auth service.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    attempt_timeout: Duration,
    retry_policy: RetryPolicy,
    local: bool,
    base_url_override: Option<String>,
}

impl AuthClient {
    /// Creates an auth client for the production backend.
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn new() -> Result<Self, AuthError> {
        Self::with_options(AuthClientOptions::default())
    }

    /// Creates an auth client with explicit timeouts and retry policy.
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn with_options(options: AuthClientOptions) -> Result<Self, AuthError> {
        let http = Client::builder()
            .no_proxy()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(AuthError::Transport)?;

        Ok(Self {
            http,
            attempt_timeout: options.attempt_timeout,
            retry_policy: options.retry_policy,
            local: false,
            base_url_override: None,
        })
    }

    /// Creates an auth client honoring the `CODESYNC_BACKEND_URL`
    /// environment variable when set.
    ///
    /// # Errors
    ///
    /// Fails when the underlying HTTP client cannot be constructed.
    pub fn from_env() -> Result<Self, AuthError> {
        let mut client = Self::new()?;
        if let Ok(url) = std::env::var(AUTH_URL_ENV) {
            if !url.trim().is_empty() {
                client = client.with_base_url(url);
            }
        }
        Ok(client)
    }

    /// Enables or disables local mode endpoint routing.
    pub fn with_local_mode(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Sets an explicit base URL override.
    ///
    /// The override takes precedence over local mode when set.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url_override = Some(base_url.trim().trim_end_matches('/').to_string());
        self
    }

    /// Creates an account for `email`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] when the service refuses the
    /// registration (e.g. the account already exists), or a transport/server
    /// error after retries are exhausted.
    pub async fn register(&self, email: &str, password: &SecretString) -> Result<(), AuthError> {
        let body = json!({ "email": email, "password": password.expose_secret() });
        let _ = self.post_json(REGISTER_PATH, &body).await?;
        Ok(())
    }

    /// Exchanges email and password for credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] on invalid credentials, or a
    /// transport/server error after retries are exhausted.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<Credentials, AuthError> {
        let body = json!({ "email": email, "password": password.expose_secret() });
        let response = self.post_json(LOGIN_PATH, &body).await?;
        parse_credentials(&response)
    }

    /// Exchanges a Google identity token for credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] when the token is refused, or a
    /// transport/server error after retries are exhausted.
    pub async fn login_with_google(&self, id_token: &str) -> Result<Credentials, AuthError> {
        let body = json!({ "token": id_token });
        let response = self.post_json(GOOGLE_PATH, &body).await?;
        parse_credentials(&response)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<String, AuthError> {
        let endpoint = format!("{}{}", self.base_url(), path);
        let policy = self.retry_policy.clone();

        retry_async(
            &policy,
            |_| {
                let endpoint = endpoint.clone();
                async move { self.send_attempt(&endpoint, body).await }
            },
            AuthError::is_retryable,
        )
        .await
    }

    async fn send_attempt(&self, endpoint: &str, body: &Value) -> Result<String, AuthError> {
        let response = self
            .http
            .post(endpoint)
            .timeout(self.attempt_timeout)
            .json(body)
            .send()
            .await
            .map_err(AuthError::Transport)?;
        let status = response.status();
        let text = response.text().await.map_err(AuthError::Transport)?;

        if status.is_success() {
            return Ok(text);
        }

        let message = summarize_error_body(&text);
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            Err(AuthError::Rejected { status, message })
        } else {
            Err(AuthError::HttpStatus {
                status,
                body: message,
            })
        }
    }

    fn base_url(&self) -> &str {
        if let Some(base_url) = self.base_url_override.as_deref() {
            return base_url;
        }
        if self.local {
            LOCAL_AUTH_API_BASE_URL
        } else {
            AUTH_API_BASE_URL
        }
    }
}

/// Errors produced by auth transport and response handling.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Request could not be sent or read.
    #[error("request failed: {0}")]
    Transport(reqwest::Error),

    /// The service refused the request; carries the server's message.
    /// Never retried.
    #[error("authentication rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    /// Unexpected server-side status.
    #[error("http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },

    /// Response body did not match the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_timeout() || err.is_connect(),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Rejected { .. } | Self::Parse(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    access: String,
    user: UserProfile,
}

fn parse_credentials(body: &str) -> Result<Credentials, AuthError> {
    let parsed: SignInResponse = serde_json::from_str(body)
        .map_err(|err| AuthError::Parse(format!("sign-in response: {err}")))?;
    if parsed.access.is_empty() {
        return Err(AuthError::Parse("sign-in response missing access token".to_string()));
    }
    Ok(Credentials {
        access: SecretString::new(parsed.access),
        user: parsed.user,
    })
}

fn summarize_error_body(body: &str) -> String {
    #[derive(Debug, Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        detail: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.error.or(parsed.message).or(parsed.detail) {
            return message;
        }
    }

    body.chars().take(ERROR_BODY_SNIPPET_LEN).collect()
}
