//! Outbound `Authorization` header providers.
//!
//! A provider is a closed set of variants built from the `target.auth`
//! configuration block: no auth, static Basic, static Bearer, or an OAuth2
//! refresh-token flow with a cached access token. The OAuth2 cache is guarded
//! by its own lock so credential refreshes never serialize unrelated jobs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use conveyor_config::{AuthKind, AuthSettings};

/// Safety margin subtracted from `expires_in` to absorb clock skew and
/// request latency.
const EXPIRY_MARGIN: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth configuration is missing {0}")]
    MissingField(&'static str),

    #[error("token request failed: {0}")]
    TokenRequest(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
}

/// Produces the value of an `Authorization` header on demand.
#[derive(Debug, Clone)]
pub enum AuthProvider {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    OAuth2(OAuth2Provider),
}

impl AuthProvider {
    /// Build a provider from validated auth settings.
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, AuthError> {
        let require = |value: &Option<String>, field: &'static str| {
            value.clone().ok_or(AuthError::MissingField(field))
        };

        match settings.kind {
            AuthKind::None => Ok(Self::None),
            AuthKind::Basic => Ok(Self::Basic {
                username: require(&settings.username, "username")?,
                password: require(&settings.password, "password")?,
            }),
            AuthKind::Bearer => Ok(Self::Bearer {
                token: require(&settings.token, "token")?,
            }),
            AuthKind::OAuth2 => Ok(Self::OAuth2(OAuth2Provider::new(
                require(&settings.client_id, "client_id")?,
                require(&settings.client_secret, "client_secret")?,
                require(&settings.token_url, "token_url")?,
                require(&settings.refresh_token, "refresh_token")?,
            ))),
        }
    }

    /// The header value to attach, or `None` when no auth is configured.
    ///
    /// Basic and Bearer never fail; OAuth2 may perform a token refresh.
    pub async fn auth_header(&self) -> Result<Option<String>, AuthError> {
        match self {
            Self::None => Ok(None),
            Self::Basic { username, password } => {
                let encoded = BASE64.encode(format!("{username}:{password}"));
                Ok(Some(format!("Basic {encoded}")))
            }
            Self::Bearer { token } => Ok(Some(format!("Bearer {token}"))),
            Self::OAuth2(provider) => provider.auth_header().await.map(Some),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Refresh-token grant against a token endpoint, with a cached access token.
#[derive(Debug, Clone)]
pub struct OAuth2Provider {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    refresh_token: String,
    // Per-instance lock: holds callers back only while this provider's own
    // token is being refreshed.
    cache: Arc<Mutex<Option<CachedToken>>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl OAuth2Provider {
    pub fn new(
        client_id: String,
        client_secret: String,
        token_url: String,
        refresh_token: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            token_url,
            refresh_token,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Return `Bearer <token>`, refreshing through the token endpoint when the
    /// cached token is absent or past its expiry.
    ///
    /// The cache lock is held across the refresh so concurrent callers never
    /// issue duplicate refreshes; the second caller observes the fresh token.
    pub async fn auth_header(&self) -> Result<String, AuthError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(format!("Bearer {}", cached.access_token));
            }
        }

        let token = self.refresh_access_token().await?;
        let header = format!("Bearer {}", token.access_token);
        *cache = Some(token);
        Ok(header)
    }

    async fn refresh_access_token(&self) -> Result<CachedToken, AuthError> {
        debug!(token_url = %self.token_url, "refreshing oauth2 access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now()
                + Duration::from_secs(token.expires_in.saturating_sub(EXPIRY_MARGIN.as_secs())),
        })
    }
}
