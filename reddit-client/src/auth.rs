//! Application-only OAuth2 (client credentials) for the Reddit API.
//!
//! The token manager caches one bearer token and exchanges a new one when the
//! cached token is missing or within [`REFRESH_MARGIN`] of expiry. The lock is
//! held across the exchange so concurrent callers never trigger more than one
//! exchange at a time.

use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    TokenResponse, TokenUrl,
};
use scraper_core::{ConfigError, CoreError, RedditApiError};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const REFRESH_MARGIN: Duration = Duration::from_secs(10);

// Never visited by the client credentials grant, but the client needs one.
const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";

#[derive(Clone)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: Instant,
}

impl Credential {
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at
            .checked_duration_since(now)
            .map_or(false, |left| left > REFRESH_MARGIN)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error)]
enum TokenTransportError {
    #[error("token endpoint returned {status_code}: {body}")]
    Status { status_code: u16, body: String },

    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

#[derive(Debug)]
pub struct TokenManager {
    oauth_client: BasicClient,
    http_client: reqwest::Client,
    cached: Mutex<Option<Credential>>,
}

impl TokenManager {
    /// `http_client` should already carry the descriptive User-Agent Reddit
    /// requires; it is reused for the token exchange.
    pub fn new(
        http_client: reqwest::Client,
        client_id: String,
        client_secret: String,
        token_url: &str,
    ) -> Result<Self, CoreError> {
        let auth_url =
            AuthUrl::new(AUTHORIZE_URL.to_string()).map_err(|_| ConfigError::InvalidValue {
                field: "reddit.authorize_url".to_string(),
                value: AUTHORIZE_URL.to_string(),
            })?;
        let token_url =
            TokenUrl::new(token_url.to_string()).map_err(|_| ConfigError::InvalidValue {
                field: "reddit.token_url".to_string(),
                value: token_url.to_string(),
            })?;

        let oauth_client = BasicClient::new(
            ClientId::new(client_id),
            Some(ClientSecret::new(client_secret)),
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::BasicAuth);

        Ok(Self {
            oauth_client,
            http_client,
            cached: Mutex::new(None),
        })
    }

    /// Returns a token valid for at least [`REFRESH_MARGIN`], exchanging a new
    /// one if needed.
    pub async fn get_token(&self) -> Result<Credential, CoreError> {
        let mut cached = self.cached.lock().await;

        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(Instant::now()) {
                return Ok(credential.clone());
            }
            debug!("Cached Reddit token is near expiry, refreshing");
        }

        let credential = self.exchange().await?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Drops the cached token so the next call performs a fresh exchange.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn exchange(&self) -> Result<Credential, CoreError> {
        let http_client = &self.http_client;
        let token = self
            .oauth_client
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http_client, request))
            .await
            .map_err(|e| {
                let error = authentication_error(e);
                warn!("Reddit token exchange failed: {}", error);
                error
            })?;

        // A response without expires_in is treated as already expired.
        let lifetime = token.expires_in().unwrap_or_default();
        info!(
            "Obtained Reddit access token, expires in {}s",
            lifetime.as_secs()
        );

        Ok(Credential {
            access_token: token.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        })
    }
}

async fn send_token_request(
    http_client: &reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, TokenTransportError> {
    let response = http_client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    if !status_code.is_success() {
        return Err(TokenTransportError::Status {
            status_code: status_code.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn authentication_error(
    error: RequestTokenError<TokenTransportError, BasicErrorResponse>,
) -> CoreError {
    let (status_code, body) = match error {
        RequestTokenError::Request(TokenTransportError::Status { status_code, body }) => {
            (Some(status_code), body)
        }
        RequestTokenError::Request(TokenTransportError::Network(e)) => (None, e.to_string()),
        RequestTokenError::ServerResponse(response) => (None, response.to_string()),
        RequestTokenError::Parse(e, body) => (
            None,
            format!(
                "unparseable token response ({}): {}",
                e,
                String::from_utf8_lossy(&body)
            ),
        ),
        RequestTokenError::Other(message) => (None, message),
    };

    CoreError::RedditApi(RedditApiError::AuthenticationFailed { status_code, body })
}
