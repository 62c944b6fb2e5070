//! Authentication for Google APIs.
//!
//! Sessions hold an [`Authenticator`] and ask it for a bearer token before
//! every request. Two implementations talk to Google:
//!
//! - [`ServiceAccountAuth`] signs a JWT assertion with a service-account key.
//! - [`InstalledAppAuth`] uses a user's OAuth token kept in a [`TokenStore`],
//!   refreshing it when expired and falling back to an interactive consent flow
//!   in the browser when no usable token exists.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::{ClientConfig, AUTH_URI, TOKEN_URI};
use crate::error::{Result, WorkspaceError};
use crate::models::{ClientSecret, ClientSecretFile, ServiceAccountCredentials, TokenResponse};

/// Tokens this close to expiry are treated as expired.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// How long the consent flow waits for the browser redirect.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Longest request line read from a loopback connection.
const MAX_REQUEST_LINE: u64 = 8 * 1024;

/// Source of OAuth bearer tokens for API sessions.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Get a valid access token, refreshing or re-authorizing if necessary.
    async fn access_token(&self) -> Result<String>;
}

/// Authenticator that always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Build the authenticator matching the shape of the configured credentials file.
///
/// A key with `"type": "service_account"` selects [`ServiceAccountAuth`];
/// anything else is read as an OAuth client secret for [`InstalledAppAuth`].
pub fn from_config(config: &ClientConfig) -> Result<Arc<dyn Authenticator>> {
    let content = fs::read_to_string(&config.credentials_path)?;
    let raw: serde_json::Value = serde_json::from_str(&content)?;

    if raw.get("type").and_then(|t| t.as_str()) == Some("service_account") {
        let credentials: ServiceAccountCredentials = serde_json::from_value(raw)?;
        debug!(email = %credentials.client_email, "Using service account credentials");
        return Ok(Arc::new(ServiceAccountAuth::new(credentials, config)));
    }

    let secret: ClientSecretFile = serde_json::from_value(raw)?;
    let store = Arc::new(FileTokenStore::new(&config.token_path));
    debug!(token_path = ?config.token_path, "Using installed-app credentials");
    Ok(Arc::new(InstalledAppAuth::new(secret.installed, store, config)))
}

/// Endpoint to use: an overridden config value wins, otherwise the one named
/// in the credentials file, otherwise the default.
fn resolve_endpoint(configured: &str, default: &str, from_credentials: Option<&str>) -> String {
    match from_credentials {
        Some(uri) if configured == default && !uri.is_empty() => uri.to_string(),
        _ => configured.to_string(),
    }
}

/// JWT claims for service account authentication.
#[derive(Debug, Serialize)]
struct Claims {
    iss: String,   // Issuer (service account email)
    scope: String, // Space-separated OAuth scopes
    aud: String,   // Audience (token endpoint)
    exp: u64,      // Expiration time
    iat: u64,      // Issued at
}

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Authenticator for Google APIs using service account credentials.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    credentials: Arc<ServiceAccountCredentials>,
    scopes: Vec<String>,
    token_uri: String,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Create a new authenticator from credentials.
    ///
    /// The key's `token_uri` is used unless the config overrides the default.
    pub fn new(credentials: ServiceAccountCredentials, config: &ClientConfig) -> Self {
        let token_uri = resolve_endpoint(&config.token_uri, TOKEN_URI, credentials.token_uri.as_deref());
        Self {
            credentials: Arc::new(credentials),
            scopes: config.scopes.clone(),
            token_uri,
            client: Client::new(),
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Refresh the access token using JWT assertion.
    async fn refresh_token(&self) -> Result<CachedToken> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| WorkspaceError::AuthenticationError(e.to_string()))?
            .as_secs();

        let claims = Claims {
            iss: self.credentials.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + 3600, // 1 hour
        };

        let header = Header::new(Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(self.credentials.private_key.as_bytes())?;
        let jwt = encode(&header, &claims, &key)?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", jwt.as_str()),
        ];

        let token_response = post_token_form(&self.client, &self.token_uri, &params).await?;

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: SystemTime::now() + Duration::from_secs(token_response.expires_in),
        })
    }
}

#[async_trait]
impl Authenticator for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_BUFFER {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.refresh_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }
}

/// A user token as persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredToken {
    fn from_response(response: TokenResponse, scopes: &[String], previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expiry: Utc::now() + chrono::Duration::seconds(response.expires_in as i64),
            scopes: scopes.to_vec(),
        }
    }

    /// Unexpired (with a safety buffer) as of `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now + chrono::Duration::seconds(EXPIRY_BUFFER.as_secs() as i64)
    }

    /// Whether the token was granted every requested scope.
    ///
    /// Tokens that did not record their scopes are assumed to cover them.
    pub fn covers(&self, scopes: &[String]) -> bool {
        self.scopes.is_empty() || scopes.iter().all(|s| self.scopes.contains(s))
    }
}

/// Persistence port for user tokens.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Result<Option<StoredToken>>;
    async fn save(&self, token: &StoredToken) -> Result<()>;
}

/// Token store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Ignoring unreadable token cache");
                Ok(None)
            }
        }
    }

    async fn save(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Authenticator for a user account via the OAuth installed-app flow.
pub struct InstalledAppAuth {
    secret: ClientSecret,
    scopes: Vec<String>,
    auth_uri: String,
    token_uri: String,
    store: Arc<dyn TokenStore>,
    client: Client,
    current: Mutex<Option<StoredToken>>,
}

impl InstalledAppAuth {
    /// Endpoints named in the client secret are used unless the config
    /// overrides the defaults.
    pub fn new(secret: ClientSecret, store: Arc<dyn TokenStore>, config: &ClientConfig) -> Self {
        Self {
            scopes: config.scopes.clone(),
            auth_uri: resolve_endpoint(&config.auth_uri, AUTH_URI, secret.auth_uri.as_deref()),
            token_uri: resolve_endpoint(&config.token_uri, TOKEN_URI, secret.token_uri.as_deref()),
            secret,
            store,
            client: Client::new(),
            current: Mutex::new(None),
        }
    }

    /// Consent page URL for the given loopback redirect.
    pub fn consent_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.secret.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| WorkspaceError::ConsentFlowError(format!("invalid auth URI: {}", e)))?;
        Ok(url.into())
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = post_token_form(&self.client, &self.token_uri, &params).await?;
        debug!("Refreshed user access token");
        Ok(StoredToken::from_response(
            response,
            &self.scopes,
            Some(refresh_token.to_string()),
        ))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<StoredToken> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];

        let response = post_token_form(&self.client, &self.token_uri, &params).await?;
        Ok(StoredToken::from_response(response, &self.scopes, None))
    }

    /// Run the browser consent flow against a one-shot loopback listener.
    #[instrument(skip(self))]
    async fn run_consent_flow(&self) -> Result<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let url = self.consent_url(&redirect_uri, &state)?;
        info!("Waiting for authorization on {}", redirect_uri);
        eprintln!("Please visit this URL to authorize this application:\n{}", url);

        let redirect = wait_for_redirect(&listener, CONSENT_TIMEOUT).await?;
        if redirect.state != state {
            return Err(WorkspaceError::ConsentFlowError("state mismatch".to_string()));
        }

        self.exchange_code(&redirect.code, &redirect_uri).await
    }

    async fn obtain_token(&self, previous: Option<StoredToken>) -> Result<StoredToken> {
        let refresh_token = previous
            .filter(|t| t.covers(&self.scopes))
            .and_then(|t| t.refresh_token);

        if let Some(refresh_token) = refresh_token {
            match self.refresh(&refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) => warn!(error = %e, "Token refresh failed, requesting consent"),
            }
        }

        self.run_consent_flow().await
    }
}

#[async_trait]
impl Authenticator for InstalledAppAuth {
    async fn access_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;

        if current.is_none() {
            *current = self.store.load().await?;
        }

        if let Some(token) = current.as_ref() {
            if token.is_valid_at(Utc::now()) && token.covers(&self.scopes) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.obtain_token(current.take()).await?;
        self.store.save(&token).await?;
        let access_token = token.access_token.clone();
        *current = Some(token);

        Ok(access_token)
    }
}

/// Authorization code and state carried by the consent redirect.
#[derive(Debug, PartialEq)]
pub struct ConsentRedirect {
    pub code: String,
    pub state: String,
}

/// Serve loopback connections until one carries the consent redirect, for at
/// most `timeout`.
async fn wait_for_redirect(listener: &TcpListener, timeout: Duration) -> Result<ConsentRedirect> {
    tokio::time::timeout(timeout, serve_redirect(listener))
        .await
        .map_err(|_| WorkspaceError::ConsentFlowError("timed out waiting for authorization".to_string()))?
}

/// Requests without `code` or `error` (favicon fetches, speculative
/// connections) get a 404 and are skipped.
async fn serve_redirect(listener: &TcpListener) -> Result<ConsentRedirect> {
    loop {
        let (stream, _) = listener.accept().await?;
        let mut reader = BufReader::new(stream).take(MAX_REQUEST_LINE);
        let mut request_line = String::new();
        if let Err(e) = reader.read_line(&mut request_line).await {
            debug!(error = %e, "Dropping unreadable loopback request");
            continue;
        }

        let outcome = parse_redirect_request(&request_line);
        let (status, reply) = match &outcome {
            Ok(Some(_)) => ("200 OK", "The authentication flow has completed. You may close this window."),
            Ok(None) => ("404 Not Found", "Not found."),
            Err(_) => ("200 OK", "The authentication flow failed. Check the terminal for details."),
        };
        let mut stream = reader.into_inner().into_inner();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            reply.len(),
            reply
        );
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            debug!(error = %e, "Failed to answer loopback request");
        }
        let _ = stream.shutdown().await;

        match outcome {
            Ok(Some(redirect)) => return Ok(redirect),
            Ok(None) => debug!(request = %request_line.trim(), "Ignoring loopback request"),
            Err(e) => return Err(e),
        }
    }
}

/// Parse the request line of a loopback request, e.g.
/// `GET /?state=abc&code=4/0Ab HTTP/1.1`.
///
/// Returns `Ok(None)` for requests that carry neither `code` nor `error`.
pub fn parse_redirect_request(request_line: &str) -> Result<Option<ConsentRedirect>> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return Ok(None);
    }
    let Some(target) = parts.next() else {
        return Ok(None);
    };

    let url = Url::parse("http://127.0.0.1")
        .and_then(|base| base.join(target))
        .map_err(|e| WorkspaceError::ConsentFlowError(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(WorkspaceError::ConsentFlowError(format!(
                    "authorization denied: {}",
                    value
                )))
            }
            _ => {}
        }
    }

    let Some(code) = code else {
        return Ok(None);
    };
    let state = state.ok_or_else(|| WorkspaceError::ConsentFlowError("redirect carried no state".to_string()))?;

    Ok(Some(ConsentRedirect { code, state }))
}

async fn post_token_form(client: &Client, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = client.post(token_uri).form(params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(WorkspaceError::TokenRefreshError(format!(
            "Status {}: {}",
            status, body
        )));
    }

    Ok(response.json().await?)
}
