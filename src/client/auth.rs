// OAuth 2.0 for installed apps: client secrets, token store, refresh and
// the loopback consent flow.
use crate::client::core::{HttpsClient, build_https_client};
use crate::config::Config;
use crate::context::AppContext;
use crate::storage::LocalStorage;
use anyhow::{Context, Result, anyhow, bail};
use axum::Router;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use chrono::{DateTime, Duration, Utc};
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}
fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Google wraps the secrets in "installed" or "web" depending on the client type.
#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(json)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| anyhow!("Client secrets have neither 'installed' nor 'web' section"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Cannot read OAuth client secrets '{}'. Download them from the Google Cloud console.",
                path.display()
            )
        })?;
        Self::from_json(&json).with_context(|| format!("Invalid client secrets '{}'", path.display()))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredToken {
    /// Valid when it does not expire within the next minute.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => exp > now + Duration::seconds(60),
            None => true,
        }
    }

    pub fn load(ctx: &dyn AppContext) -> Result<Option<Self>> {
        LocalStorage::load_json(&ctx.get_token_path()?)
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        LocalStorage::save_json(&ctx.get_token_path()?, self)
    }
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    // Refresh responses usually omit refresh_token; keep the one we had.
    fn into_stored(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
            scope: self.scope,
        }
    }
}

fn form_encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Clone, Debug)]
pub struct OAuthClient {
    http: HttpsClient,
    secrets: ClientSecrets,
}

impl OAuthClient {
    pub fn new(secrets: ClientSecrets) -> Result<Self> {
        Ok(Self {
            http: build_https_client()?,
            secrets,
        })
    }

    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?{}",
            self.secrets.auth_uri,
            form_encode(&[
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", CALENDAR_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ])
        )
    }

    async fn post_form(&self, fields: &[(&str, &str)]) -> Result<TokenResponse> {
        let req = Request::builder()
            .method("POST")
            .uri(&self.secrets.token_uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json")
            .body(form_encode(fields))
            .context("Failed to build token request")?;

        let response = self
            .http
            .request(req)
            .await
            .context("Token request failed")?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let text = String::from_utf8_lossy(&bytes);

        if !status.is_success() {
            bail!("Token endpoint returned {}: {}", status, text.trim());
        }
        serde_json::from_str(&text)
            .with_context(|| format!("Unexpected token response: {}", text.trim()))
    }

    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<StoredToken> {
        let now = Utc::now();
        let resp = self
            .post_form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
            ])
            .await?;
        Ok(resp.into_stored(now, None))
    }

    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| anyhow!("Stored token has no refresh token"))?;
        let now = Utc::now();
        let resp = self
            .post_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
            ])
            .await?;
        Ok(resp.into_stored(now, token.refresh_token.clone()))
    }
}

/// What the browser sent back to the loopback listener.
#[derive(Debug, PartialEq, Eq)]
pub enum Redirect {
    Code { code: String, state: Option<String> },
    Denied(String),
}

/// Query string of the OAuth redirect.
#[derive(Deserialize, Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// `None` when the request carries neither a code nor an error.
    pub fn into_redirect(self) -> Option<Redirect> {
        if let Some(e) = self.error {
            return Some(Redirect::Denied(e));
        }
        self.code.map(|code| Redirect::Code {
            code,
            state: self.state,
        })
    }
}

#[derive(Clone)]
struct CallbackState {
    outcome: Arc<Mutex<Option<oneshot::Sender<Redirect>>>>,
}

const DONE_PAGE: &str = "<html><body>Authentication complete. You may close this window.</body></html>";

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(redirect) = params.into_redirect() else {
        return (StatusCode::BAD_REQUEST, "Missing authorization code").into_response();
    };
    // Only the first redirect counts.
    match state.outcome.lock().await.take() {
        Some(sender) => {
            let _ = sender.send(redirect);
            ([(header::CONNECTION, "close")], Html(DONE_PAGE)).into_response()
        }
        None => (StatusCode::GONE, "Authorization already received").into_response(),
    }
}

/// Serves the loopback redirect until a code (or a denial) arrives, then
/// shuts the server down.
pub async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String> {
    let (outcome_tx, outcome_rx) = oneshot::channel::<Redirect>();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let app = Router::new()
        .route("/", get(callback))
        .with_state(CallbackState {
            outcome: Arc::new(Mutex::new(Some(outcome_tx))),
        });

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = outcome_rx.await;
    let _ = shutdown_tx.send(());
    match server.await {
        Ok(Err(e)) => log::warn!("OAuth redirect server error: {}", e),
        Err(e) => log::warn!("OAuth redirect server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    match outcome.map_err(|_| anyhow!("OAuth redirect server stopped before a code arrived"))? {
        Redirect::Denied(e) => bail!("Authorization was denied: {}", e),
        Redirect::Code { code, state } => {
            if state.as_deref() != Some(expected_state) {
                bail!("OAuth state mismatch; refusing the authorization code");
            }
            Ok(code)
        }
    }
}

/// Runs the interactive consent flow through a loopback redirect.
pub async fn consent(oauth: &OAuthClient, redirect_host: &str) -> Result<StoredToken> {
    let listener = TcpListener::bind((redirect_host, 0))
        .await
        .with_context(|| format!("Cannot listen on {} for the OAuth redirect", redirect_host))?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://{}:{}/", redirect_host, port);
    let state = uuid::Uuid::new_v4().simple().to_string();

    println!("Open this URL in your browser to allow calendar access:\n");
    println!("{}\n", oauth.authorization_url(&redirect_uri, &state));
    println!("Waiting for authorization on {} ...", redirect_uri);

    let code = wait_for_code(listener, &state).await?;
    oauth.exchange_code(&code, &redirect_uri).await
}

/// Returns a usable access token: stored, refreshed, or freshly consented.
pub async fn authorize(ctx: &dyn AppContext, cfg: &Config) -> Result<StoredToken> {
    let stored = match StoredToken::load(ctx) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("Ignoring unreadable token store: {:#}", e);
            None
        }
    };

    if let Some(token) = &stored
        && token.is_valid_at(Utc::now())
    {
        log::debug!("Using stored access token");
        return Ok(token.clone());
    }

    let secrets = ClientSecrets::load(&cfg.credentials_path(ctx)?)?;
    let oauth = OAuthClient::new(secrets)?;

    if let Some(token) = &stored
        && token.refresh_token.is_some()
    {
        match oauth.refresh(token).await {
            Ok(fresh) => {
                fresh.save(ctx)?;
                log::info!("Access token refreshed");
                return Ok(fresh);
            }
            Err(e) => log::warn!("Token refresh failed, asking for consent again: {:#}", e),
        }
    }

    let token = consent(&oauth, &cfg.sync.redirect_host).await?;
    token.save(ctx)?;
    Ok(token)
}
