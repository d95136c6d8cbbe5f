//! OAuth2 installed-app flow for Google accounts.
//!
//! Each token request opens the account picker (`prompt=select_account`),
//! receives the authorization code on a one-shot loopback listener, and
//! exchanges it with PKCE (S256). Grants are never cached.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

use super::endpoints::Endpoints;
use super::error::SessionError;
use super::session::{AuthorizedToken, IdentityProvider};
use crate::config::Credential;

const PKCE_VERIFIER_LEN: usize = 64;
/// How long the redirect page may take to reach the browser after the code
/// has arrived.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<html><body><h3>Account selected.</h3>\
<p>You can close this window and return to plate-sync.</p></body></html>";
const DENIED_PAGE: &str = "<html><body><h3>Authorization was not granted.</h3>\
<p>You can close this window.</p></body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// PKCE verifier and its S256 challenge.
pub(crate) struct Pkce {
    pub(crate) verifier: String,
    pub(crate) challenge: String,
}

impl Pkce {
    pub(crate) fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PKCE_VERIFIER_LEN)
            .map(char::from)
            .collect();
        let challenge = pkce_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

pub(crate) fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// What the loopback listener received.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CallbackOutcome {
    Code(String),
    Denied {
        error: String,
        description: Option<String>,
    },
    /// Request without a code or an error, e.g. a reload of the bare URI.
    Ignored,
}

pub struct InstalledAppFlow {
    client: reqwest::Client,
    endpoints: Endpoints,
    client_id: Option<Credential>,
    client_secret: Option<Credential>,
}

impl std::fmt::Debug for InstalledAppFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstalledAppFlow")
            .field("client_id", &self.client_id.is_some())
            .finish_non_exhaustive()
    }
}

impl InstalledAppFlow {
    pub fn new(
        client: reqwest::Client,
        endpoints: Endpoints,
        client_id: Option<Credential>,
        client_secret: Option<Credential>,
    ) -> Self {
        Self {
            client,
            endpoints,
            client_id,
            client_secret,
        }
    }

    fn client_id(&self) -> Result<&Credential, SessionError> {
        self.client_id
            .as_ref()
            .ok_or(SessionError::MissingCredential("GOOGLE_CLIENT_ID"))
    }

    async fn exchange_code(
        &self,
        client_id: &Credential,
        code: &str,
        redirect_uri: &str,
        verifier: &str,
    ) -> Result<AuthorizedToken, SessionError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id.expose()),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose()));
        }

        let response = self
            .client
            .post(self.endpoints.token)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        parse_token_response(status.is_success(), &text)
    }
}

#[async_trait::async_trait]
impl IdentityProvider for InstalledAppFlow {
    async fn initialize(&self) -> Result<(), SessionError> {
        self.client_id()?;
        tracing::debug!("OAuth token client initialized");
        Ok(())
    }

    async fn request_token(&self, scope: &str) -> Result<AuthorizedToken, SessionError> {
        let client_id = self.client_id()?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        let pkce = Pkce::generate();
        let state = Uuid::new_v4().to_string();

        let auth_url = authorization_url(
            &self.endpoints,
            client_id.expose(),
            &redirect_uri,
            scope,
            &state,
            &pkce.challenge,
        )?;

        println!("Choose the Google account for Drive sync by opening this URL in your browser:");
        println!();
        println!("  {}", auth_url);
        println!();

        let code = accept_callback(listener, &state).await?;
        tracing::debug!("Received authorization code, exchanging for token");
        self.exchange_code(client_id, &code, &redirect_uri, &pkce.verifier)
            .await
    }
}

pub(crate) fn authorization_url(
    endpoints: &Endpoints,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
    challenge: &str,
) -> Result<Url, SessionError> {
    Url::parse_with_params(
        endpoints.authorize,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
            ("prompt", "select_account"),
        ],
    )
    .map_err(|e| SessionError::Callback(format!("invalid authorization URL: {}", e)))
}

/// Serve the loopback redirect until a request carries the code or an error.
///
/// Every connection is handled independently, so idle or empty sockets a
/// browser opens speculatively never hold up the real redirect.
pub(crate) async fn accept_callback(
    listener: TcpListener,
    expected_state: &str,
) -> Result<String, SessionError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    let state = RedirectState {
        expected_state: Arc::from(expected_state),
        reply: Arc::new(Mutex::new(Some(reply_tx))),
    };
    let app = Router::new()
        .route("/", get(handle_redirect))
        .with_state(state);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let outcome = tokio::select! {
        reply = reply_rx => reply
            .unwrap_or_else(|_| Err(SessionError::Callback("redirect listener stopped".into()))),
        served = &mut server => {
            let reason = match served {
                Ok(Ok(())) => "redirect listener stopped".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            return Err(SessionError::Callback(reason));
        }
    };

    // Let the browser receive its page, but never wait on idle sockets.
    let _ = stop_tx.send(());
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err() {
        server.abort();
    }
    outcome
}

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    reply: Arc<Mutex<Option<oneshot::Sender<Result<String, SessionError>>>>>,
}

async fn handle_redirect(
    State(redirect): State<RedirectState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    let result = match parse_callback(params, &redirect.expected_state) {
        Ok(CallbackOutcome::Ignored) => return (StatusCode::NOT_FOUND, Html("")),
        Ok(CallbackOutcome::Code(code)) => Ok(code),
        Ok(CallbackOutcome::Denied { error, description }) => {
            Err(SessionError::AuthorizationDenied { error, description })
        }
        Err(e) => Err(e),
    };

    let response = match &result {
        Ok(_) => (StatusCode::OK, Html(SUCCESS_PAGE)),
        Err(SessionError::Callback(_)) => (StatusCode::BAD_REQUEST, Html(DENIED_PAGE)),
        Err(_) => (StatusCode::OK, Html(DENIED_PAGE)),
    };

    let sender = redirect
        .reply
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    match sender {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => tracing::debug!("Redirect already handled, ignoring repeat"),
    }
    response
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Interpret the query of a loopback request.
pub(crate) fn parse_callback(
    params: CallbackParams,
    expected_state: &str,
) -> Result<CallbackOutcome, SessionError> {
    if params.code.is_none() && params.error.is_none() {
        return Ok(CallbackOutcome::Ignored);
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(SessionError::Callback("state parameter mismatch".into()));
    }
    if let Some(error) = params.error {
        return Ok(CallbackOutcome::Denied {
            error,
            description: params.error_description,
        });
    }
    Ok(params
        .code
        .map_or(CallbackOutcome::Ignored, CallbackOutcome::Code))
}

fn parse_token_response(success: bool, body: &str) -> Result<AuthorizedToken, SessionError> {
    if !success {
        let err: TokenErrorResponse =
            serde_json::from_str(body).unwrap_or_else(|_| TokenErrorResponse {
                error: "token_exchange_failed".into(),
                error_description: Some(body.chars().take(200).collect()),
            });
        return Err(SessionError::AuthorizationDenied {
            error: err.error,
            description: err.error_description,
        });
    }

    let token: TokenResponse = serde_json::from_str(body)?;
    Ok(AuthorizedToken {
        access_token: token.access_token,
        token_type: token.token_type.unwrap_or_else(|| "Bearer".into()),
        expires_at: token
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs)),
        scope: token.scope,
    })
}
