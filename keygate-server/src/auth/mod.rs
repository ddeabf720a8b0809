use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use keygate_core::config::Options;
use keygate_core::{jwt, Claims, Config, ConfigError, Jwks, Rejection, RevocationCheck};
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

pub mod keys;

pub use keys::{FetchError, KeyCache, KeyFetcher};

#[derive(Error, Diagnostic, Debug)]
pub enum GateError {
    #[error("authentication gate is misconfigured: {0}")]
    #[diagnostic(code(keygate::error::configuration))]
    Configuration(#[from] ConfigError),
    #[error("failed to initialize key fetcher: {0}")]
    #[diagnostic(code(keygate::error::configuration))]
    Initialization(#[source] FetchError),
    #[error("failed to fetch signing keys for issuer {issuer}: {source}")]
    #[diagnostic(code(keygate::error::key_fetch))]
    KeyFetch {
        issuer: String,
        #[source]
        source: FetchError,
    },
}

/// Outcome of a request that got as far as being judged.
#[derive(Debug, PartialEq)]
pub enum Decision {
    Authorized(Claims),
    Unauthorized(Rejection),
}

/// Verifies bearer tokens for one issuer/audience pair.
///
/// Cheap to share: wrap in an `Arc` and hand it to [`require_token`]. The
/// key cache may be shared between gates; it is keyed by issuer.
pub struct Gate {
    config: Config,
    keys: Arc<KeyCache>,
    revocation: Option<Arc<dyn RevocationCheck>>,
}

impl Gate {
    pub fn new(config: Config) -> Result<Self, GateError> {
        let fetcher = KeyFetcher::new().map_err(GateError::Initialization)?;
        Ok(Self::with_key_cache(config, Arc::new(KeyCache::new(fetcher))))
    }

    pub fn from_options(options: Options) -> Result<Self, GateError> {
        Self::new(Config::from_options(options)?)
    }

    pub fn with_key_cache(config: Config, keys: Arc<KeyCache>) -> Self {
        Self {
            config,
            keys,
            revocation: None,
        }
    }

    /// Refuse tokens whose subject `revocation` reports as revoked.
    pub fn with_revocation(mut self, revocation: Arc<dyn RevocationCheck>) -> Self {
        self.revocation = Some(revocation);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.keys
    }

    /// Judges a presented token (`None` if the request carried none).
    ///
    /// Errors are reserved for problems the caller can't fix by sending a
    /// different token: the issuer's keys could not be obtained. Everything
    /// else is a [`Decision::Unauthorized`].
    pub async fn authorize(&self, token: Option<&str>) -> Result<Decision, GateError> {
        if self.config.fetch_keys_first() {
            self.keys().await?;
        }

        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => return Ok(reject(Rejection::MissingToken)),
        };

        let jwks = self.keys().await?;

        match jwt::check(
            token,
            &jwks,
            &self.config,
            self.revocation.as_deref(),
            Utc::now().timestamp(),
        ) {
            Ok(claims) => {
                tracing::debug!(
                    subject = %claims.subject().unwrap_or_default(),
                    "token authorized"
                );
                Ok(Decision::Authorized(claims))
            }
            Err(rejection) => Ok(reject(rejection)),
        }
    }

    async fn keys(&self) -> Result<Arc<Jwks>, GateError> {
        self.keys
            .ensure_keys(self.config.issuer())
            .await
            .map_err(|source| GateError::KeyFetch {
                issuer: self.config.issuer().to_string(),
                source,
            })
    }
}

fn reject(rejection: Rejection) -> Decision {
    tracing::debug!(reason = %rejection, "token rejected");
    Decision::Unauthorized(rejection)
}

/// Middleware placing `gate` in front of the routes it is layered on.
///
/// Authorized requests continue with the verified [`Claims`] in their
/// extensions. Unauthorized ones get [`unauthorized`] and never reach the
/// handler. Gate errors are returned to axum as a [`GateError`] response.
pub async fn require_token(
    gate: Arc<Gate>,
    mut req: Request<Body>,
    next: Next<Body>,
) -> Result<Response, GateError> {
    let token = req
        .headers()
        .get(gate.config().token_header())
        .and_then(|header| header.to_str().ok())
        .map(str::to_owned);

    match gate.authorize(token.as_deref()).await? {
        Decision::Authorized(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Decision::Unauthorized(_) => Ok(unauthorized()),
    }
}

/// The one response every authorization failure gets.
pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "status": "unauthorized" })),
    )
        .into_response()
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        tracing::error!(err = %self, "authentication gate failed");

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "result": "failure",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}
