use std::net::SocketAddr;
use std::sync::Arc;

use argh::FromArgs;
use dotenv::dotenv;
use keygate_core::config::{OneOrMany, Options};
use keygate_core::RevocationRegistry;
use miette::{Diagnostic, IntoDiagnostic, Result};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api;
use crate::auth::{Gate, GateError};

pub const ISSUER_ENV: &str = "KEYGATE_ISSUER";
pub const AUDIENCE_ENV: &str = "KEYGATE_AUDIENCE";
pub const ALGORITHMS_ENV: &str = "KEYGATE_ALGORITHMS";
pub const TOKEN_HEADER_ENV: &str = "KEYGATE_TOKEN_HEADER";

const DEFAULT_ALGORITHM: &str = "RS256";

pub struct App {
    args: Args,
}

#[derive(Error, Diagnostic, Debug)]
pub enum AppError {
    #[error("gate could not be set up: {0}")]
    #[diagnostic(
        code(keygate::error::configuration),
        help("set --issuer and --audience, or KEYGATE_ISSUER and KEYGATE_AUDIENCE")
    )]
    Gate(#[from] GateError),
}

impl App {
    pub fn new() -> Self {
        dotenv().ok();
        Self::with_args(argh::from_env())
    }

    pub fn with_args(args: Args) -> Self {
        Self { args }
    }

    /// Gate options from arguments, falling back to the environment.
    pub fn options(&self) -> Options {
        let algorithms = if !self.args.algorithm.is_empty() {
            self.args.algorithm.clone()
        } else if let Ok(value) = std::env::var(ALGORITHMS_ENV) {
            value.split(',').map(|s| s.trim().to_string()).collect()
        } else {
            vec![DEFAULT_ALGORITHM.to_string()]
        };

        Options {
            issuer: self
                .args
                .issuer
                .clone()
                .or_else(|| std::env::var(ISSUER_ENV).ok()),
            audience: self
                .args
                .audience
                .clone()
                .or_else(|| std::env::var(AUDIENCE_ENV).ok()),
            algorithms: Some(OneOrMany::Many(algorithms)),
            token_header: self
                .args
                .token_header
                .clone()
                .or_else(|| std::env::var(TOKEN_HEADER_ENV).ok()),
            fetch_keys_first: self.args.fetch_keys_first,
        }
    }

    pub async fn run(&self) -> Result<()> {
        miette::set_panic_hook();

        if std::env::var_os("RUST_BACKTRACE").is_none() {
            std::env::set_var("RUST_BACKTRACE", "1")
        }

        if std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var("RUST_LOG", "keygate_server=debug,keygate_core=debug")
        }

        if self.args.json {
            tracing_subscriber::fmt::fmt()
                .json()
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .ok();
        } else {
            tracing_subscriber::fmt::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .try_init()
                .ok();
        }

        let mut gate = Gate::from_options(self.options()).map_err(AppError::Gate)?;

        if !self.args.revoke.is_empty() {
            let registry: RevocationRegistry = self.args.revoke.iter().cloned().collect();
            tracing::debug!("{} subject(s) revoked", registry.len());
            gate = gate.with_revocation(Arc::new(registry));
        }

        let config = gate.config();
        tracing::debug!(
            issuer = config.issuer(),
            audience = config.audience(),
            header = config.token_header(),
            "verifying tokens"
        );

        let router = api::build(Arc::new(gate));

        tracing::debug!(
            ip = self.args.listen_address.ip().to_string().as_str(),
            port = self.args.listen_address.port(),
            url = format!(
                "http://{}:{}",
                self.args.listen_address.ip(),
                self.args.listen_address.port()
            ),
            "server started"
        );

        axum::Server::bind(&self.args.listen_address)
            .serve(router.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .into_diagnostic()?;

        tracing::debug!("server terminated");

        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to handle Ctrl-C signal: {}", e);
        return;
    }
    tracing::info!("ctrl-c received");
}

#[derive(FromArgs)]
/// Token-verifying gateway in front of a protected API.
pub struct Args {
    /// server address:port to listen on (default: 0.0.0.0:8080, PORT environment variable can override default port 8080)
    #[argh(
        option,
        default = "SocketAddr::from(([0, 0, 0, 0], default_listen_port()))"
    )]
    pub listen_address: SocketAddr,
    /// issuer whose published keys sign accepted tokens (default: KEYGATE_ISSUER environment variable)
    #[argh(option)]
    pub issuer: Option<String>,
    /// audience tokens must be issued for (default: KEYGATE_AUDIENCE environment variable)
    #[argh(option)]
    pub audience: Option<String>,
    /// allowed signature algorithm, may be repeated (default: KEYGATE_ALGORITHMS environment variable, or RS256)
    #[argh(option)]
    pub algorithm: Vec<String>,
    /// request header carrying the token (default: KEYGATE_TOKEN_HEADER environment variable, or x-access-token)
    #[argh(option)]
    pub token_header: Option<String>,
    /// subject to refuse even with a valid token, may be repeated
    #[argh(option)]
    pub revoke: Vec<String>,
    /// fetch issuer keys before checking whether a token was presented
    #[argh(switch)]
    pub fetch_keys_first: bool,
    /// use JSON for log messages
    #[argh(switch)]
    pub json: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::from(([127, 0, 0, 1], default_listen_port())),
            issuer: None,
            audience: None,
            algorithm: Vec::new(),
            token_header: None,
            revoke: Vec::new(),
            fetch_keys_first: false,
            json: false,
        }
    }
}

const DEFAULT_LISTEN_PORT: u16 = 8080;

fn default_listen_port() -> u16 {
    if let Ok(port_str) = std::env::var("PORT") {
        if let Ok(port) = port_str.parse() {
            tracing::debug!("using port from PORT environment variable");
            port
        } else {
            DEFAULT_LISTEN_PORT
        }
    } else {
        DEFAULT_LISTEN_PORT
    }
}
