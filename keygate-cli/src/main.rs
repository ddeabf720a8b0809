use argh::FromArgs;
use keygate_core::{ConfigError, Rejection};
use keygate_server::auth::GateError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod generate;
mod verify;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("OpenSSL error: {0}")]
    OpenSSLError(#[from] openssl::error::ErrorStack),
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("key or token error: {0}")]
    KeyError(#[from] keygate_core::Error),
    #[error("invalid verification settings: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    GateError(#[from] GateError),
    #[error("token rejected: {0}")]
    Rejected(Rejection),
    #[error("one of --jwks or --issuer-keys is required")]
    NoKeySource,
}

/// Command-line interface for keygate operations tasks.
#[derive(FromArgs, PartialEq, Eq, Debug)]
pub struct Arguments {
    #[argh(subcommand)]
    command: RootCommand,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand)]
pub enum RootCommand {
    Generate(generate::GenerateCommand),
    Verify(verify::VerifyCommand),
}

impl RootCommand {
    pub async fn run(&self) -> Result<(), CliError> {
        match self {
            RootCommand::Generate(cmd) => cmd.run().await,
            RootCommand::Verify(cmd) => cmd.run().await,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "kgcli=debug,keygate_server=debug")
    }

    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Arguments = argh::from_env();
    if let Err(e) = args.command.run().await {
        tracing::error!("command failed: {}", e);
        std::process::exit(1);
    }
}
