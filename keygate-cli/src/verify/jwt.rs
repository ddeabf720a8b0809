use std::fs;

use argh::FromArgs;
use camino::Utf8PathBuf;
use keygate_core::jwt::Verifier;
use keygate_core::Config;
use keygate_server::auth::{Decision, Gate};
use serde_json::json;

use crate::CliError;

/// Verify a JSON Web Token the way the gate would.
#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand, name = "jwt")]
pub struct VerifyJwt {
    /// path to file containing JWT to verify
    #[argh(positional)]
    jwt_file_name: Utf8PathBuf,
    /// expected issuer
    #[argh(option)]
    issuer: String,
    /// expected audience
    #[argh(option)]
    audience: String,
    /// allowed signature algorithm, may be repeated (default: RS256)
    #[argh(option)]
    algorithm: Vec<String>,
    /// path to JWKS file containing signing keys
    #[argh(option)]
    jwks: Option<Utf8PathBuf>,
    /// fetch signing keys from the issuer instead of a file
    #[argh(switch)]
    issuer_keys: bool,
}

impl VerifyJwt {
    fn config(&self) -> Result<Config, CliError> {
        let algorithms: Vec<&str> = if self.algorithm.is_empty() {
            vec!["RS256"]
        } else {
            self.algorithm.iter().map(String::as_str).collect()
        };
        Ok(Config::new(&self.issuer, &self.audience, &algorithms)?)
    }

    pub async fn run(&self) -> Result<(), CliError> {
        let config = self.config()?;
        let jwt = fs::read_to_string(&self.jwt_file_name)?;

        let claims = match (&self.jwks, self.issuer_keys) {
            (Some(jwks_file_name), _) => {
                tracing::info!(
                    "verifying JWT from {} against keys in {}",
                    self.jwt_file_name,
                    jwks_file_name
                );
                let verifier = Verifier::new_from_jwks(&fs::read_to_string(jwks_file_name)?, config)?;
                verifier.verify(&jwt).map_err(CliError::Rejected)?
            }
            (None, true) => {
                tracing::info!(
                    "verifying JWT from {} against keys published by {}",
                    self.jwt_file_name,
                    self.issuer
                );
                match Gate::new(config)?.authorize(Some(&jwt)).await? {
                    Decision::Authorized(claims) => claims,
                    Decision::Unauthorized(rejection) => return Err(CliError::Rejected(rejection)),
                }
            }
            (None, false) => return Err(CliError::NoKeySource),
        };

        tracing::info!("JWT verified with claims: {}", json!(claims));

        Ok(())
    }
}
