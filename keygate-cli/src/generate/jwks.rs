use std::fs;

use argh::FromArgs;
use camino::Utf8PathBuf;
use keygate_core::Jwks;

use crate::CliError;

/// Generate the JSON Web Key Set an issuer would publish for a signing key.
#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand, name = "jwks")]
pub struct GenerateJwks {
    /// path to PEM file containing signing key
    #[argh(positional)]
    key_file_name: Utf8PathBuf,
    /// path to output JWKS file
    #[argh(positional)]
    file_name: Utf8PathBuf,
}

impl GenerateJwks {
    pub async fn run(&self) -> Result<(), CliError> {
        tracing::info!("generating JWKS from key in {}", self.key_file_name);

        let pem = fs::read(&self.key_file_name)?;
        let jwks = Jwks::from_pem(&pem)?;

        tracing::info!(
            "saving JWKS with key ID {} to {}",
            jwks.key_ids().join(", "),
            self.file_name
        );
        fs::write(&self.file_name, jwks.to_string())?;

        Ok(())
    }
}
