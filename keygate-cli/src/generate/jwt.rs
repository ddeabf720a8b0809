use std::fs;

use argh::FromArgs;
use camino::Utf8PathBuf;
use keygate_core::jwt::Generator;

use crate::CliError;

/// Issue a JSON Web Token signed by the key in a given file.
#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand, name = "jwt")]
pub struct GenerateJwt {
    /// path to PEM file containing signing key
    #[argh(positional)]
    key_file_name: Utf8PathBuf,
    /// path to output JWT file
    #[argh(positional)]
    file_name: Utf8PathBuf,
    /// subject the JWT is issued for
    #[argh(positional)]
    subject: String,
    /// issuer placed in the iss claim
    #[argh(option)]
    issuer: String,
    /// audience placed in the aud claim
    #[argh(option)]
    audience: String,
    /// token_use claim, id or access (default: access)
    #[argh(option, default = "String::from(\"access\")")]
    token_use: String,
    /// how long until the JWT expires, in hours from now (default: 12)
    #[argh(option, default = "12")]
    expiry_hours: i64,
}

impl GenerateJwt {
    pub async fn run(&self) -> Result<(), CliError> {
        tracing::info!("issuing JWT signed by key in {}", self.key_file_name);

        let pem = fs::read(&self.key_file_name)?;
        let generator = Generator::new_from_pem(&pem, &self.issuer, &self.audience)?;
        let jwt = generator.generate(
            &self.subject,
            &self.token_use,
            chrono::Duration::hours(self.expiry_hours),
        )?;

        tracing::info!("saving JWT to {}", self.file_name);
        fs::write(&self.file_name, jwt.as_bytes())?;

        Ok(())
    }
}
