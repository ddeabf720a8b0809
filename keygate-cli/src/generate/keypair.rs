use std::fs;

use argh::FromArgs;
use camino::Utf8PathBuf;
use openssl::rsa::Rsa;

use crate::CliError;

pub const DEFAULT_KEY_SIZE: u32 = 2048;

/// Generate an RSA signing keypair as unencrypted PEM files.
#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand, name = "keypair")]
pub struct GenerateKeypairCommand {
    #[argh(positional)]
    public_key_file_name: Utf8PathBuf,

    #[argh(positional)]
    private_key_file_name: Utf8PathBuf,

    /// key size in bits (default: 2048)
    #[argh(option, default = "DEFAULT_KEY_SIZE")]
    size: u32,
}

impl GenerateKeypairCommand {
    pub async fn run(&self) -> Result<(), CliError> {
        tracing::info!("generating RSA keypair ({} bits)", self.size);

        let key = Rsa::generate(self.size)?;

        tracing::info!("saving private key to {}", self.private_key_file_name);
        fs::write(&self.private_key_file_name, key.private_key_to_pem()?)?;
        tracing::info!("saving public key to {}", self.public_key_file_name);
        fs::write(&self.public_key_file_name, key.public_key_to_pem()?)?;

        Ok(())
    }
}
