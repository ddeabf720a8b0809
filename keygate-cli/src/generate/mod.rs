use argh::FromArgs;

use crate::CliError;

pub mod jwks;
pub mod jwt;
pub mod keypair;

/// Generates signing keys, key sets and test tokens.
#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand, name = "generate")]
pub struct GenerateCommand {
    #[argh(subcommand)]
    subcommand: GenerateSubCommand,
}

#[derive(FromArgs, PartialEq, Eq, Debug)]
#[argh(subcommand)]
pub enum GenerateSubCommand {
    Keypair(keypair::GenerateKeypairCommand),
    Jwks(jwks::GenerateJwks),
    Jwt(jwt::GenerateJwt),
}

impl GenerateCommand {
    pub async fn run(&self) -> Result<(), CliError> {
        match &self.subcommand {
            GenerateSubCommand::Keypair(cmd) => cmd.run().await,
            GenerateSubCommand::Jwks(cmd) => cmd.run().await,
            GenerateSubCommand::Jwt(cmd) => cmd.run().await,
        }
    }
}
