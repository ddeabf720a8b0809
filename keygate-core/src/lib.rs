pub mod claims;
pub mod config;
pub mod jwks;
pub mod jwt;
pub mod revocation;

pub use claims::{Claims, Payload, Rejection};
pub use config::{Algorithms, Config, ConfigError};
pub use jsonwebtoken::Algorithm;
pub use jwks::{Jwk, Jwks};
pub use revocation::{RevocationCheck, RevocationRegistry};

/// Path, relative to the issuer, where signing keys are published.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("OpenSSL error: {0}")]
    OpenSSLError(#[from] openssl::error::ErrorStack),
    #[error("JSON serialization error: {0}")]
    JSONSerializationError(#[from] serde_json::Error),
    #[error("JWT verification error: {0}")]
    JWTVerificationError(#[from] jsonwebtoken::errors::Error),
    #[error("JWT algorithm {0:?} is not allowed")]
    JWTAlgorithmNotAllowed(jsonwebtoken::Algorithm),
    #[error("key {kid:?} cannot be used for verification: {reason}")]
    UnusableKey { kid: Option<String>, reason: String },
}
