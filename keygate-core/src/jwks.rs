use std::fmt;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey};
use openssl::pkey::PKey;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{jwt, Error};

/// A JSON Web Key Set as published by an issuer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    /// Builds a single-key set from an RSA key in PEM form.
    pub fn from_pem(pem: &[u8]) -> Result<Self, Error> {
        let private_key = PKey::private_key_from_pem(pem)?;
        let rsa = private_key.rsa()?;

        let n = base64::encode_config(rsa.n().to_vec(), base64::URL_SAFE_NO_PAD);
        let e = base64::encode_config(rsa.e().to_vec(), base64::URL_SAFE_NO_PAD);
        let kid = jwt::compute_key_id(&private_key)?;

        Ok(Self {
            keys: vec![Jwk::rsa(&kid, Algorithm::RS256, &n, &e)],
        })
    }

    /// Returns the first key whose identifier equals `kid`.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    pub fn key_ids(&self) -> Vec<&str> {
        self.keys.iter().filter_map(|k| k.kid.as_deref()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Display for Jwks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", json!(self))
    }
}

impl FromStr for Jwks {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

/// A single published key. Only the members needed to rebuild a public
/// verification key are modelled; anything else in the document is ignored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    pub fn rsa(kid: &str, algorithm: Algorithm, n: &str, e: &str) -> Self {
        Self {
            kty: "RSA".to_string(),
            alg: Some(format!("{:?}", algorithm)),
            kid: Some(kid.to_string()),
            key_use: Some("sig".to_string()),
            n: Some(n.to_string()),
            e: Some(e.to_string()),
            crv: None,
            x: None,
            y: None,
        }
    }

    /// Converts the key into the form the verification primitive expects.
    ///
    /// A key that pins an algorithm via `alg` is only usable for tokens
    /// signed with that algorithm.
    pub fn decoding_key(&self, algorithm: Algorithm) -> Result<DecodingKey, Error> {
        if let Some(alg) = &self.alg {
            if *alg != format!("{:?}", algorithm) {
                return Err(self.unusable(format!("key is restricted to {}", alg)));
            }
        }
        if matches!(self.key_use.as_deref(), Some(key_use) if key_use != "sig") {
            return Err(self.unusable("key is not a signing key".to_string()));
        }

        match self.kty.as_str() {
            "RSA" => match (&self.n, &self.e) {
                (Some(n), Some(e)) => Ok(DecodingKey::from_rsa_components(n, e)?),
                _ => Err(self.unusable("RSA key without modulus or exponent".to_string())),
            },
            "EC" => match (&self.x, &self.y) {
                (Some(x), Some(y)) => Ok(DecodingKey::from_ec_components(x, y)?),
                _ => Err(self.unusable("EC key without coordinates".to_string())),
            },
            "OKP" => match &self.x {
                Some(x) => Ok(DecodingKey::from_ed_components(x)?),
                None => Err(self.unusable("OKP key without public key".to_string())),
            },
            other => Err(self.unusable(format!("unsupported key type {}", other))),
        }
    }

    fn unusable(&self, reason: String) -> Error {
        Error::UnusableKey {
            kid: self.kid.clone(),
            reason,
        }
    }
}
