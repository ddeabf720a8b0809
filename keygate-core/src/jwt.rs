use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, Validation};
use openssl::hash::{Hasher, MessageDigest};
use openssl::pkey::{HasPublic, PKey};
use serde_json::{json, Value};

use crate::claims::{self, Claims, Payload, Rejection};
use crate::jwks::{Jwk, Jwks};
use crate::revocation::RevocationCheck;
use crate::{Algorithms, Config, Error};

/// Issues signed tokens with an RSA key. Used by tests and operator tooling
/// to stand in for a real issuer.
#[derive(Clone)]
pub struct Generator {
    encoding_key: EncodingKey,
    key_id: String,
    algorithm: Algorithm,
    issuer: String,
    audience: String,
}

impl Generator {
    pub fn new_from_pem(pem: &[u8], issuer: &str, audience: &str) -> Result<Self, Error> {
        let private_key = PKey::private_key_from_pem(pem)?;
        let key_id = compute_key_id(&private_key)?;
        let encoding_key = EncodingKey::from_rsa_pem(pem)?;
        Ok(Self {
            encoding_key,
            key_id,
            algorithm: Algorithm::RS256,
            issuer: issuer.to_string(),
            audience: audience.to_owned(),
        })
    }

    /// Signs with a different RSA algorithm, e.g. `RS384` or `PS256`.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Overrides the `kid` placed in token headers.
    pub fn with_key_id(mut self, key_id: &str) -> Self {
        self.key_id = key_id.to_string();
        self
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Claims for `subject` that pass every check of a gate configured with
    /// this generator's issuer and audience.
    pub fn claims(&self, subject: &str, token_use: &str, expiry: Duration) -> Value {
        json!({
            "sub": subject,
            "iss": self.issuer,
            "aud": self.audience,
            "iat": Utc::now().timestamp(),
            "exp": (Utc::now() + expiry).timestamp(),
            "token_use": token_use,
        })
    }

    pub fn generate(&self, subject: &str, token_use: &str, expiry: Duration) -> Result<String, Error> {
        self.sign(&self.claims(subject, token_use, expiry))
    }

    /// Signs an arbitrary payload.
    pub fn sign(&self, claims: &Value) -> Result<String, Error> {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.key_id.clone());
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
    }
}

/// Verifies a token's structure and signature with `jwk`, accepting only
/// the given algorithms.
pub fn verify(token: &str, jwk: &Jwk, algorithms: &Algorithms) -> Result<Payload, Error> {
    let header = jsonwebtoken::decode_header(token)?;
    if !algorithms.contains(header.alg) {
        return Err(Error::JWTAlgorithmNotAllowed(header.alg));
    }

    let key = jwk.decoding_key(header.alg)?;

    // Registered claims are checked by `claims::validate`, in its order.
    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    let data = jsonwebtoken::decode::<Value>(token, &key, &validation)?;
    Ok(Payload::from_value(data.claims))
}

/// Everything after the key set is available: decode the header, select the
/// key, verify the signature and validate the claims.
pub fn check(
    token: &str,
    jwks: &Jwks,
    config: &Config,
    revocation: Option<&dyn RevocationCheck>,
    now: i64,
) -> Result<Claims, Rejection> {
    let header =
        jsonwebtoken::decode_header(token).map_err(|e| Rejection::MalformedToken(e.to_string()))?;
    let kid = header.kid.ok_or(Rejection::MissingKeyId)?;
    let jwk = jwks
        .find(&kid)
        .ok_or_else(|| Rejection::UnknownKeyId(kid.clone()))?;

    let payload = verify(token, jwk, config.algorithms())
        .map_err(|e| Rejection::InvalidSignature(e.to_string()))?;

    claims::validate(&payload, config, revocation, now).cloned()
}

/// Offline verifier over a fixed key set.
pub struct Verifier {
    jwks: Jwks,
    config: Config,
}

impl Verifier {
    pub fn new_from_jwks(jwks: &str, config: Config) -> Result<Self, Error> {
        Ok(Self {
            jwks: jwks.parse()?,
            config,
        })
    }

    pub fn key_ids(&self) -> Vec<&str> {
        self.jwks.key_ids()
    }

    pub fn verify(&self, token: &str) -> Result<Claims, Rejection> {
        check(
            token.trim(),
            &self.jwks,
            &self.config,
            None,
            Utc::now().timestamp(),
        )
    }
}

/// Key ID derived from the SHA-256 digest of the DER-encoded public key.
pub fn compute_key_id<T: HasPublic>(key: &PKey<T>) -> Result<String, Error> {
    let public_key_der = key.public_key_to_der()?;
    let mut hasher = Hasher::new(MessageDigest::sha256())?;
    hasher.update(&public_key_der)?;
    let digest_bytes = hasher.finish()?;
    let kid = base64::encode_config(&digest_bytes, base64::URL_SAFE_NO_PAD);
    Ok(kid)
}
