use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::revocation::RevocationCheck;
use crate::Config;

/// Values of the `token_use` claim that are accepted.
pub const ALLOWED_TOKEN_USES: [&str; 2] = ["id", "access"];

/// Claims of a verified token.
///
/// The registered claims the gate checks are pulled out but kept as raw
/// JSON, so a claim only fails the check that reads it. Everything else is
/// kept verbatim in `custom`, so serializing a `Claims` reproduces the
/// payload it was decoded from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "sub", skip_serializing_if = "Option::is_none")]
    pub subject: Option<Value>,
    #[serde(rename = "aud", skip_serializing_if = "Option::is_none")]
    pub audience: Option<Value>,
    #[serde(rename = "exp", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_use: Option<Value>,
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl Claims {
    /// The subject as a string. Numeric subjects are rendered in decimal.
    pub fn subject(&self) -> Option<String> {
        match &self.subject {
            Some(Value::String(subject)) => Some(subject.clone()),
            Some(Value::Number(subject)) => Some(subject.to_string()),
            _ => None,
        }
    }
}

/// Result of signature verification.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// A claims object carrying a string issuer.
    Claims(Claims),
    /// Anything else the token carried, e.g. a bare string.
    Opaque(Value),
}

impl Payload {
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => return Payload::Opaque(other),
        };

        match map.remove("iss") {
            Some(Value::String(issuer)) => Payload::Claims(Claims {
                issuer,
                subject: map.remove("sub"),
                audience: map.remove("aud"),
                expires_at: map.remove("exp"),
                token_use: map.remove("token_use"),
                custom: map,
            }),
            Some(issuer) => {
                map.insert("iss".to_string(), issuer);
                Payload::Opaque(Value::Object(map))
            }
            None => Payload::Opaque(Value::Object(map)),
        }
    }
}

/// Why a request was refused. Only ever logged, never sent to the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    MissingToken,
    MalformedToken(String),
    MissingKeyId,
    UnknownKeyId(String),
    InvalidSignature(String),
    OpaquePayload,
    Revoked(String),
    MissingExpiry,
    Expired { expires_at: Number, now: i64 },
    AudienceMismatch,
    IssuerMismatch,
    TokenUseNotAllowed(Option<String>),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingToken => write!(f, "no token presented"),
            Rejection::MalformedToken(e) => write!(f, "token is malformed: {}", e),
            Rejection::MissingKeyId => write!(f, "token header has no key ID"),
            Rejection::UnknownKeyId(kid) => write!(f, "no key with ID {} in issuer key set", kid),
            Rejection::InvalidSignature(e) => write!(f, "token failed verification: {}", e),
            Rejection::OpaquePayload => write!(f, "token payload is not a claims object"),
            Rejection::Revoked(subject) => write!(f, "subject {} is revoked", subject),
            Rejection::MissingExpiry => write!(f, "token has no numeric expiry"),
            Rejection::Expired { expires_at, now } => {
                write!(f, "token expired at {} (now {})", expires_at, now)
            }
            Rejection::AudienceMismatch => write!(f, "audience does not match"),
            Rejection::IssuerMismatch => write!(f, "issuer does not match"),
            Rejection::TokenUseNotAllowed(token_use) => {
                write!(f, "token_use {:?} is not allowed", token_use)
            }
        }
    }
}

/// Runs the claim checklist against a verified payload, stopping at the
/// first failure. `now` is the current time in whole seconds since the epoch.
///
/// Order: structure, revocation, expiry, audience, issuer, token use.
/// A token without a numeric `exp` is rejected as [`Rejection::MissingExpiry`].
pub fn validate<'p>(
    payload: &'p Payload,
    config: &Config,
    revocation: Option<&dyn RevocationCheck>,
    now: i64,
) -> Result<&'p Claims, Rejection> {
    let claims = match payload {
        Payload::Claims(claims) => claims,
        Payload::Opaque(_) => return Err(Rejection::OpaquePayload),
    };

    if let (Some(revocation), Some(subject)) = (revocation, claims.subject()) {
        if revocation.is_revoked(&subject) {
            return Err(Rejection::Revoked(subject));
        }
    }

    match &claims.expires_at {
        Some(Value::Number(expires_at)) if is_before(expires_at, now) => {
            return Err(Rejection::Expired {
                expires_at: expires_at.clone(),
                now,
            });
        }
        Some(Value::Number(_)) => {}
        _ => return Err(Rejection::MissingExpiry),
    }

    // Single string audiences only.
    match &claims.audience {
        Some(Value::String(audience)) if audience == config.audience() => {}
        _ => return Err(Rejection::AudienceMismatch),
    }

    if claims.issuer != config.issuer() {
        return Err(Rejection::IssuerMismatch);
    }

    match &claims.token_use {
        Some(Value::String(token_use)) if ALLOWED_TOKEN_USES.contains(&token_use.as_str()) => {
            Ok(claims)
        }
        Some(Value::String(token_use)) => Err(Rejection::TokenUseNotAllowed(Some(token_use.clone()))),
        None | Some(Value::Null) => Err(Rejection::TokenUseNotAllowed(None)),
        Some(other) => Err(Rejection::TokenUseNotAllowed(Some(other.to_string()))),
    }
}

/// `timestamp < now`, exact for integers and fractional NumericDates alike.
fn is_before(timestamp: &Number, now: i64) -> bool {
    if let Some(timestamp) = timestamp.as_i64() {
        timestamp < now
    } else if timestamp.is_u64() {
        false
    } else {
        // `t < now` iff `floor(t) < now` for integer `now`; the cast saturates.
        timestamp
            .as_f64()
            .map_or(true, |timestamp| (timestamp.floor() as i64) < now)
    }
}
