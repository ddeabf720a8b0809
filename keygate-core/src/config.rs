use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::Deserialize;

/// Header the token is read from unless configured otherwise.
pub const DEFAULT_TOKEN_HEADER: &str = "x-access-token";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required option `{0}` is missing or empty")]
    MissingOption(&'static str),
    #[error("unsupported signature algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("malformed options: {0}")]
    Malformed(String),
    #[error("token header name `{0}` is not a valid HTTP header name")]
    InvalidTokenHeader(String),
}

/// Options as supplied by the embedding application, before validation.
///
/// Every field is optional here so that deserialized or hand-built options
/// can be checked in one place by [`Config::from_options`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Options {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub algorithms: Option<OneOrMany>,
    pub token_header: Option<String>,
    #[serde(default)]
    pub fetch_keys_first: bool,
}

/// A single value or a list of values.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Allowed signature algorithms, deduplicated and kept in the order given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Algorithms(Vec<Algorithm>);

impl Algorithms {
    pub fn new<I: IntoIterator<Item = Algorithm>>(algorithms: I) -> Result<Self, ConfigError> {
        let mut set = Vec::new();
        for algorithm in algorithms {
            if !set.contains(&algorithm) {
                set.push(algorithm);
            }
        }
        if set.is_empty() {
            return Err(ConfigError::MissingOption("algorithms"));
        }
        Ok(Self(set))
    }

    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let algorithms = names
            .iter()
            .map(|name| name.as_ref().trim())
            .filter(|name| !name.is_empty())
            .map(|name| {
                Algorithm::from_str(name).map_err(|_| ConfigError::UnknownAlgorithm(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(algorithms)
    }

    pub fn contains(&self, algorithm: Algorithm) -> bool {
        self.0.contains(&algorithm)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Algorithm> {
        self.0.iter()
    }
}

/// Validated, immutable gate configuration.
///
/// Only obtainable through validation, so fields cannot be emptied later:
///
/// ```compile_fail
/// let mut config = keygate_core::Config::new("https://issuer.test", "app", &["RS256"]).unwrap();
/// config.issuer = String::new();
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    issuer: String,
    audience: String,
    algorithms: Algorithms,
    token_header: String,
    fetch_keys_first: bool,
}

impl Config {
    pub fn new(issuer: &str, audience: &str, algorithms: &[&str]) -> Result<Self, ConfigError> {
        Self::from_options(Options {
            issuer: Some(issuer.to_string()),
            audience: Some(audience.to_string()),
            algorithms: Some(OneOrMany::Many(
                algorithms.iter().map(|a| a.to_string()).collect(),
            )),
            ..Options::default()
        })
    }

    pub fn from_options(options: Options) -> Result<Self, ConfigError> {
        let issuer = required(options.issuer, "issuer")?;
        let audience = required(options.audience, "audience")?;
        let algorithms = match options.algorithms {
            Some(names) => Algorithms::parse(&names.into_vec())?,
            None => return Err(ConfigError::MissingOption("algorithms")),
        };

        let token_header = match options.token_header {
            Some(name) if !name.trim().is_empty() => token_header_name(&name)?,
            _ => DEFAULT_TOKEN_HEADER.to_string(),
        };

        Ok(Self {
            issuer,
            audience,
            algorithms,
            token_header,
            fetch_keys_first: options.fetch_keys_first,
        })
    }

    pub fn with_token_header(mut self, name: &str) -> Result<Self, ConfigError> {
        self.token_header = token_header_name(name)?;
        Ok(self)
    }

    pub fn with_fetch_keys_first(mut self, fetch_keys_first: bool) -> Self {
        self.fetch_keys_first = fetch_keys_first;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn algorithms(&self) -> &Algorithms {
        &self.algorithms
    }

    /// Lowercased name of the header carrying the token.
    pub fn token_header(&self) -> &str {
        &self.token_header
    }

    pub fn fetch_keys_first(&self) -> bool {
        self.fetch_keys_first
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    /// Parses JSON options, e.g. `{"issuer": "...", "audience": "...", "algorithms": "RS256"}`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let options: Options =
            serde_json::from_str(s).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        Self::from_options(options)
    }
}

fn token_header_name(name: &str) -> Result<String, ConfigError> {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    {
        return Err(ConfigError::InvalidTokenHeader(name));
    }
    Ok(name)
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingOption(name)),
    }
}
