/// Top-level error type. All public API functions return this or one of its parts.
#[derive(Debug, thiserror::Error)]
pub enum BookscanError {
    #[error("Identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    #[error("Catalog lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("Not an ISBN-13 identifier: {0:?}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("Catalog application ID is not configured")]
    MisconfiguredCredential,

    #[error("Invalid catalog endpoint {endpoint:?}: {detail}")]
    InvalidEndpoint { endpoint: String, detail: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unable to get an item from JSON tree")]
    MalformedResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
