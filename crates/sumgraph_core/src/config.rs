//! Environment-resolved settings for remote collaborators.
//!
//! # Responsibility
//! - Resolve connection parameters from process environment or an injected lookup.
//! - Reject missing values before any network client is built.
//!
//! # Invariants
//! - Blank values are treated as missing.
//! - Secrets are never included in `Debug` output or error messages.

use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use thiserror::Error;

pub const ENV_SHEETS_CREDENTIALS_PATH: &str = "GOOGLE_SHEETS_CREDENTIALS_PATH";
pub const ENV_NEO4J_URI: &str = "NEO4J_URI";
pub const ENV_NEO4J_USER: &str = "NEO4J_USER";
pub const ENV_NEO4J_PASSWORD: &str = "NEO4J_PASSWORD";
pub const ENV_NEO4J_DATABASE: &str = "NEO4J_DATABASE";
/// Spellings used by existing `.env` files; read when the upper-case name is unset.
pub const ENV_LEGACY_NEO4J_URI: &str = "NEO4j_URI";
pub const ENV_LEGACY_NEO4J_USER: &str = "NEO4j_USER";
pub const ENV_LEGACY_NEO4J_PASSWORD: &str = "NEO4j_PASSWORD";
pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_ARTIFACT_DIR: &str = "SUMGRAPH_ARTIFACT_DIR";
pub const ENV_DATE_FORMAT: &str = "SUMGRAPH_DATE_FORMAT";

const DEFAULT_NEO4J_DATABASE: &str = "neo4j";
const DEFAULT_ARTIFACT_DIR: &str = "images";

/// Configuration resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing configuration value `{0}`")]
    MissingVar(&'static str),
    #[error("invalid configuration value for `{name}`: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Reads one value from the process environment.
pub fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn required_or_legacy(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    legacy: &str,
) -> Result<String, ConfigError> {
    optional(lookup, name)
        .or_else(|| optional(lookup, legacy))
        .ok_or(ConfigError::MissingVar(name))
}

/// Wire protocol selected by the graph server URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreProtocol {
    /// `http://`, `https://`: transactional HTTP endpoint.
    Http,
    /// `neo4j://`, `bolt://` and their `+s`/`+ssc` variants.
    Bolt,
}

impl StoreProtocol {
    fn from_uri(uri: &str) -> Option<Self> {
        let (scheme, _) = uri.split_once("://")?;
        match scheme.to_ascii_lowercase().as_str() {
            "http" | "https" => Some(Self::Http),
            "neo4j" | "neo4j+s" | "neo4j+ssc" | "bolt" | "bolt+s" | "bolt+ssc" => Some(Self::Bolt),
            _ => None,
        }
    }
}

/// Connection parameters for the graph store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Graph server URI, e.g. `neo4j://localhost:7687` or `http://localhost:7474`.
    pub uri: String,
    pub protocol: StoreProtocol,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl StoreSettings {
    /// Resolves settings through `lookup`; all three connection values are required.
    ///
    /// Each `NEO4J_*` name falls back to its `NEO4j_*` spelling.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let uri = required_or_legacy(&lookup, ENV_NEO4J_URI, ENV_LEGACY_NEO4J_URI)?;
        let protocol = StoreProtocol::from_uri(&uri).ok_or_else(|| ConfigError::InvalidValue {
            name: ENV_NEO4J_URI,
            reason: format!("unsupported scheme in `{uri}`; expected neo4j, bolt or http(s)"),
        })?;

        Ok(Self {
            uri: uri.trim_end_matches('/').to_string(),
            protocol,
            user: required_or_legacy(&lookup, ENV_NEO4J_USER, ENV_LEGACY_NEO4J_USER)?,
            password: required_or_legacy(&lookup, ENV_NEO4J_PASSWORD, ENV_LEGACY_NEO4J_PASSWORD)?,
            database: optional(&lookup, ENV_NEO4J_DATABASE)
                .unwrap_or_else(|| DEFAULT_NEO4J_DATABASE.to_string()),
        })
    }
}

impl Debug for StoreSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSettings")
            .field("uri", &self.uri)
            .field("protocol", &self.protocol)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Settings for the image generation service.
#[derive(Clone, PartialEq, Eq)]
pub struct ArtifactSettings {
    pub api_key: String,
    pub output_dir: PathBuf,
}

impl ArtifactSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: required(&lookup, ENV_OPENROUTER_API_KEY)?,
            output_dir: optional(&lookup, ENV_ARTIFACT_DIR)
                .map_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR), PathBuf::from),
        })
    }
}

impl Debug for ArtifactSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSettings")
            .field("api_key", &"<redacted>")
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

/// Resolves the spreadsheet credentials path: explicit argument first, then environment.
pub fn resolve_credentials_path(
    explicit: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PathBuf, ConfigError> {
    explicit
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| optional(&lookup, ENV_SHEETS_CREDENTIALS_PATH))
        .map(PathBuf::from)
        .ok_or(ConfigError::MissingVar(ENV_SHEETS_CREDENTIALS_PATH))
}

/// Returns the date pattern override from environment, if any.
pub fn date_format_override(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    optional(&lookup, ENV_DATE_FORMAT)
}
