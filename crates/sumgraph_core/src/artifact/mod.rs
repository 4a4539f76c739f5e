//! Artifact generation boundary.
//!
//! # Responsibility
//! - Define the "produce an artifact for a label" capability the pipeline calls.
//!
//! # Invariants
//! - A successful call always yields a usable locator; "no artifact" is an error.

pub mod openrouter;

use crate::config::ConfigError;
use thiserror::Error;

pub use openrouter::OpenRouterImageGenerator;

pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("artifact request failed: {0}")]
    Request(String),
    #[error("artifact service returned no usable artifact: {0}")]
    NoArtifact(String),
    #[error("cannot store artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates an opaque artifact for a textual label.
pub trait ArtifactGenerator {
    /// Returns the locator of the persisted artifact.
    fn generate(&self, label: &str) -> ArtifactResult<String>;
}

impl<G: ArtifactGenerator + ?Sized> ArtifactGenerator for Box<G> {
    fn generate(&self, label: &str) -> ArtifactResult<String> {
        (**self).generate(label)
    }
}
