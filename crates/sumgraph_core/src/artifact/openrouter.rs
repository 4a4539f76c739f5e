//! Image generation through the OpenRouter chat completions API.
//!
//! # Responsibility
//! - Request a single image showing the label and store it as `<uuid>.png`.
//!
//! # Invariants
//! - The API key is required at construction and never logged.
//! - Files are written only after a complete, decodable image was received.

use super::{ArtifactError, ArtifactGenerator, ArtifactResult};
use crate::config::{env_lookup, ArtifactSettings};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

const CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const IMAGE_MODEL: &str = "google/gemini-2.5-flash-image";
const REQUEST_TIMEOUT_SECS: u64 = 180;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    modalities: [&'a str; 2],
    image_config: ImageConfig<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ImageConfig<'a> {
    aspect_ratio: &'a str,
    image_size: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    images: Vec<ResponseImage>,
}

#[derive(Deserialize)]
struct ResponseImage {
    image_url: ImageUrl,
}

#[derive(Deserialize)]
struct ImageUrl {
    url: String,
}

/// Generates PNG images containing the label text.
pub struct OpenRouterImageGenerator {
    settings: ArtifactSettings,
    endpoint: String,
    client: Client,
}

impl OpenRouterImageGenerator {
    /// Builds a generator from `OPENROUTER_API_KEY` and `SUMGRAPH_ARTIFACT_DIR`.
    pub fn from_env() -> ArtifactResult<Self> {
        Self::new(ArtifactSettings::from_lookup(env_lookup)?)
    }

    pub fn new(settings: ArtifactSettings) -> ArtifactResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|err| ArtifactError::Request(err.to_string()))?;
        Ok(Self {
            settings,
            endpoint: CHAT_COMPLETIONS_URL.to_string(),
            client,
        })
    }

    fn request_image(&self, label: &str) -> ArtifactResult<Vec<u8>> {
        let prompt = image_prompt(label);
        let body = CompletionRequest {
            model: IMAGE_MODEL,
            messages: [ChatMessage {
                role: "user",
                content: &prompt,
            }],
            modalities: ["image", "text"],
            image_config: ImageConfig {
                aspect_ratio: "1:1",
                image_size: "1K",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .map_err(|err| ArtifactError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ArtifactError::Request(format!(
                "service returned {status}: {body}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|err| ArtifactError::NoArtifact(format!("unreadable response: {err}")))?;
        decode_first_image(parsed)
    }

    fn store(&self, bytes: &[u8]) -> ArtifactResult<PathBuf> {
        std::fs::create_dir_all(&self.settings.output_dir)?;
        let path = self
            .settings
            .output_dir
            .join(format!("{}.png", Uuid::new_v4().simple()));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

impl ArtifactGenerator for OpenRouterImageGenerator {
    fn generate(&self, label: &str) -> ArtifactResult<String> {
        let started_at = Instant::now();
        let result = self
            .request_image(label)
            .and_then(|bytes| self.store(&bytes));

        match result {
            Ok(path) => {
                info!(
                    "event=artifact_generate module=artifact status=ok duration_ms={} path={}",
                    started_at.elapsed().as_millis(),
                    path.display()
                );
                Ok(path.display().to_string())
            }
            Err(err) => {
                error!(
                    "event=artifact_generate module=artifact status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }
}

fn image_prompt(label: &str) -> String {
    format!("Generate an image which would contain number {label}.")
}

fn decode_first_image(response: CompletionResponse) -> ArtifactResult<Vec<u8>> {
    let url = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.images.into_iter().next())
        .map(|image| image.image_url.url)
        .ok_or_else(|| ArtifactError::NoArtifact("response contains no image".to_string()))?;

    let (_, payload) = url
        .split_once(',')
        .ok_or_else(|| ArtifactError::NoArtifact("image is not a data URL".to_string()))?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| ArtifactError::NoArtifact(format!("invalid base64 image: {err}")))?;
    if bytes.is_empty() {
        return Err(ArtifactError::NoArtifact("image payload is empty".to_string()));
    }
    Ok(bytes)
}
