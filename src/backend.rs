//! Client for the story, image and narration generation endpoints.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fmt::Display, time::Duration};

/// Voice used when none, or an unusable one, is configured
pub const FALLBACK_VOICE_ID: &str = "storyteller";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Opaque narration voice identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceId(String);

impl VoiceId {
    /// Accepts non-empty ids made of ASCII letters, digits, `-` and `_`,
    /// anything else resolves to [FALLBACK_VOICE_ID].
    pub fn resolve(raw: Option<&str>) -> Self {
        let valid = raw.map(str::trim).filter(|id| {
            !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });

        match valid {
            Some(id) => VoiceId(id.to_string()),
            None => {
                if let Some(raw) = raw {
                    warn!("Invalid voice id {raw:?}, using {FALLBACK_VOICE_ID}");
                }
                VoiceId(FALLBACK_VOICE_ID.to_string())
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VoiceId {
    fn default() -> Self {
        VoiceId(FALLBACK_VOICE_ID.to_string())
    }
}

impl Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media generation collaborator. Every call resolves to a locator or an
/// error, never panics.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<String>;

    async fn generate_audio(&self, text: &str, voice: &VoiceId) -> Result<String>;

    async fn generate_story(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    image_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioResponse {
    audio_url: String,
}

#[derive(Deserialize)]
struct StoryResponse {
    story: String,
}

/// [GenerationBackend] over HTTP: `POST {base_url}/generate-*` with JSON.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        if rustls::crypto::ring::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls crypto provider already installed");
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{endpoint}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{endpoint} returned an error"))?;

        response
            .json::<R>()
            .await
            .with_context(|| format!("Invalid response from {endpoint}"))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate_image(&self, prompt: &str) -> Result<String> {
        let response: ImageResponse = self
            .post("generate-image", &PromptRequest { prompt })
            .await?;
        Ok(response.image_url)
    }

    async fn generate_audio(&self, text: &str, voice: &VoiceId) -> Result<String> {
        let request = AudioRequest {
            text,
            voice_id: voice.as_str(),
        };
        let response: AudioResponse = self.post("generate-audio", &request).await?;
        Ok(response.audio_url)
    }

    async fn generate_story(&self, prompt: &str) -> Result<String> {
        let response: StoryResponse = self
            .post("generate-story", &PromptRequest { prompt })
            .await?;
        Ok(response.story)
    }
}
