use crate::error::ProviderError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Voice used when no voice id is configured.
pub const DEFAULT_VOICE_ID: &str = "Z61JuDmU52ECd8UROolE";

/// Encoding of the audio returned by [`ElevenLabsSynthesizer`].
pub const SYNTHESIZED_AUDIO_MIME_TYPE: &str = "audio/mpeg";

pub const ELEVENLABS_API_BASE: &str = "https://api.elevenlabs.io";

/// Converts reply text into spoken audio.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns the synthesized audio bytes for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
}

/// A `SpeechSynthesizer` backed by the ElevenLabs streaming TTS endpoint.
pub struct ElevenLabsSynthesizer {
    http: reqwest::Client,
    api_key: String,
    voice_id: String,
    api_base: String,
}

impl ElevenLabsSynthesizer {
    pub fn new(api_key: String, voice_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            voice_id,
            api_base: ELEVENLABS_API_BASE.to_string(),
        }
    }

    /// Points the synthesizer at a different API host (e.g. a regional endpoint).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream?optimize_streaming_latency=1",
            self.api_base.trim_end_matches('/'),
            self.voice_id
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http
            .post(self.endpoint())
            .header(reqwest::header::ACCEPT, SYNTHESIZED_AUDIO_MIME_TYPE)
            .header("xi-api-key", &self.api_key)
            .json(&SynthesisRequest { text })
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        if audio.is_empty() {
            return Err(ProviderError::MalformedPayload(
                "synthesis returned no audio".into(),
            ));
        }
        debug!(bytes = audio.len(), "Received synthesized audio.");
        Ok(audio.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_voice_and_latency_hint() {
        let synth = ElevenLabsSynthesizer::new("key".into(), DEFAULT_VOICE_ID.into());
        assert_eq!(
            synth.endpoint(),
            "https://api.elevenlabs.io/v1/text-to-speech/Z61JuDmU52ECd8UROolE/stream?optimize_streaming_latency=1"
        );
    }

    #[test]
    fn test_custom_api_base_trailing_slash() {
        let synth = ElevenLabsSynthesizer::new("key".into(), "voice".into())
            .with_api_base("http://localhost:9000/");
        assert_eq!(
            synth.endpoint(),
            "http://localhost:9000/v1/text-to-speech/voice/stream?optimize_streaming_latency=1"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_string(&SynthesisRequest { text: "hi" }).unwrap();
        assert_eq!(body, r#"{"text":"hi"}"#);
    }
}
