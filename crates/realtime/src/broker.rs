use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

/// A freshly minted transcription session, exactly as the service returned
/// it. The gateway hands the whole document to browser-held sessions; the
/// server-side client only needs the ephemeral secret out of it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionCredential {
    #[serde(flatten)]
    pub raw: serde_json::Value,
}

impl SessionCredential {
    /// The ephemeral client secret, when present.
    pub fn client_secret(&self) -> Option<&str> {
        self.raw
            .get("client_secret")
            .and_then(|s| s.get("value"))
            .and_then(|v| v.as_str())
    }
}

/// Mints short-lived transcription-session credentials against the speech
/// service's REST API. The long-lived API key never leaves this type.
pub struct CredentialBroker {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl CredentialBroker {
    pub fn new(api_key: SecretString) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com")
    }

    pub fn with_base_url(api_key: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Requests one ephemeral credential. Server VAD with short silence
    /// windows keeps command turnaround snappy for spoken robot commands.
    pub async fn mint(&self) -> Result<SessionCredential> {
        let url = format!("{}/v1/realtime/transcription_sessions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "input_audio_format": "pcm16",
                "input_audio_transcription": {
                    "model": "gpt-4o-transcribe",
                    "prompt": "",
                    "language": "en"
                },
                "turn_detection": {
                    "type": "server_vad",
                    "threshold": 0.5,
                    "prefix_padding_ms": 300,
                    "silence_duration_ms": 200
                },
                "input_audio_noise_reduction": {
                    "type": "far_field"
                }
            }))
            .send()
            .await
            .context("transcription session request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("transcription session request returned {status}: {body}");
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .context("transcription session response was not JSON")?;
        tracing::info!("minted a realtime transcription session");
        Ok(SessionCredential { raw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_secret_is_read_from_the_nested_field() {
        let credential = SessionCredential {
            raw: json!({
                "id": "sess_123",
                "client_secret": {"value": "ek_abc", "expires_at": 0}
            }),
        };
        assert_eq!(credential.client_secret(), Some("ek_abc"));
    }

    #[test]
    fn missing_secret_is_none_not_a_panic() {
        let credential = SessionCredential {
            raw: json!({"id": "sess_123"}),
        };
        assert_eq!(credential.client_secret(), None);
    }
}
