//! Text-to-speech synthesis, abstracted the same way `FaqRetriever`
//! abstracts the semantic retrieval service: a trait the pipeline calls
//! through, with a disabled-by-default implementation so `audio` is
//! always `null` until an endpoint is configured.

use async_trait::async_trait;
use base64::Engine;

use sa_domain::config::TtsConfig;
use sa_domain::error::{Error, Result};
use sa_providers::auth::AuthRotator;

#[async_trait]
pub trait TtsSynthesizer: Send + Sync {
    /// Synthesize `text` to a `data:audio/mpeg;base64,...` URL. Returns
    /// `Ok(None)` when synthesis is disabled or unavailable — never an
    /// error for "just not configured".
    async fn synthesize(&self, text: &str) -> Result<Option<String>>;
}

/// Default synthesizer: always returns `None`. Used whenever
/// `TtsConfig.enabled` is `false`.
pub struct NullTtsSynthesizer;

#[async_trait]
impl TtsSynthesizer for NullTtsSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Calls an OpenAI-compatible `/audio/speech` endpoint and base64-encodes
/// the returned MPEG bytes into a data URL.
pub struct HttpTtsSynthesizer {
    base_url: String,
    auth: AuthRotator,
    client: reqwest::Client,
}

impl HttpTtsSynthesizer {
    pub fn from_config(cfg: &TtsConfig) -> Result<Option<Self>> {
        if !cfg.enabled {
            return Ok(None);
        }
        let base_url = cfg
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("tts.base_url required when tts.enabled".into()))?;
        let auth = AuthRotator::from_auth_config(&cfg.auth)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("building tts http client: {e}")))?;
        Ok(Some(Self { base_url, auth, client }))
    }
}

#[async_trait]
impl TtsSynthesizer for HttpTtsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Option<String>> {
        let key = self.auth.next_key();
        let result = self
            .client
            .post(format!("{}/audio/speech", self.base_url.trim_end_matches('/')))
            .bearer_auth(&key.key)
            .json(&serde_json::json!({ "input": text, "format": "mp3" }))
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(_) => {
                self.auth.mark_failed(key.index);
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            self.auth.mark_failed(key.index);
            return Ok(None);
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(Some(format!("data:audio/mpeg;base64,{encoded}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_synthesizer_always_returns_none() {
        let tts = NullTtsSynthesizer;
        assert_eq!(tts.synthesize("hola").await.unwrap(), None);
    }

    #[test]
    fn http_synthesizer_requires_base_url_when_enabled() {
        let cfg = TtsConfig {
            enabled: true,
            base_url: None,
            auth: Default::default(),
        };
        assert!(HttpTtsSynthesizer::from_config(&cfg).is_err());
    }

    #[test]
    fn http_synthesizer_disabled_returns_none_without_error() {
        let cfg = TtsConfig {
            enabled: false,
            base_url: None,
            auth: Default::default(),
        };
        assert!(HttpTtsSynthesizer::from_config(&cfg).unwrap().is_none());
    }
}
