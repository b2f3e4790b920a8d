//! HTTP TTS Client - 调用外部 TTS HTTP 服务
//!
//! 实现 SpeechSynthesizerPort trait，通过 HTTP 调用外部 TTS 服务
//!
//! 外部 TTS API:
//! POST http://localhost:8000/api/tts/synthesize
//! Request: {"text": "...", "narrator_voice": "...", "dialogue_voice": "..."}  (JSON)
//! Response: audio/wav binary, metadata in headers

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::application::ports::{
    SpeechSynthesizerPort, SynthesisRequest, SynthesisResponse, TtsError,
};

/// TTS 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct TtsHttpRequest<'a> {
    text: &'a str,
    narrator_voice: &'a str,
    dialogue_voice: &'a str,
}

/// HTTP TTS 客户端配置
#[derive(Debug, Clone)]
pub struct HttpTtsClientConfig {
    /// TTS 服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 重试次数（仅网络错误、超时和 5xx）
    pub max_retries: u32,
    /// 重试基础延迟，按 2 的幂递增
    pub retry_base_delay_ms: u64,
}

impl Default for HttpTtsClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

impl HttpTtsClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// HTTP TTS 客户端
pub struct HttpTtsClient {
    client: Client,
    config: HttpTtsClientConfig,
}

impl HttpTtsClient {
    pub fn new(config: HttpTtsClientConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TtsError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn synthesize_url(&self) -> String {
        format!("{}/api/tts/synthesize", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.retry_base_delay_ms * 2u64.pow(attempt.saturating_sub(1)))
    }

    async fn send_once(&self, request: &SynthesisRequest) -> Result<SynthesisResponse, TtsError> {
        let body = TtsHttpRequest {
            text: &request.text,
            narrator_voice: request.voices.narrator.as_str(),
            dialogue_voice: request.voices.dialogue.as_str(),
        };

        let response = self
            .client
            .post(self.synthesize_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TtsError::Timeout
                } else if e.is_connect() {
                    TtsError::NetworkError(format!("Cannot connect to TTS service: {}", e))
                } else {
                    TtsError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TtsError::VoiceNotFound(format!(
                "{}+{}",
                request.voices.narrator, request.voices.dialogue
            )));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(TtsError::ServiceError(format!("HTTP {}: {}", status, error_text)));
        }

        // 从 headers 提取元数据
        let headers = response.headers();
        let duration_ms = headers
            .get("X-TTS-Duration-Ms")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let sample_rate = headers
            .get("X-TTS-Sample-Rate")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        let audio_data = response
            .bytes()
            .await
            .map_err(|e| TtsError::InvalidResponse(format!("Failed to read audio: {}", e)))?
            .to_vec();

        Ok(SynthesisResponse {
            audio_data,
            duration_ms,
            sample_rate,
        })
    }
}

/// 网络错误、超时和 5xx 可以重试
fn is_retryable(error: &TtsError) -> bool {
    match error {
        TtsError::NetworkError(_) | TtsError::Timeout => true,
        TtsError::ServiceError(message) => message.starts_with("HTTP 5"),
        TtsError::InvalidResponse(_) | TtsError::VoiceNotFound(_) => false,
    }
}

#[async_trait]
impl SpeechSynthesizerPort for HttpTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError> {
        tracing::debug!(
            url = %self.synthesize_url(),
            text_len = request.text.chars().count(),
            voices = %request.voices,
            "Sending TTS synthesize request"
        );

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay(attempt)).await;
            }

            match self.send_once(&request).await {
                Ok(response) => {
                    tracing::info!(
                        duration_ms = ?response.duration_ms,
                        sample_rate = ?response.sample_rate,
                        audio_size = response.audio_data.len(),
                        attempt = attempt,
                        "TTS synthesis completed"
                    );
                    return Ok(response);
                }
                Err(e) if is_retryable(&e) && attempt < self.config.max_retries => {
                    tracing::warn!(attempt = attempt, error = %e, "TTS request failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
