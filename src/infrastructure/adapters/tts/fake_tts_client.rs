//! Fake TTS Client - 离线 TTS 客户端
//!
//! 不调用 TTS 服务，按文本长度生成静音 WAV，用于本地演示和集成测试

use async_trait::async_trait;
use std::time::Duration;

use crate::application::ports::{
    SpeechSynthesizerPort, SynthesisRequest, SynthesisResponse, TtsError,
};
use crate::infrastructure::adapters::audio;

/// Fake TTS Client 配置
#[derive(Debug, Clone)]
pub struct FakeTtsClientConfig {
    /// 每个字符对应的音频时长（毫秒）
    pub ms_per_char: u64,
    /// 最短音频时长（毫秒）
    pub min_duration_ms: u64,
    pub sample_rate: u32,
    /// 模拟合成延迟
    pub latency: Duration,
}

impl Default for FakeTtsClientConfig {
    fn default() -> Self {
        Self {
            ms_per_char: 60,
            min_duration_ms: 300,
            sample_rate: 16_000,
            latency: Duration::from_millis(200),
        }
    }
}

/// Fake TTS Client
pub struct FakeTtsClient {
    config: FakeTtsClientConfig,
}

impl FakeTtsClient {
    pub fn new(config: FakeTtsClientConfig) -> Self {
        tracing::info!(
            ms_per_char = config.ms_per_char,
            latency_ms = config.latency.as_millis() as u64,
            "FakeTtsClient initialized"
        );
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FakeTtsClientConfig::default())
    }

    fn duration_for(&self, text: &str) -> u64 {
        (text.chars().count() as u64 * self.config.ms_per_char).max(self.config.min_duration_ms)
    }
}

#[async_trait]
impl SpeechSynthesizerPort for FakeTtsClient {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError> {
        if request.text.trim().is_empty() {
            return Err(TtsError::InvalidResponse("empty text".to_string()));
        }

        let duration_ms = self.duration_for(&request.text);
        tracing::debug!(
            text_len = request.text.chars().count(),
            voices = %request.voices,
            duration_ms = duration_ms,
            "FakeTtsClient: generating silent audio"
        );

        // 模拟推理延迟
        tokio::time::sleep(self.config.latency).await;

        Ok(SynthesisResponse {
            audio_data: audio::silence(duration_ms, self.config.sample_rate),
            duration_ms: Some(duration_ms),
            sample_rate: Some(self.config.sample_rate),
        })
    }
}
