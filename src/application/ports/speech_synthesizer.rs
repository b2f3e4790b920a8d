//! Speech Synthesizer Port - 语音合成抽象
//!
//! 定义段落合成的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::VoicePair;

/// TTS 错误
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),
}

/// 合成请求
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// 要合成的段落文本
    pub text: String,
    /// 旁白 + 对白音色
    pub voices: VoicePair,
}

/// 合成响应
#[derive(Debug, Clone)]
pub struct SynthesisResponse {
    /// 原始音频数据（WAV）
    pub audio_data: Vec<u8>,
    /// 音频时长（毫秒）
    pub duration_ms: Option<u64>,
    /// 采样率
    pub sample_rate: Option<u32>,
}

/// Speech Synthesizer Port
///
/// 相同输入必须幂等（可安全重试）。超时由实现方负责，缓存层不设超时
#[async_trait]
pub trait SpeechSynthesizerPort: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError>;

    /// 检查合成服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
