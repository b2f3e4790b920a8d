//! 应用层错误定义
//!
//! 统一的朗读操作错误类型

use thiserror::Error;

use super::narration::CacheError;

/// 应用层错误
#[derive(Debug, Clone, Error)]
pub enum NarrationError {
    /// 合成服务返回错误或空/损坏的音频流
    #[error("Synthesis failed for paragraph {index}: {message}")]
    SynthesisFailure { index: usize, message: String },

    /// 播放引擎无法打开音频流
    #[error("Load failed for paragraph {index}: {message}")]
    LoadFailure { index: usize, message: String },

    /// 音频由已被替换的音色合成
    #[error("Stale voice for paragraph {index}")]
    StaleVoiceMismatch { index: usize },

    /// 已有操作进行中
    #[error("Another playback operation is in flight")]
    ConcurrentOperationRejected,

    /// 段落索引越界
    #[error("Paragraph index {index} out of range (total: {total})")]
    IndexOutOfRange { index: usize, total: usize },

    /// 本地存储错误
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl NarrationError {
    pub fn synthesis(index: usize, message: impl Into<String>) -> Self {
        Self::SynthesisFailure {
            index,
            message: message.into(),
        }
    }

    pub fn load(index: usize, message: impl Into<String>) -> Self {
        Self::LoadFailure {
            index,
            message: message.into(),
        }
    }

    /// 事件中使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SynthesisFailure { .. } => "synthesis_failure",
            Self::LoadFailure { .. } => "load_failure",
            Self::StaleVoiceMismatch { .. } => "stale_voice_mismatch",
            Self::ConcurrentOperationRejected => "concurrent_operation_rejected",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::StorageError(_) => "storage_error",
        }
    }
}

impl From<CacheError> for NarrationError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::SynthesisFailure { index, message } => {
                Self::SynthesisFailure { index, message }
            }
            CacheError::StaleVoiceMismatch { index } => Self::StaleVoiceMismatch { index },
            CacheError::StorageError(message) => Self::StorageError(message),
            CacheError::TaskFailed { index, message } => Self::SynthesisFailure { index, message },
            CacheError::Superseded { index } => Self::SynthesisFailure {
                index,
                message: "superseded".to_string(),
            },
        }
    }
}
