//! Playback Engine Port - 播放引擎抽象
//!
//! 引擎负责加载音频流、播放/暂停、保持音调的变速，并异步上报播放进度

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::AudioHandle;

/// 播放引擎错误
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Load failed: {0}")]
    LoadFailed(String),

    #[error("Sound not loaded")]
    NotLoaded,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Engine error: {0}")]
    Backend(String),
}

/// 播放进度上报（稳定间隔，至少 1Hz）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: Option<u64>,
    pub did_just_finish: bool,
}

/// 已加载的音频
pub struct LoadedSound {
    pub sound: Box<dyn SoundPort>,
    /// 进度上报通道，音频卸载后关闭
    pub status: mpsc::Receiver<PlaybackStatus>,
    pub duration_ms: Option<u64>,
}

/// 单个已加载音频的控制接口
#[async_trait]
pub trait SoundPort: Send + Sync {
    async fn play(&self) -> Result<(), EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn set_rate(&self, rate: f32, preserve_pitch: bool) -> Result<(), EngineError>;

    /// 释放音频资源，可重复调用
    async fn unload(&self) -> Result<(), EngineError>;
}

/// Playback Engine Port
#[async_trait]
pub trait PlaybackEnginePort: Send + Sync {
    async fn load(&self, handle: &AudioHandle) -> Result<LoadedSound, EngineError>;
}
