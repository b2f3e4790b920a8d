//! Narration Context - Entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::VoicePair;

/// 段落音频记录生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Empty,
    Pending,
    Ready,
    Failed,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Empty => "empty",
            RecordState::Pending => "pending",
            RecordState::Ready => "ready",
            RecordState::Failed => "failed",
        }
    }
}

/// 音频句柄（缓存持有的音频文件路径）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioHandle(PathBuf);

impl AudioHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// 空路径视为无效句柄
    pub fn is_usable(&self) -> bool {
        !self.0.as_os_str().is_empty()
    }
}

impl std::fmt::Display for AudioHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// 段落音频记录
///
/// 不变量:
/// - state == Ready 时 audio_handle 必须存在
/// - character_count == source_text 的字符数
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphAudioRecord {
    pub index: usize,
    pub source_text: String,
    pub state: RecordState,
    pub audio_handle: Option<AudioHandle>,
    pub duration_hint: Option<Duration>,
    pub character_count: usize,
    pub created_at: DateTime<Utc>,
    pub is_durable: bool,
    /// 合成时使用的音色组合
    pub voices: VoicePair,
    pub error_message: Option<String>,
}

impl ParagraphAudioRecord {
    pub fn pending(index: usize, source_text: impl Into<String>, voices: VoicePair) -> Self {
        let source_text = source_text.into();
        Self {
            index,
            character_count: source_text.chars().count(),
            source_text,
            state: RecordState::Pending,
            audio_handle: None,
            duration_hint: None,
            created_at: Utc::now(),
            is_durable: false,
            voices,
            error_message: None,
        }
    }

    pub fn ready(
        index: usize,
        source_text: impl Into<String>,
        voices: VoicePair,
        handle: AudioHandle,
        duration_hint: Option<Duration>,
    ) -> Self {
        let mut record = Self::pending(index, source_text, voices);
        record.state = RecordState::Ready;
        record.audio_handle = Some(handle);
        record.duration_hint = duration_hint;
        record
    }

    pub fn durable(
        index: usize,
        source_text: impl Into<String>,
        voices: VoicePair,
        handle: AudioHandle,
        duration_hint: Option<Duration>,
    ) -> Self {
        let mut record = Self::ready(index, source_text, voices, handle, duration_hint);
        record.is_durable = true;
        record
    }

    pub fn failed(
        index: usize,
        source_text: impl Into<String>,
        voices: VoicePair,
        error: impl Into<String>,
    ) -> Self {
        let mut record = Self::pending(index, source_text, voices);
        record.state = RecordState::Failed;
        record.error_message = Some(error.into());
        record
    }

    /// Ready 且句柄可用
    pub fn is_ready(&self) -> bool {
        self.state == RecordState::Ready
            && self.audio_handle.as_ref().is_some_and(AudioHandle::is_usable)
    }

    /// Ready 但句柄缺失属于内部不一致
    pub fn is_consistent(&self) -> bool {
        match self.state {
            RecordState::Ready => self.audio_handle.as_ref().is_some_and(AudioHandle::is_usable),
            RecordState::Empty | RecordState::Pending | RecordState::Failed => true,
        }
    }

    /// 是否可用于指定文本和音色
    pub fn matches(&self, text: &str, voices: &VoicePair) -> bool {
        self.source_text == text && &self.voices == voices
    }
}
