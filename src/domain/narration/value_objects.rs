//! Narration Context - Value Objects

use serde::{Deserialize, Serialize};

/// 内容唯一标识（章节 ID 等上游内容单元）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Result<Self, &'static str> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("内容 ID 不能为空");
        }
        Ok(Self(id))
    }

    /// 由正文生成稳定 ID（用于没有上游 ID 的本地文本）
    pub fn from_text(text: &str) -> Self {
        Self(format!("{:x}", md5::compute(text.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 音色标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceId(String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 旁白 + 对白音色组合
///
/// 合成结果与音色组合绑定，组合变化后旧音频不可再播放
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoicePair {
    pub narrator: VoiceId,
    pub dialogue: VoiceId,
}

impl VoicePair {
    pub fn new(narrator: impl Into<String>, dialogue: impl Into<String>) -> Self {
        Self {
            narrator: VoiceId::new(narrator),
            dialogue: VoiceId::new(dialogue),
        }
    }
}

impl std::fmt::Display for VoicePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}+{}", self.narrator, self.dialogue)
    }
}

/// 播放速率（保持音调）
///
/// 不变量: 值始终在 [MIN, MAX] 内
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PlaybackRate(f32);

impl PlaybackRate {
    pub const MIN: f32 = 0.25;
    pub const MAX: f32 = 4.0;

    /// 按默认边界截断
    pub fn clamped(rate: f32) -> Self {
        Self::clamped_within(rate, Self::MIN, Self::MAX)
    }

    /// 按给定边界截断，NaN 视为 1.0
    pub fn clamped_within(rate: f32, min: f32, max: f32) -> Self {
        if rate.is_nan() {
            return Self(1.0_f32.clamp(min, max));
        }
        Self(rate.clamp(min, max))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self(1.0)
    }
}

impl std::fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}x", self.0)
    }
}
