//! Narration Context - 播放状态

use serde::{Deserialize, Serialize};

use super::{ContentId, PlaybackRate};

/// 播放状态机
///
/// NoSession → Loading → Playing ⇄ Paused → Completed → Loading(下一段)
/// Loading 失败回到 Idle(index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum PlaybackState {
    /// 尚未开始或已拆除
    NoSession,
    /// 没有加载任何音频，保留最后操作的段落
    Idle(usize),
    Loading(usize),
    Playing(usize),
    Paused(usize),
    Completed(usize),
}

impl PlaybackState {
    pub fn index(&self) -> Option<usize> {
        match *self {
            PlaybackState::NoSession => None,
            PlaybackState::Idle(i)
            | PlaybackState::Loading(i)
            | PlaybackState::Playing(i)
            | PlaybackState::Paused(i)
            | PlaybackState::Completed(i) => Some(i),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::NoSession => "no_session",
            PlaybackState::Idle(_) => "idle",
            PlaybackState::Loading(_) => "loading",
            PlaybackState::Playing(_) => "playing",
            PlaybackState::Paused(_) => "paused",
            PlaybackState::Completed(_) => "completed",
        }
    }
}

/// 播放会话（每个内容单元一个）
///
/// 由 PlaybackCoordinator 独占持有
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: String,
    pub content_id: ContentId,
    pub state: PlaybackState,
    pub rate: PlaybackRate,
    /// 段落切换期间抑制暂停指示
    pub is_transitioning: bool,
}

impl PlaybackSession {
    pub fn new(content_id: ContentId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id,
            state: PlaybackState::NoSession,
            rate: PlaybackRate::default(),
            is_transitioning: false,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.index()
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }
}
