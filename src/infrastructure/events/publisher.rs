//! Event Publisher Implementation
//!
//! 朗读会话事件推送（broadcast 通道，按会话隔离）

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::application::error::NarrationError;
use crate::domain::{PlaybackState, VoicePair};

const CHANNEL_CAPACITY: usize = 100;

/// 朗读事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PlaybackEvent {
    /// 播放状态变更
    StateChanged {
        session_id: String,
        state: PlaybackState,
    },
    /// 播放进度
    Progress {
        session_id: String,
        index: usize,
        position_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    /// 段落播完，自动前进
    AutoAdvance {
        session_id: String,
        from: usize,
        to: usize,
    },
    /// 最后一段播放结束
    EndOfContent {
        session_id: String,
        last_index: usize,
    },
    /// 操作失败
    Error {
        session_id: String,
        kind: String,
        message: String,
    },
    /// 非致命问题（如引擎不支持保持音调的变速）
    Warning {
        session_id: String,
        message: String,
    },
    /// 音色切换
    VoicesChanged {
        session_id: String,
        narrator: String,
        dialogue: String,
    },
    /// 会话关闭
    SessionClosed {
        session_id: String,
        reason: String,
    },
}

/// 事件发布器
pub struct EventPublisher {
    /// session_id -> broadcast sender
    session_channels: DashMap<String, broadcast::Sender<PlaybackEvent>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            session_channels: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// 注册会话的事件通道
    pub fn register_session(&self, session_id: &str) -> broadcast::Receiver<PlaybackEvent> {
        if let Some(sender) = self.session_channels.get(session_id) {
            return sender.subscribe();
        }

        let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.session_channels.insert(session_id.to_string(), tx);
        rx
    }

    /// 取消注册会话
    pub fn unregister_session(&self, session_id: &str) {
        self.session_channels.remove(session_id);
    }

    /// 获取会话的事件接收器
    pub fn subscribe(&self, session_id: &str) -> Option<broadcast::Receiver<PlaybackEvent>> {
        self.session_channels.get(session_id).map(|s| s.subscribe())
    }

    pub fn publish_state(&self, session_id: &str, state: PlaybackState) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::StateChanged {
                session_id: session_id.to_string(),
                state,
            },
        );
    }

    pub fn publish_progress(
        &self,
        session_id: &str,
        index: usize,
        position_ms: u64,
        duration_ms: Option<u64>,
    ) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::Progress {
                session_id: session_id.to_string(),
                index,
                position_ms,
                duration_ms,
            },
        );
    }

    pub fn publish_auto_advance(&self, session_id: &str, from: usize, to: usize) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::AutoAdvance {
                session_id: session_id.to_string(),
                from,
                to,
            },
        );
    }

    pub fn publish_end_of_content(&self, session_id: &str, last_index: usize) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::EndOfContent {
                session_id: session_id.to_string(),
                last_index,
            },
        );
    }

    /// 发布错误事件
    pub fn publish_error(&self, session_id: &str, error: &NarrationError) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::Error {
                session_id: session_id.to_string(),
                kind: error.kind().to_string(),
                message: error.to_string(),
            },
        );
    }

    pub fn publish_warning(&self, session_id: &str, message: &str) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::Warning {
                session_id: session_id.to_string(),
                message: message.to_string(),
            },
        );
    }

    pub fn publish_voices_changed(&self, session_id: &str, voices: &VoicePair) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::VoicesChanged {
                session_id: session_id.to_string(),
                narrator: voices.narrator.as_str().to_string(),
                dialogue: voices.dialogue.as_str().to_string(),
            },
        );
    }

    /// 发布会话关闭事件
    pub fn publish_session_closed(&self, session_id: &str, reason: &str) {
        self.publish_to_session(
            session_id,
            PlaybackEvent::SessionClosed {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            },
        );
    }

    /// 发布事件到指定会话
    fn publish_to_session(&self, session_id: &str, event: PlaybackEvent) {
        if let Some(sender) = self.session_channels.get(session_id) {
            if let Err(e) = sender.send(event) {
                tracing::debug!(
                    session_id = %session_id,
                    error = %e,
                    "Failed to publish event (no receivers)"
                );
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_routed_per_session() {
        let publisher = EventPublisher::new();
        let mut rx_a = publisher.register_session("a");
        let mut rx_b = publisher.register_session("b");

        publisher.publish_state("a", PlaybackState::Playing(2));
        publisher.publish_end_of_content("b", 9);

        assert_eq!(
            rx_a.recv().await.unwrap(),
            PlaybackEvent::StateChanged {
                session_id: "a".to_string(),
                state: PlaybackState::Playing(2),
            }
        );
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            PlaybackEvent::EndOfContent { last_index: 9, .. }
        ));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_session_is_noop() {
        let publisher = EventPublisher::new();
        publisher.publish_warning("missing", "ignored");
        assert!(publisher.subscribe("missing").is_none());

        let _rx = publisher.register_session("s");
        assert!(publisher.subscribe("s").is_some());
        publisher.unregister_session("s");
        assert!(publisher.subscribe("s").is_none());
    }

    #[test]
    fn test_event_wire_format() {
        let event = PlaybackEvent::AutoAdvance {
            session_id: "s".to_string(),
            from: 1,
            to: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "AutoAdvance");
        assert_eq!(json["data"]["to"], 2);
    }
}
