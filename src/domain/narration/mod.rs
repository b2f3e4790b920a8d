//! Narration Context
//!
//! 朗读会话内的核心概念：段落音频记录、音色组合、播放速率与播放状态

mod entities;
mod state;
mod value_objects;

pub use entities::{AudioHandle, ParagraphAudioRecord, RecordState};
pub use state::{PlaybackSession, PlaybackState};
pub use value_objects::{ContentId, PlaybackRate, VoiceId, VoicePair};
