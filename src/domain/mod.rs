//! 领域层
//!
//! - narration/: 朗读上下文（段落音频记录、音色、播放状态）
//! - text_segmenter: 段落切分

pub mod narration;
pub mod text_segmenter;

pub use narration::{
    AudioHandle, ContentId, ParagraphAudioRecord, PlaybackRate, PlaybackSession, PlaybackState,
    RecordState, VoiceId, VoicePair,
};
pub use text_segmenter::split_paragraphs;
