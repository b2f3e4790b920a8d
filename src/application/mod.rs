//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（SpeechSynthesizer、AudioStorage、AudioArchive、PlaybackEngine）
//! - narration: 合成缓存与播放协调
//! - error: 应用层错误定义

pub mod error;
pub mod narration;
pub mod ports;

pub use error::NarrationError;

pub use narration::{
    CacheError, CacheStats, CompletionPolicy, CoordinatorConfig, PlaybackCoordinator,
    PrefetchPolicy, SynthesisCache, SynthesisCacheConfig,
};

pub use ports::{
    // Archive
    text_hash,
    ArchiveEntry,
    ArchiveError,
    ArchiveMetadata,
    ArchiveStats,
    AudioArchivePort,
    // Storage
    AudioStorageError,
    AudioStoragePort,
    StorageStats,
    // Playback engine
    EngineError,
    LoadedSound,
    PlaybackEnginePort,
    PlaybackStatus,
    SoundPort,
    // Speech synthesizer
    SpeechSynthesizerPort,
    SynthesisRequest,
    SynthesisResponse,
    TtsError,
};
