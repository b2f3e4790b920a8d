//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_archive;
mod audio_storage;
mod playback_engine;
mod speech_synthesizer;

pub use audio_archive::{
    text_hash, ArchiveEntry, ArchiveError, ArchiveMetadata, ArchiveStats, AudioArchivePort,
};
pub use audio_storage::{AudioStorageError, AudioStoragePort, StorageStats};
pub use playback_engine::{
    EngineError, LoadedSound, PlaybackEnginePort, PlaybackStatus, SoundPort,
};
pub use speech_synthesizer::{
    SpeechSynthesizerPort, SynthesisRequest, SynthesisResponse, TtsError,
};
