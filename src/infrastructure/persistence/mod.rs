//! Persistence Layer - 数据持久化
//!
//! Sled 音频归档

pub mod sled;

pub use self::sled::{SledArchiveConfig, SledAudioArchive};
