//! Sled 存储实现

mod audio_archive;

pub use audio_archive::{SledArchiveConfig, SledAudioArchive};
