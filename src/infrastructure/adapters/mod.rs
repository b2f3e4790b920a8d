//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod audio;
pub mod playback;
pub mod storage;
pub mod tts;

pub use playback::*;
pub use storage::*;
pub use tts::*;
