//! Audio - WAV 探测与生成

mod wav;

pub use wav::{probe, silence, AudioError, AudioInfo};
