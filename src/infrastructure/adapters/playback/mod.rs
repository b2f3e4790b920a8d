//! Playback Adapter - 播放引擎实现

mod headless_engine;

pub use headless_engine::{HeadlessEngine, HeadlessEngineConfig};
