//! Narrator - 段落朗读缓存与播放协调
//!
//! 架构设计: DDD + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Narration Context: 段落音频记录、音色组合、播放速率与播放状态
//! - 段落切分
//!
//! 应用层 (application/):
//! - Ports: 端口定义（SpeechSynthesizer, AudioStorage, AudioArchive, PlaybackEngine）
//! - Narration: 合成缓存（single-flight、预取、淘汰）与播放协调器
//!
//! 基础设施层 (infrastructure/):
//! - Adapters: HTTP/Fake TTS Client, 文件存储, Headless 播放引擎, WAV 工具
//! - Persistence: Sled 音频归档
//! - Events: 会话事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
