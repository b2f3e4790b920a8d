//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::{
    CompletionPolicy, CoordinatorConfig, PrefetchPolicy, SynthesisCacheConfig,
};
use crate::domain::VoicePair;
use crate::infrastructure::adapters::{
    FakeTtsClientConfig, HeadlessEngineConfig, HttpTtsClientConfig,
};
use crate::infrastructure::persistence::SledArchiveConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// TTS 配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 合成缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 播放配置
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// 持久归档配置
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// TTS 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    Http,
    /// 离线静音生成
    Fake,
}

/// TTS 配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub provider: TtsProvider,

    /// TTS 服务基础 URL
    #[serde(default = "default_tts_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    /// 最大重试次数
    #[serde(default = "default_tts_retries")]
    pub max_retries: u32,

    /// 旁白音色
    #[serde(default = "default_narrator_voice")]
    pub narrator_voice: String,

    /// 对白音色
    #[serde(default = "default_dialogue_voice")]
    pub dialogue_voice: String,
}

fn default_tts_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_tts_timeout() -> u64 {
    120
}

fn default_tts_retries() -> u32 {
    2
}

fn default_narrator_voice() -> String {
    "narrator".to_string()
}

fn default_dialogue_voice() -> String {
    "dialogue".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: TtsProvider::default(),
            url: default_tts_url(),
            timeout_secs: default_tts_timeout(),
            max_retries: default_tts_retries(),
            narrator_voice: default_narrator_voice(),
            dialogue_voice: default_dialogue_voice(),
        }
    }
}

impl TtsConfig {
    pub fn voices(&self) -> VoicePair {
        VoicePair::new(self.narrator_voice.clone(), self.dialogue_voice.clone())
    }

    pub fn http_client_config(&self) -> HttpTtsClientConfig {
        HttpTtsClientConfig::new(self.url.clone())
            .with_timeout(self.timeout_secs)
            .with_retries(self.max_retries)
    }

    pub fn fake_client_config(&self) -> FakeTtsClientConfig {
        FakeTtsClientConfig::default()
    }
}

/// 合成缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 预取窗口累计字符上限
    #[serde(default = "default_char_threshold")]
    pub char_threshold: usize,

    /// 1.0 倍速下的最大预取段数
    #[serde(default = "default_base_distance")]
    pub base_distance: usize,

    /// 速率放大上限
    #[serde(default = "default_max_rate_factor")]
    pub max_rate_factor: f32,

    /// 记录数超过该值时触发淘汰
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,

    /// 淘汰时当前段之前保留的段数
    #[serde(default = "default_retain_behind")]
    pub retain_behind: usize,

    /// 会话临时音频目录
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

fn default_char_threshold() -> usize {
    1000
}

fn default_base_distance() -> usize {
    8
}

fn default_max_rate_factor() -> f32 {
    2.5
}

fn default_max_cache_size() -> usize {
    20
}

fn default_retain_behind() -> usize {
    3
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("narrator")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            char_threshold: default_char_threshold(),
            base_distance: default_base_distance(),
            max_rate_factor: default_max_rate_factor(),
            max_cache_size: default_max_cache_size(),
            retain_behind: default_retain_behind(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

impl CacheConfig {
    pub fn synthesis_cache_config(&self) -> SynthesisCacheConfig {
        SynthesisCacheConfig {
            policy: PrefetchPolicy {
                char_threshold: self.char_threshold,
                base_distance: self.base_distance,
                max_rate_factor: self.max_rate_factor,
                retain_behind: self.retain_behind,
            },
            max_cache_size: self.max_cache_size,
        }
    }
}

/// 播放配置
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_min_rate")]
    pub min_rate: f32,

    #[serde(default = "default_max_rate")]
    pub max_rate: f32,

    /// 初始播放速率
    #[serde(default = "default_initial_rate")]
    pub initial_rate: f32,

    /// 1.0 倍速下的尾部容差（毫秒）
    #[serde(default = "default_completion_base_ms")]
    pub completion_base_ms: f64,

    /// 每增加 1 倍速增加的容差（毫秒）
    #[serde(default = "default_completion_rate_ms")]
    pub completion_rate_ms: f64,

    /// 下一段未就绪时的等待时间（毫秒）
    #[serde(default = "default_advance_delay_ms")]
    pub advance_delay_ms: f64,

    /// 每增加 1 倍速减少的等待时间（毫秒）
    #[serde(default = "default_advance_delay_rate_ms")]
    pub advance_delay_rate_ms: f64,

    /// Headless 引擎进度上报间隔（毫秒）
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_min_rate() -> f32 {
    0.25
}

fn default_max_rate() -> f32 {
    4.0
}

fn default_initial_rate() -> f32 {
    1.0
}

fn default_completion_base_ms() -> f64 {
    30.0
}

fn default_completion_rate_ms() -> f64 {
    50.0
}

fn default_advance_delay_ms() -> f64 {
    150.0
}

fn default_advance_delay_rate_ms() -> f64 {
    100.0
}

fn default_status_interval_ms() -> u64 {
    250
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            initial_rate: default_initial_rate(),
            completion_base_ms: default_completion_base_ms(),
            completion_rate_ms: default_completion_rate_ms(),
            advance_delay_ms: default_advance_delay_ms(),
            advance_delay_rate_ms: default_advance_delay_rate_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl PlaybackConfig {
    /// 协调器配置，速率放大上限与预取共用
    pub fn coordinator_config(&self, max_rate_factor: f32) -> CoordinatorConfig {
        CoordinatorConfig {
            min_rate: self.min_rate,
            max_rate: self.max_rate,
            completion: CompletionPolicy {
                base_threshold_ms: self.completion_base_ms,
                rate_threshold_ms: self.completion_rate_ms,
                advance_delay_ms: self.advance_delay_ms,
                advance_delay_rate_ms: self.advance_delay_rate_ms,
                max_rate_factor,
            },
        }
    }

    pub fn engine_config(&self) -> HeadlessEngineConfig {
        HeadlessEngineConfig {
            status_interval: Duration::from_millis(self.status_interval_ms),
        }
    }
}

/// 持久归档配置
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub enabled: bool,

    /// 归档目录
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,

    /// 最大归档大小（字节）
    #[serde(default = "default_archive_max_size")]
    pub max_size_bytes: u64,
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("data/archive")
}

fn default_archive_max_size() -> u64 {
    2 * 1024 * 1024 * 1024 // 2GB
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_archive_dir(),
            max_size_bytes: default_archive_max_size(),
        }
    }
}

impl ArchiveConfig {
    pub fn sled_config(&self) -> SledArchiveConfig {
        SledArchiveConfig {
            dir: self.dir.clone(),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否使用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
