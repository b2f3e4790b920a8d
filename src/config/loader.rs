//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（narrator.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, TtsProvider};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["narrator", "narrator.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `NARRATOR_`，层级分隔符 `__`）
/// 2. 配置文件（narrator.toml 或 narrator.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `NARRATOR_TTS__URL=http://tts-server:8000`
/// - `NARRATOR_TTS__PROVIDER=fake`
/// - `NARRATOR_CACHE__MAX_CACHE_SIZE=40`
/// - `NARRATOR_ARCHIVE__ENABLED=true`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 首先设置默认值（最低优先级）
    builder = builder
        .set_default("tts.provider", "http")?
        .set_default("tts.url", "http://localhost:8000")?
        .set_default("tts.timeout_secs", 120)?
        .set_default("tts.max_retries", 2)?
        .set_default("cache.char_threshold", 1000)?
        .set_default("cache.base_distance", 8)?
        .set_default("cache.max_cache_size", 20)?
        .set_default("cache.retain_behind", 3)?
        .set_default("playback.min_rate", 0.25)?
        .set_default("playback.max_rate", 4.0)?
        .set_default("playback.status_interval_ms", 250)?
        .set_default("archive.enabled", false)?
        .set_default("archive.dir", "data/archive")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 添加环境变量（最高优先级）
    // 例如: NARRATOR_PLAYBACK__MAX_RATE=3.0
    builder = builder.add_source(
        Environment::with_prefix("NARRATOR")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub(crate) fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.tts.provider == TtsProvider::Http && config.tts.url.is_empty() {
        return Err(ConfigError::ValidationError(
            "TTS URL cannot be empty".to_string(),
        ));
    }

    if config.cache.char_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "cache.char_threshold must be greater than 0".to_string(),
        ));
    }

    if config.cache.base_distance == 0 {
        return Err(ConfigError::ValidationError(
            "cache.base_distance must be greater than 0".to_string(),
        ));
    }

    if config.cache.max_cache_size == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_cache_size must be greater than 0".to_string(),
        ));
    }

    let playback = &config.playback;
    if !(playback.min_rate > 0.0 && playback.min_rate <= playback.max_rate) {
        return Err(ConfigError::ValidationError(format!(
            "Invalid playback rate bounds: [{}, {}]",
            playback.min_rate, playback.max_rate
        )));
    }

    if playback.status_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "playback.status_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.archive.enabled && config.archive.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "archive.max_size_bytes cannot be 0 when archive is enabled".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Narrator Configuration ===");
    tracing::info!("TTS Provider: {:?}", config.tts.provider);
    if config.tts.provider == TtsProvider::Http {
        tracing::info!("TTS URL: {}", config.tts.url);
        tracing::info!("TTS Timeout: {}s", config.tts.timeout_secs);
    }
    tracing::info!("Voices: {}", config.tts.voices());
    tracing::info!(
        "Prefetch: {} chars, {} paragraphs",
        config.cache.char_threshold,
        config.cache.base_distance
    );
    tracing::info!("Max Cache Size: {}", config.cache.max_cache_size);
    tracing::info!("Scratch Directory: {:?}", config.cache.scratch_dir);
    tracing::info!(
        "Rate Bounds: [{}, {}]",
        config.playback.min_rate,
        config.playback.max_rate
    );
    tracing::info!("Archive Enabled: {}", config.archive.enabled);
    if config.archive.enabled {
        tracing::info!("Archive Directory: {:?}", config.archive.dir);
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("==============================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.tts.provider, TtsProvider::Http);
        assert_eq!(config.cache.char_threshold, 1000);
        assert_eq!(config.cache.max_cache_size, 20);
        assert_eq!(config.playback.max_rate, 4.0);
        assert!(!config.archive.enabled);
    }

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_tts_url() {
        let mut config = AppConfig::default();
        config.tts.url = String::new();
        assert!(validate_config(&config).is_err());

        // 离线模式不需要 URL
        config.tts.provider = TtsProvider::Fake;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_window() {
        let mut config = AppConfig::default();
        config.cache.base_distance = 0;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.cache.char_threshold = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_inverted_rates() {
        let mut config = AppConfig::default();
        config.playback.min_rate = 3.0;
        config.playback.max_rate = 2.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("narrator.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[tts]
provider = "fake"
narrator_voice = "alice"

[cache]
max_cache_size = 40

[playback]
advance_delay_ms = 200.0
"#
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.tts.provider, TtsProvider::Fake);
        assert_eq!(config.tts.narrator_voice, "alice");
        assert_eq!(config.tts.dialogue_voice, "dialogue");
        assert_eq!(config.cache.max_cache_size, 40);

        let coordinator = config.playback.coordinator_config(config.cache.max_rate_factor);
        assert_eq!(coordinator.completion.advance_delay_ms, 200.0);
        assert_eq!(coordinator.completion.base_threshold_ms, 30.0);
    }
}
