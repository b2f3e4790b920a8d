//! Narrator - 段落朗读播放器
//!
//! 用法: narrator <text-file> [config-file]
//!
//! 将正文切分为段落，经合成缓存预取后由 headless 引擎逐段播放，
//! 会话事件以 JSON 形式输出到日志

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use narrator::application::{
    AudioArchivePort, AudioStoragePort, PlaybackCoordinator, SpeechSynthesizerPort,
    SynthesisCache,
};
use narrator::config::{load_config, load_config_from_path, print_config, AppConfig, TtsProvider};
use narrator::domain::{split_paragraphs, ContentId};
use narrator::infrastructure::adapters::{
    FakeTtsClient, FileAudioStorage, HeadlessEngine, HttpTtsClient,
};
use narrator::infrastructure::events::{EventPublisher, PlaybackEvent};
use narrator::infrastructure::persistence::SledAudioArchive;
use tokio::sync::broadcast::error::RecvError;

fn init_logging(config: &AppConfig) {
    let log_filter = format!("{},narrator={}", config.log.level, config.log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let text_path = PathBuf::from(
        args.next()
            .context("usage: narrator <text-file> [config-file]")?,
    );
    let config_path = args.next().map(PathBuf::from);

    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = match &config_path {
        Some(path) => load_config_from_path(Some(path)),
        None => load_config(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_logging(&config);
    print_config(&config);

    let text = tokio::fs::read_to_string(&text_path)
        .await
        .with_context(|| format!("Failed to read {}", text_path.display()))?;
    let paragraphs = split_paragraphs(&text);
    if paragraphs.is_empty() {
        anyhow::bail!("{} contains no paragraphs", text_path.display());
    }
    let content_id = ContentId::from_text(&text);
    tracing::info!(
        content_id = %content_id,
        paragraphs = paragraphs.len(),
        "Text loaded"
    );

    // 合成服务
    let synthesizer: Arc<dyn SpeechSynthesizerPort> = match config.tts.provider {
        TtsProvider::Http => Arc::new(HttpTtsClient::new(config.tts.http_client_config())?),
        TtsProvider::Fake => Arc::new(FakeTtsClient::new(config.tts.fake_client_config())),
    };

    // 会话临时文件
    let storage: Arc<dyn AudioStoragePort> =
        Arc::new(FileAudioStorage::new(&config.cache.scratch_dir).await?);

    // 持久归档
    let sled_archive = if config.archive.enabled {
        Some(SledAudioArchive::new(&config.archive.sled_config())?.arc())
    } else {
        None
    };
    let archive = sled_archive
        .clone()
        .map(|a| a as Arc<dyn AudioArchivePort>);

    let cache = SynthesisCache::new(
        content_id.clone(),
        config.tts.voices(),
        config.cache.synthesis_cache_config(),
        synthesizer,
        storage,
        archive.clone(),
    );

    // 预先装入已归档的段落
    if let Some(archive) = &archive {
        let indices = archive.list(&content_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to list archived paragraphs");
            Vec::new()
        });
        let mut seeded = 0usize;
        for index in indices {
            if let Some(paragraph) = paragraphs.get(index) {
                if cache.seed_from_archive(index, paragraph).await {
                    seeded += 1;
                }
            }
        }
        tracing::info!(seeded = seeded, "Archived paragraphs restored");
    }

    let engine = Arc::new(HeadlessEngine::new(config.playback.engine_config()));
    let events = Arc::new(EventPublisher::new());
    let coordinator = PlaybackCoordinator::new(
        paragraphs,
        cache,
        engine,
        events,
        config.playback.coordinator_config(config.cache.max_rate_factor),
    );
    coordinator
        .set_playback_speed(config.playback.initial_rate)
        .await;

    let mut rx = coordinator.subscribe();

    if let Err(e) = coordinator.play_paragraph(0).await {
        tracing::error!(error = %e, "Failed to start narration");
    } else {
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(event) => {
                        match serde_json::to_string(&event) {
                            Ok(json) => tracing::info!(event = %json, "Playback event"),
                            Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                        }
                        match event {
                            PlaybackEvent::EndOfContent { .. } => break,
                            PlaybackEvent::Error { .. } if !coordinator.state().is_playing() => {
                                break
                            }
                            _ => {}
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
            }
        }
    }

    let stats = coordinator.cache().stats();
    tracing::info!(
        hits = stats.hit_count,
        misses = stats.miss_count,
        synthesized = stats.synthesis_count,
        durable = stats.durable,
        "Cache statistics"
    );

    coordinator.teardown().await;

    if let Some(archive) = sled_archive {
        let stats = archive.stats().await;
        tracing::info!(
            entries = stats.total_entries,
            size_bytes = stats.total_size_bytes,
            "Archive statistics"
        );
        archive.flush()?;
    }

    tracing::info!("Narration finished");
    Ok(())
}
