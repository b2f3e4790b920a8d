//! Headless Engine - 无输出设备的播放引擎
//!
//! 加载时用 symphonia 校验音频流，播放由时钟驱动：
//! 每个 tick 按速率推进位置并上报一次进度，到达结尾时上报 did_just_finish

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::{
    EngineError, LoadedSound, PlaybackEnginePort, PlaybackStatus, SoundPort,
};
use crate::domain::AudioHandle;
use crate::infrastructure::adapters::audio;

/// Headless 引擎配置
#[derive(Debug, Clone)]
pub struct HeadlessEngineConfig {
    /// 进度上报间隔
    pub status_interval: Duration,
}

impl Default for HeadlessEngineConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(250),
        }
    }
}

/// Headless 播放引擎
pub struct HeadlessEngine {
    config: HeadlessEngineConfig,
}

impl HeadlessEngine {
    pub fn new(config: HeadlessEngineConfig) -> Self {
        Self { config }
    }
}

/// 时钟任务与控制端共享的状态
struct Transport {
    playing: AtomicBool,
    unloaded: AtomicBool,
    /// f32 bits
    rate: AtomicU32,
    position_us: AtomicU64,
    duration_ms: u64,
}

impl Transport {
    fn status(&self, did_just_finish: bool) -> PlaybackStatus {
        PlaybackStatus {
            is_playing: self.playing.load(Ordering::SeqCst),
            position_ms: (self.position_us.load(Ordering::SeqCst) / 1000).min(self.duration_ms),
            duration_ms: Some(self.duration_ms),
            did_just_finish,
        }
    }
}

struct HeadlessSound {
    transport: Arc<Transport>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

impl HeadlessSound {
    fn ensure_loaded(&self) -> Result<(), EngineError> {
        if self.transport.unloaded.load(Ordering::SeqCst) {
            return Err(EngineError::NotLoaded);
        }
        Ok(())
    }

    fn stop_clock(&self) {
        let clock = match self.clock.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(clock) = clock {
            clock.abort();
        }
    }
}

impl Drop for HeadlessSound {
    fn drop(&mut self) {
        self.stop_clock();
    }
}

#[async_trait]
impl SoundPort for HeadlessSound {
    async fn play(&self) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.transport.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        self.transport.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn set_rate(&self, rate: f32, _preserve_pitch: bool) -> Result<(), EngineError> {
        self.ensure_loaded()?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EngineError::Unsupported(format!("rate {}", rate)));
        }
        self.transport.rate.store(rate.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    async fn unload(&self) -> Result<(), EngineError> {
        self.transport.unloaded.store(true, Ordering::SeqCst);
        self.transport.playing.store(false, Ordering::SeqCst);
        self.stop_clock();
        Ok(())
    }
}

/// 时钟任务：按 tick 推进位置，上报进度
async fn run_clock(
    transport: Arc<Transport>,
    tx: mpsc::Sender<PlaybackStatus>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let tick_us = interval.as_micros() as f64;
    let end_us = transport.duration_ms * 1000;

    loop {
        ticker.tick().await;
        if transport.unloaded.load(Ordering::SeqCst) {
            break;
        }

        let mut finished = false;
        if transport.playing.load(Ordering::SeqCst) {
            let rate = f32::from_bits(transport.rate.load(Ordering::SeqCst)) as f64;
            let advanced = transport.position_us.load(Ordering::SeqCst) + (tick_us * rate) as u64;
            if advanced >= end_us {
                transport.position_us.store(end_us, Ordering::SeqCst);
                transport.playing.store(false, Ordering::SeqCst);
                finished = true;
            } else {
                transport.position_us.store(advanced, Ordering::SeqCst);
            }
        }

        if tx.send(transport.status(finished)).await.is_err() {
            break;
        }
        if finished {
            tracing::debug!(duration_ms = transport.duration_ms, "Headless sound finished");
            break;
        }
    }
}

#[async_trait]
impl PlaybackEnginePort for HeadlessEngine {
    async fn load(&self, handle: &AudioHandle) -> Result<LoadedSound, EngineError> {
        let data = tokio::fs::read(handle.path())
            .await
            .map_err(|e| EngineError::LoadFailed(format!("{}: {}", handle, e)))?;
        let info = audio::probe(&data).map_err(|e| EngineError::LoadFailed(e.to_string()))?;

        let transport = Arc::new(Transport {
            playing: AtomicBool::new(false),
            unloaded: AtomicBool::new(false),
            rate: AtomicU32::new(1.0_f32.to_bits()),
            position_us: AtomicU64::new(0),
            duration_ms: info.duration_ms,
        });

        let (tx, rx) = mpsc::channel(32);
        let clock = tokio::spawn(run_clock(
            Arc::clone(&transport),
            tx,
            self.config.status_interval,
        ));

        tracing::debug!(
            path = %handle,
            duration_ms = info.duration_ms,
            sample_rate = info.sample_rate,
            "Headless sound loaded"
        );

        Ok(LoadedSound {
            sound: Box::new(HeadlessSound {
                transport,
                clock: Mutex::new(Some(clock)),
            }),
            status: rx,
            duration_ms: Some(info.duration_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine() -> HeadlessEngine {
        HeadlessEngine::new(HeadlessEngineConfig {
            status_interval: Duration::from_millis(20),
        })
    }

    async fn wav_file(dir: &std::path::Path, duration_ms: u64) -> AudioHandle {
        let path = dir.join(format!("{}.wav", duration_ms));
        tokio::fs::write(&path, audio::silence(duration_ms, 8_000))
            .await
            .unwrap();
        AudioHandle::new(path)
    }

    #[tokio::test]
    async fn test_invalid_audio_fails_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        tokio::fs::write(&path, b"not audio").await.unwrap();

        let result = engine().load(&AudioHandle::new(path)).await;
        assert!(matches!(result, Err(EngineError::LoadFailed(_))));

        let missing = engine().load(&AudioHandle::new(dir.path().join("missing.wav"))).await;
        assert!(matches!(missing, Err(EngineError::LoadFailed(_))));
    }

    #[tokio::test]
    async fn test_plays_to_end_and_reports_finish() {
        let dir = tempdir().unwrap();
        let handle = wav_file(dir.path(), 200).await;

        let mut loaded = engine().load(&handle).await.unwrap();
        assert_eq!(loaded.duration_ms, Some(200));
        loaded.sound.set_rate(2.0, true).await.unwrap();
        loaded.sound.play().await.unwrap();

        let finished = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(status) = loaded.status.recv().await {
                if status.did_just_finish {
                    return Some(status);
                }
            }
            None
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(finished.position_ms, 200);
        assert!(!finished.is_playing);
    }

    #[tokio::test]
    async fn test_paused_sound_holds_position() {
        let dir = tempdir().unwrap();
        let handle = wav_file(dir.path(), 5_000).await;

        let mut loaded = engine().load(&handle).await.unwrap();
        let status = loaded.status.recv().await.unwrap();
        assert!(!status.is_playing);
        assert_eq!(status.position_ms, 0);

        loaded.sound.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        loaded.sound.pause().await.unwrap();
        while loaded.status.try_recv().is_ok() {}

        let a = loaded.status.recv().await.unwrap();
        let b = loaded.status.recv().await.unwrap();
        assert!(a.position_ms > 0);
        assert_eq!(a.position_ms, b.position_ms);
    }

    #[tokio::test]
    async fn test_unload_closes_status_channel() {
        let dir = tempdir().unwrap();
        let handle = wav_file(dir.path(), 5_000).await;

        let mut loaded = engine().load(&handle).await.unwrap();
        loaded.sound.unload().await.unwrap();
        loaded.sound.unload().await.unwrap();

        assert!(matches!(loaded.sound.play().await, Err(EngineError::NotLoaded)));
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            while loaded.status.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_rate_rejected() {
        let dir = tempdir().unwrap();
        let handle = wav_file(dir.path(), 1_000).await;
        let loaded = engine().load(&handle).await.unwrap();
        assert!(matches!(
            loaded.sound.set_rate(0.0, true).await,
            Err(EngineError::Unsupported(_))
        ));
    }
}
