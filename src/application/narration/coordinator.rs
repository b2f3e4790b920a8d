//! Playback Coordinator - 段落播放协调
//!
//! 独占持有唯一的活动音频，驱动播放状态机：
//! - 所有改变状态的操作由一把操作锁保护，重叠的操作直接拒绝
//! - 监听引擎进度，接近结尾时触发一次自动前进
//! - 自动前进期间设置 is_transitioning，引擎报告正在播放后清除

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::completion::{CompletionGuard, CompletionPolicy};
use super::synthesis_cache::SynthesisCache;
use crate::application::error::NarrationError;
use crate::application::ports::{
    EngineError, LoadedSound, PlaybackEnginePort, PlaybackStatus, SoundPort,
};
use crate::domain::{PlaybackRate, PlaybackSession, PlaybackState, VoicePair};
use crate::infrastructure::events::{EventPublisher, PlaybackEvent};

/// 协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub min_rate: f32,
    pub max_rate: f32,
    pub completion: CompletionPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_rate: PlaybackRate::MIN,
            max_rate: PlaybackRate::MAX,
            completion: CompletionPolicy::default(),
        }
    }
}

/// 当前加载的音频
struct ActiveSound {
    index: usize,
    load_id: u64,
    sound: Arc<dyn SoundPort>,
    monitor: JoinHandle<()>,
}

/// 播放协调器
#[derive(Clone)]
pub struct PlaybackCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    cache: SynthesisCache,
    engine: Arc<dyn PlaybackEnginePort>,
    events: Arc<EventPublisher>,
    config: CoordinatorConfig,
    paragraphs: Arc<[String]>,
    session: Mutex<PlaybackSession>,
    /// 操作锁（try_lock，忙时拒绝）
    operation: tokio::sync::Mutex<()>,
    active: tokio::sync::Mutex<Option<ActiveSound>>,
    load_seq: AtomicU64,
    /// cleanup 计数，用于丢弃 cleanup 之后才完成的加载
    epoch: AtomicU64,
}

impl PlaybackCoordinator {
    pub fn new(
        paragraphs: Vec<String>,
        cache: SynthesisCache,
        engine: Arc<dyn PlaybackEnginePort>,
        events: Arc<EventPublisher>,
        config: CoordinatorConfig,
    ) -> Self {
        let session = PlaybackSession::new(cache.content_id().clone());
        // 先注册通道，之后的 subscribe 才能拿到接收端
        let _ = events.register_session(&session.id);

        tracing::info!(
            session_id = %session.id,
            content_id = %session.content_id,
            paragraphs = paragraphs.len(),
            "Playback session created"
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                cache,
                engine,
                events,
                config,
                paragraphs: paragraphs.into(),
                session: Mutex::new(session),
                operation: tokio::sync::Mutex::new(()),
                active: tokio::sync::Mutex::new(None),
                load_seq: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn session_id(&self) -> String {
        self.inner.session().id.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.session().state
    }

    pub fn is_transitioning(&self) -> bool {
        self.inner.session().is_transitioning
    }

    pub fn rate(&self) -> PlaybackRate {
        self.inner.session().rate
    }

    pub fn paragraph_count(&self) -> usize {
        self.inner.paragraphs.len()
    }

    pub fn cache(&self) -> &SynthesisCache {
        &self.inner.cache
    }

    /// 订阅本会话事件
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.events.register_session(&self.session_id())
    }

    /// 播放指定段落
    ///
    /// 已有操作进行中时返回 ConcurrentOperationRejected；失败时发布错误事件并回到 Idle(index)
    pub async fn play_paragraph(&self, index: usize) -> Result<(), NarrationError> {
        let _operation = self.inner.operation.try_lock().map_err(|_| {
            tracing::debug!(index = index, "play_paragraph rejected, operation in flight");
            NarrationError::ConcurrentOperationRejected
        })?;
        self.inner.play_locked(index).await
    }

    /// 播放/暂停切换，返回切换后的状态
    pub async fn toggle_playback(&self) -> Result<PlaybackState, NarrationError> {
        let _operation = self
            .inner
            .operation
            .try_lock()
            .map_err(|_| NarrationError::ConcurrentOperationRejected)?;

        let active = self.inner.active.lock().await;
        let Some(active) = active.as_ref() else {
            tracing::debug!("toggle_playback ignored, nothing loaded");
            return Ok(self.state());
        };

        match self.state() {
            PlaybackState::Playing(index) => {
                active
                    .sound
                    .pause()
                    .await
                    .map_err(|e| NarrationError::load(index, e.to_string()))?;
                self.inner.set_state(PlaybackState::Paused(index));
            }
            PlaybackState::Paused(index) => {
                active
                    .sound
                    .play()
                    .await
                    .map_err(|e| NarrationError::load(index, e.to_string()))?;
                self.inner.set_state(PlaybackState::Playing(index));
            }
            other => {
                tracing::debug!(state = other.as_str(), "toggle_playback ignored");
            }
        }
        Ok(self.state())
    }

    /// 设置播放速率（截断到配置范围），返回实际生效的速率
    pub async fn set_playback_speed(&self, rate: f32) -> PlaybackRate {
        let config = &self.inner.config;
        let rate = PlaybackRate::clamped_within(rate, config.min_rate, config.max_rate);
        self.inner.session().rate = rate;
        self.inner.cache.set_playback_speed(rate.value());

        let active = self.inner.active.lock().await;
        if let Some(active) = active.as_ref() {
            if let Err(e) = self.inner.apply_rate(active.sound.as_ref(), rate.value()).await {
                tracing::warn!(
                    index = active.index,
                    rate = rate.value(),
                    error = %e,
                    "Failed to apply playback rate"
                );
                self.inner.events.publish_warning(
                    &self.session_id(),
                    &format!("Playback rate {} not applied: {}", rate, e),
                );
            }
        }

        tracing::info!(rate = rate.value(), "Playback speed set");
        rate
    }

    /// 切换音色，返回是否发生变化
    pub fn update_voices(&self, voices: VoicePair) -> bool {
        let changed = self.inner.cache.update_voices(voices.clone());
        if changed {
            self.inner
                .events
                .publish_voices_changed(&self.session_id(), &voices);
        }
        changed
    }

    /// 释放活动音频并回到 Idle，可重复调用
    pub async fn cleanup(&self) {
        self.inner.cleanup().await;
    }

    /// 拆除会话：释放音频、清空缓存、关闭事件通道
    pub async fn teardown(&self) {
        self.inner.cleanup().await;
        self.inner.cache.teardown().await;
        self.inner.set_state(PlaybackState::NoSession);

        let session_id = self.session_id();
        self.inner.events.publish_session_closed(&session_id, "teardown");
        self.inner.events.unregister_session(&session_id);
        tracing::info!(session_id = %session_id, "Playback session torn down");
    }
}

impl CoordinatorInner {
    fn session(&self) -> MutexGuard<'_, PlaybackSession> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn rate(&self) -> f32 {
        self.session().rate.value()
    }

    fn set_state(&self, state: PlaybackState) {
        let (session_id, changed) = {
            let mut session = self.session();
            let changed = session.state != state;
            session.state = state;
            (session.id.clone(), changed)
        };
        if changed {
            tracing::debug!(
                state = state.as_str(),
                index = ?state.index(),
                "Playback state changed"
            );
            self.events.publish_state(&session_id, state);
        }
    }

    fn set_transitioning(&self, value: bool) {
        self.session().is_transitioning = value;
    }

    /// 调用方必须持有操作锁
    async fn play_locked(self: &Arc<Self>, index: usize) -> Result<(), NarrationError> {
        let total = self.paragraphs.len();
        if index >= total {
            return Err(self.fail(index, NarrationError::IndexOutOfRange { index, total }));
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.release_active().await;
        self.set_state(PlaybackState::Loading(index));

        let record = match self
            .cache
            .get_audio(index, &self.paragraphs[index], &self.paragraphs)
            .await
        {
            Ok(record) => record,
            Err(e) => return Err(self.fail(index, e.into())),
        };

        if record.voices != self.cache.voices() {
            return Err(self.fail(index, NarrationError::StaleVoiceMismatch { index }));
        }
        let Some(handle) = record.audio_handle else {
            return Err(self.fail(index, NarrationError::load(index, "record has no audio handle")));
        };

        let LoadedSound {
            sound,
            status,
            duration_ms,
        } = match self.engine.load(&handle).await {
            Ok(loaded) => loaded,
            Err(e) => return Err(self.fail(index, NarrationError::load(index, e.to_string()))),
        };
        let sound: Arc<dyn SoundPort> = Arc::from(sound);

        if let Some(ms) = duration_ms {
            self.cache.record_duration(index, Duration::from_millis(ms));
        }

        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!(index = index, "Session cleaned up during load, discarding sound");
            if let Err(e) = sound.unload().await {
                tracing::warn!(index = index, error = %e, "Failed to unload discarded sound");
            }
            return Ok(());
        }

        let rate = self.rate();
        if let Err(e) = self.apply_rate(sound.as_ref(), rate).await {
            tracing::warn!(index = index, rate = rate, error = %e, "Failed to apply playback rate");
            let session_id = self.session().id.clone();
            self.events.publish_warning(
                &session_id,
                &format!("Playback rate {} not applied: {}", rate, e),
            );
        }

        if let Err(e) = sound.play().await {
            if let Err(unload_err) = sound.unload().await {
                tracing::warn!(index = index, error = %unload_err, "Failed to unload sound");
            }
            return Err(self.fail(index, NarrationError::load(index, e.to_string())));
        }

        {
            // 持有 active 锁再启动监听，保证监听看到的是已安装的音频；
            // cleanup 先增加 epoch 再取 active 锁，在锁内复查即可与之串行
            let mut active = self.active.lock().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                drop(active);
                tracing::debug!(
                    index = index,
                    "Session cleaned up while starting, discarding sound"
                );
                if let Err(e) = sound.unload().await {
                    tracing::warn!(index = index, error = %e, "Failed to unload discarded sound");
                }
                return Ok(());
            }
            let load_id = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let monitor = self.spawn_monitor(index, load_id, status);
            *active = Some(ActiveSound {
                index,
                load_id,
                sound,
                monitor,
            });
            self.set_state(PlaybackState::Playing(index));
        }

        tracing::info!(
            index = index,
            total = total,
            rate = rate,
            durable = record.is_durable,
            duration_ms = ?duration_ms,
            "Paragraph playing"
        );
        Ok(())
    }

    /// 记录错误、发布事件并回到 Idle(index)
    fn fail(&self, index: usize, error: NarrationError) -> NarrationError {
        tracing::warn!(
            index = index,
            kind = error.kind(),
            error = %error,
            "Paragraph playback failed"
        );
        let session_id = {
            let mut session = self.session();
            session.is_transitioning = false;
            session.id.clone()
        };
        self.events.publish_error(&session_id, &error);
        self.set_state(PlaybackState::Idle(index));
        error
    }

    /// 先尝试保持音调的变速，失败后退化为普通变速
    async fn apply_rate(&self, sound: &dyn SoundPort, rate: f32) -> Result<(), EngineError> {
        match sound.set_rate(rate, true).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    rate = rate,
                    error = %e,
                    "Pitch-preserving rate failed, retrying without pitch correction"
                );
                sound.set_rate(rate, false).await
            }
        }
    }

    async fn release_active(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };
        active.monitor.abort();
        if let Err(e) = active.sound.unload().await {
            tracing::warn!(index = active.index, error = %e, "Failed to unload sound");
        }
        tracing::debug!(index = active.index, load_id = active.load_id, "Sound released");
    }

    async fn cleanup(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.release_active().await;

        let next = match self.session().state.index() {
            Some(index) => PlaybackState::Idle(index),
            None => PlaybackState::NoSession,
        };
        self.set_transitioning(false);
        self.set_state(next);
        tracing::debug!(state = next.as_str(), "Playback cleaned up");
    }

    async fn is_current_load(&self, load_id: u64) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| active.load_id == load_id)
    }

    /// 监听任务只持有弱引用，会话释放后自动退出
    fn spawn_monitor(
        self: &Arc<Self>,
        index: usize,
        load_id: u64,
        mut status: mpsc::Receiver<PlaybackStatus>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let guard = CompletionGuard::new();
            while let Some(update) = status.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.on_status(index, load_id, update, &guard);
            }
            tracing::debug!(index = index, load_id = load_id, "Status monitor stopped");
        })
    }

    fn on_status(
        self: &Arc<Self>,
        index: usize,
        load_id: u64,
        status: PlaybackStatus,
        guard: &CompletionGuard,
    ) {
        let session_id = {
            let mut session = self.session();
            // 已完成的音频不再代表当前播放
            if status.is_playing && !guard.has_fired() && session.is_transitioning {
                session.is_transitioning = false;
            }
            session.id.clone()
        };
        self.events
            .publish_progress(&session_id, index, status.position_ms, status.duration_ms);

        if self.config.completion.is_complete(&status, self.rate()) && guard.fire() {
            tracing::debug!(
                index = index,
                position_ms = status.position_ms,
                duration_ms = ?status.duration_ms,
                did_just_finish = status.did_just_finish,
                "Paragraph completed"
            );
            self.set_state(PlaybackState::Completed(index));
            self.spawn_auto_advance(index, load_id);
        }
    }

    /// 独立任务：切换段落会中止当前的监听任务
    fn spawn_auto_advance(self: &Arc<Self>, index: usize, load_id: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.auto_advance(index, load_id).await;
        });
    }

    async fn auto_advance(self: &Arc<Self>, index: usize, load_id: u64) {
        let next = index + 1;
        let session_id = self.session().id.clone();

        if next >= self.paragraphs.len() {
            tracing::info!(last_index = index, "End of content reached");
            self.events.publish_end_of_content(&session_id, index);
            return;
        }

        self.set_transitioning(true);
        if !self.cache.is_ready(next) {
            let delay = self.config.completion.advance_delay(self.rate());
            tracing::debug!(
                next = next,
                delay_ms = delay.as_millis() as u64,
                "Next paragraph not ready, delaying"
            );
            tokio::time::sleep(delay).await;
        }

        // 自动前进排队等待操作锁，拿到锁后确认音频没有被其他操作替换
        let _operation = self.operation.lock().await;
        if !self.is_current_load(load_id).await {
            tracing::debug!(from = index, "Auto-advance superseded by another operation");
            self.set_transitioning(false);
            return;
        }

        self.events.publish_auto_advance(&session_id, index, next);
        if let Err(e) = self.play_locked(next).await {
            tracing::warn!(from = index, to = next, error = %e, "Auto-advance failed");
        }
    }
}
