//! Synthesis Cache - 段落音频缓存
//!
//! - 按段落索引缓存合成结果
//! - 同一索引的并发请求合并为一次合成（single-flight）
//! - 合成成功后按字符预算和播放速率预取后续段落
//! - 超出容量时淘汰保留窗口外的非持久记录
//! - 新合成的音频异步镜像到持久归档，之后可直接从归档恢复

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use super::prefetch::PrefetchPolicy;
use crate::application::ports::{
    ArchiveMetadata, AudioArchivePort, AudioStoragePort, SpeechSynthesizerPort, SynthesisRequest,
};
use crate::domain::{AudioHandle, ContentId, ParagraphAudioRecord, RecordState, VoicePair};

/// 缓存错误
///
/// 需要 Clone：同一次合成的结果会分发给所有等待者
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Synthesis failed for paragraph {index}: {message}")]
    SynthesisFailure { index: usize, message: String },

    #[error("Voices changed while synthesizing paragraph {index}")]
    StaleVoiceMismatch { index: usize },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Synthesis task for paragraph {index} failed: {message}")]
    TaskFailed { index: usize, message: String },

    #[error("Synthesis of paragraph {index} was superseded")]
    Superseded { index: usize },
}

/// 缓存配置
#[derive(Debug, Clone)]
pub struct SynthesisCacheConfig {
    pub policy: PrefetchPolicy,
    /// 记录数超过该值时触发淘汰
    pub max_cache_size: usize,
}

impl Default for SynthesisCacheConfig {
    fn default() -> Self {
        Self {
            policy: PrefetchPolicy::default(),
            max_cache_size: 20,
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_records: usize,
    pub ready: usize,
    pub pending: usize,
    pub failed: usize,
    pub durable: usize,
    pub in_flight: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub synthesis_count: u64,
}

type SharedFetch = Shared<BoxFuture<'static, Result<ParagraphAudioRecord, CacheError>>>;

/// 进行中的合成
struct InFlight {
    id: u64,
    generation: u64,
    text: String,
    voices: VoicePair,
    fetch: SharedFetch,
}

impl InFlight {
    /// 只有文本、音色与会话代次都一致时才能共享结果
    fn serves(&self, text: &str, voices: &VoicePair, generation: u64) -> bool {
        self.generation == generation && self.text == text && self.voices == *voices
    }
}

/// 合成缓存
///
/// Clone 代价很低，所有克隆共享同一份状态
#[derive(Clone)]
pub struct SynthesisCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    content_id: ContentId,
    config: SynthesisCacheConfig,
    synthesizer: Arc<dyn SpeechSynthesizerPort>,
    storage: Arc<dyn AudioStoragePort>,
    archive: Option<Arc<dyn AudioArchivePort>>,
    /// index -> 记录
    records: DashMap<usize, ParagraphAudioRecord>,
    /// index -> 进行中的合成
    in_flight: DashMap<usize, InFlight>,
    voices: RwLock<VoicePair>,
    /// f32 bits
    playback_rate: AtomicU32,
    current_index: AtomicUsize,
    next_fetch_id: AtomicU64,
    /// teardown 时递增，旧代次的合成结果不再安装
    generation: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    synthesis_count: AtomicU64,
}

impl SynthesisCache {
    pub fn new(
        content_id: ContentId,
        voices: VoicePair,
        config: SynthesisCacheConfig,
        synthesizer: Arc<dyn SpeechSynthesizerPort>,
        storage: Arc<dyn AudioStoragePort>,
        archive: Option<Arc<dyn AudioArchivePort>>,
    ) -> Self {
        tracing::info!(
            content_id = %content_id,
            voices = %voices,
            max_cache_size = config.max_cache_size,
            char_threshold = config.policy.char_threshold,
            base_distance = config.policy.base_distance,
            archive = archive.is_some(),
            "SynthesisCache initialized"
        );

        Self {
            inner: Arc::new(CacheInner {
                content_id,
                config,
                synthesizer,
                storage,
                archive,
                records: DashMap::new(),
                in_flight: DashMap::new(),
                voices: RwLock::new(voices),
                playback_rate: AtomicU32::new(1.0_f32.to_bits()),
                current_index: AtomicUsize::new(0),
                next_fetch_id: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                hit_count: AtomicU64::new(0),
                miss_count: AtomicU64::new(0),
                synthesis_count: AtomicU64::new(0),
            }),
        }
    }

    pub fn content_id(&self) -> &ContentId {
        &self.inner.content_id
    }

    pub fn voices(&self) -> VoicePair {
        self.inner.voices()
    }

    pub fn playback_rate(&self) -> f32 {
        self.inner.playback_rate()
    }

    /// 获取段落音频
    ///
    /// 命中则立即返回；否则加入同索引的进行中合成或发起新合成。
    /// 成功后在后台触发预取。显式请求会重试此前失败的段落
    pub async fn get_audio(
        &self,
        index: usize,
        text: &str,
        paragraphs: &Arc<[String]>,
    ) -> Result<ParagraphAudioRecord, CacheError> {
        self.inner.current_index.store(index, Ordering::SeqCst);
        let voices = self.inner.voices();

        if let Some(record) = self.inner.lookup_ready(index, text, &voices) {
            self.inner.hit_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(index = index, "Cache hit");
            self.spawn_prefetch(index, Arc::clone(paragraphs));
            return Ok(record);
        }

        self.inner.miss_count.fetch_add(1, Ordering::Relaxed);
        let fetch = self.inner.join_or_start(index, text.to_string(), voices);
        let record = fetch.await?;

        self.spawn_prefetch(index, Arc::clone(paragraphs));
        Ok(record)
    }

    /// 是否存在可播放的记录
    ///
    /// 发现内部不一致（Ready 但无句柄）或音色过期的记录时直接删除
    pub fn is_ready(&self, index: usize) -> bool {
        let voices = self.inner.voices();

        enum Verdict {
            Ready,
            NotReady,
            Inconsistent,
            Stale,
        }

        let verdict = match self.inner.records.get(&index) {
            None => return false,
            Some(record) if !record.is_consistent() => Verdict::Inconsistent,
            Some(record) if record.is_ready() && record.voices != voices => Verdict::Stale,
            Some(record) if record.is_ready() => Verdict::Ready,
            Some(_) => Verdict::NotReady,
        };

        match verdict {
            Verdict::Ready => true,
            Verdict::NotReady => false,
            Verdict::Inconsistent => {
                tracing::warn!(index = index, "Inconsistent cache record removed");
                self.inner
                    .records
                    .remove_if(&index, |_, record| !record.is_consistent());
                false
            }
            Verdict::Stale => {
                tracing::warn!(index = index, "Stale voice record removed");
                if let Some((_, record)) = self
                    .inner
                    .records
                    .remove_if(&index, |_, record| record.voices != voices)
                {
                    self.inner.release_owned(vec![record]);
                }
                false
            }
        }
    }

    /// 更新预取使用的播放速率
    pub fn set_playback_speed(&self, rate: f32) {
        self.inner
            .playback_rate
            .store(rate.to_bits(), Ordering::Relaxed);
        tracing::debug!(rate = rate, "Cache playback speed updated");
    }

    /// 切换音色
    ///
    /// 任一音色变化时清除全部非持久记录和进行中的合成，返回是否发生变化
    pub fn update_voices(&self, voices: VoicePair) -> bool {
        {
            let mut current = match self.inner.voices.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *current == voices {
                return false;
            }
            *current = voices.clone();
        }

        self.inner.in_flight.clear();
        let removed = self.inner.remove_non_durable(false);
        let count = removed.len();
        self.inner.release_owned(removed);

        tracing::info!(
            content_id = %self.inner.content_id,
            voices = %voices,
            cleared = count,
            "Voices changed, non-durable records cleared"
        );
        true
    }

    /// 清空非持久记录并释放其音频文件
    ///
    /// 进行中的合成及其 Pending 记录保留，之后的请求直接加入
    pub async fn clear_cache(&self) {
        let removed = self.inner.remove_non_durable(true);
        let count = removed.len();
        for record in removed {
            if let Some(handle) = record.audio_handle {
                if let Err(e) = self.inner.storage.release(handle.path()).await {
                    tracing::warn!(index = record.index, error = %e, "Failed to release audio");
                }
            }
        }
        tracing::info!(content_id = %self.inner.content_id, cleared = count, "Cache cleared");
    }

    /// 会话拆除：清空索引并释放全部临时音频（归档文件不受影响）
    ///
    /// 进行中的合成继续运行直至结束，其结果被丢弃并释放
    pub async fn teardown(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.records.clear();
        match self.inner.storage.release_all().await {
            Ok(deleted) => tracing::info!(
                content_id = %self.inner.content_id,
                deleted_files = deleted,
                "Cache torn down"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to release session audio"),
        }
    }

    /// 直接安装持久音频记录，不经过合成
    pub fn seed_from_durable(
        &self,
        index: usize,
        text: &str,
        handle: AudioHandle,
    ) -> Option<ParagraphAudioRecord> {
        if !handle.is_usable() {
            tracing::warn!(index = index, "Refusing to seed unusable handle");
            return None;
        }
        let record = ParagraphAudioRecord::durable(index, text, self.inner.voices(), handle, None);
        self.inner.records.insert(index, record.clone());
        tracing::debug!(index = index, "Seeded durable record");
        Some(record)
    }

    /// 从归档读取并安装持久记录；文本或音色不匹配时不安装
    pub async fn seed_from_archive(&self, index: usize, text: &str) -> bool {
        let voices = self.inner.voices();
        let generation = self.inner.generation();
        self.inner
            .restore_from_archive(index, text, &voices, generation)
            .await
            .is_some()
    }

    /// 记录首次加载得到的时长
    pub fn record_duration(&self, index: usize, duration: Duration) {
        if let Some(mut record) = self.inner.records.get_mut(&index) {
            if record.state == RecordState::Ready {
                record.duration_hint = Some(duration);
            }
        }
    }

    /// 获取记录快照
    pub fn record(&self, index: usize) -> Option<ParagraphAudioRecord> {
        self.inner.records.get(&index).map(|r| r.clone())
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total_records: self.inner.records.len(),
            in_flight: self.inner.in_flight.len(),
            hit_count: self.inner.hit_count.load(Ordering::Relaxed),
            miss_count: self.inner.miss_count.load(Ordering::Relaxed),
            synthesis_count: self.inner.synthesis_count.load(Ordering::Relaxed),
            ..Default::default()
        };
        for record in self.inner.records.iter() {
            match record.state {
                RecordState::Ready => stats.ready += 1,
                RecordState::Pending => stats.pending += 1,
                RecordState::Failed => stats.failed += 1,
                RecordState::Empty => {}
            }
            if record.is_durable {
                stats.durable += 1;
            }
        }
        stats
    }

    /// 后台预取（不阻塞调用方）
    fn spawn_prefetch(&self, from: usize, paragraphs: Arc<[String]>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.prefetch(from, &paragraphs);
        });
    }
}

impl CacheInner {
    fn voices(&self) -> VoicePair {
        match self.voices.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn playback_rate(&self) -> f32 {
        f32::from_bits(self.playback_rate.load(Ordering::Relaxed))
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// 查找可直接返回的记录，顺便删除不一致的记录
    fn lookup_ready(
        &self,
        index: usize,
        text: &str,
        voices: &VoicePair,
    ) -> Option<ParagraphAudioRecord> {
        let (hit, inconsistent) = match self.records.get(&index) {
            Some(record) if !record.is_consistent() => (None, true),
            Some(record) if record.is_ready() && record.matches(text, voices) => {
                (Some(record.clone()), false)
            }
            _ => (None, false),
        };

        if inconsistent {
            tracing::warn!(index = index, "Inconsistent cache record removed");
            self.records
                .remove_if(&index, |_, record| !record.is_consistent());
        }
        hit
    }

    /// 加入进行中的合成，或发起新的合成
    ///
    /// 进行中的合成针对不同文本或音色时，新合成取而代之
    fn join_or_start(
        self: &Arc<Self>,
        index: usize,
        text: String,
        voices: VoicePair,
    ) -> SharedFetch {
        let generation = self.generation();
        let entry = match self.in_flight.entry(index) {
            Entry::Occupied(entry) if entry.get().serves(&text, &voices, generation) => {
                tracing::debug!(index = index, "Joining in-flight synthesis");
                return entry.get().fetch.clone();
            }
            entry => entry,
        };

        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        self.records.insert(
            index,
            ParagraphAudioRecord::pending(index, text.as_str(), voices.clone()),
        );

        let inner = Arc::clone(self);
        let (task_text, task_voices) = (text.clone(), voices.clone());
        let handle = tokio::spawn(async move {
            let result = inner
                .synthesize_and_store(index, &task_text, &task_voices, generation)
                .await;
            inner.in_flight.remove_if(&index, |_, f| f.id == id);
            result
        });

        let fetch = async move {
            handle.await.unwrap_or_else(|e| {
                Err(CacheError::TaskFailed {
                    index,
                    message: e.to_string(),
                })
            })
        }
        .boxed()
        .shared();

        let in_flight = InFlight {
            id,
            generation,
            text,
            voices,
            fetch: fetch.clone(),
        };
        match entry {
            Entry::Occupied(mut entry) => {
                tracing::debug!(index = index, "Replacing in-flight synthesis");
                entry.insert(in_flight);
            }
            Entry::Vacant(entry) => {
                entry.insert(in_flight);
            }
        }
        fetch
    }

    /// 先查归档，再调用合成服务，写入临时文件后安装记录
    async fn synthesize_and_store(
        self: &Arc<Self>,
        index: usize,
        text: &str,
        voices: &VoicePair,
        generation: u64,
    ) -> Result<ParagraphAudioRecord, CacheError> {
        if let Some(record) = self
            .restore_from_archive(index, text, voices, generation)
            .await
        {
            return Ok(record);
        }
        if self.generation() != generation {
            return Err(CacheError::Superseded { index });
        }

        self.synthesis_count.fetch_add(1, Ordering::Relaxed);
        let request = SynthesisRequest {
            text: text.to_string(),
            voices: voices.clone(),
        };

        let failed = |message: String| self.mark_failed(index, text, voices, message, generation);

        let response = match self.synthesizer.synthesize(request).await {
            Ok(response) => response,
            Err(e) => return Err(failed(e.to_string())),
        };

        if response.audio_data.is_empty() {
            return Err(failed("empty audio stream".to_string()));
        }

        let path = match self.storage.write_audio(index, &response.audio_data).await {
            Ok(path) => path,
            Err(e) => {
                failed(e.to_string());
                return Err(CacheError::StorageError(e.to_string()));
            }
        };

        let record = ParagraphAudioRecord::ready(
            index,
            text,
            voices.clone(),
            AudioHandle::new(path),
            response.duration_ms.map(Duration::from_millis),
        );
        let record = self.install(record, generation)?;

        tracing::info!(
            index = index,
            chars = record.character_count,
            duration_ms = ?response.duration_ms,
            audio_size = response.audio_data.len(),
            "Paragraph synthesized"
        );

        if !record.is_durable {
            self.spawn_mirror(record.clone());
        }
        Ok(record)
    }

    /// 安装 Ready 记录
    ///
    /// 音色已变化、会话已拆除或该索引已换成其他文本的合成时丢弃结果；
    /// 已有匹配的持久记录时保留持久记录
    fn install(
        &self,
        record: ParagraphAudioRecord,
        generation: u64,
    ) -> Result<ParagraphAudioRecord, CacheError> {
        let index = record.index;

        if self.generation() != generation {
            tracing::debug!(index = index, "Dropping synthesis result from before teardown");
            if !record.is_durable {
                self.release_owned(vec![record]);
            }
            return Err(CacheError::Superseded { index });
        }

        if self.voices() != record.voices {
            tracing::debug!(index = index, "Dropping synthesis result for superseded voices");
            self.records.remove_if(&index, |_, existing| {
                existing.state == RecordState::Pending && existing.voices == record.voices
            });
            if !record.is_durable {
                self.release_owned(vec![record]);
            }
            return Err(CacheError::StaleVoiceMismatch { index });
        }

        match self.records.entry(index) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if existing.voices == record.voices
                    && !existing.matches(&record.source_text, &record.voices)
                {
                    tracing::debug!(index = index, "Dropping synthesis result for replaced text");
                    drop(entry);
                    if !record.is_durable {
                        self.release_owned(vec![record]);
                    }
                    return Err(CacheError::Superseded { index });
                }
                if existing.is_durable
                    && existing.is_ready()
                    && existing.matches(&record.source_text, &record.voices)
                    && !record.is_durable
                {
                    let kept = existing.clone();
                    drop(entry);
                    self.release_owned(vec![record]);
                    return Ok(kept);
                }

                let previous = entry.insert(record.clone());
                if !previous.is_durable && previous.audio_handle != record.audio_handle {
                    self.release_owned(vec![previous]);
                }
                Ok(record)
            }
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    /// 标记失败（仅当音色与会话代次未变，且该索引未换成其他文本的合成）
    fn mark_failed(
        &self,
        index: usize,
        text: &str,
        voices: &VoicePair,
        message: String,
        generation: u64,
    ) -> CacheError {
        tracing::warn!(index = index, error = %message, "Paragraph synthesis failed");
        if self.voices() == *voices && self.generation() == generation {
            let replaced = self.records.get(&index).is_some_and(|existing| {
                existing.voices == *voices && !existing.matches(text, voices)
            });
            if !replaced {
                self.records.insert(
                    index,
                    ParagraphAudioRecord::failed(index, text, voices.clone(), message.as_str()),
                );
            }
        }
        CacheError::SynthesisFailure { index, message }
    }

    /// 从归档恢复匹配的记录
    async fn restore_from_archive(
        &self,
        index: usize,
        text: &str,
        voices: &VoicePair,
        generation: u64,
    ) -> Option<ParagraphAudioRecord> {
        let archive = self.archive.as_ref()?;

        let entry = match archive.read(&self.content_id, index).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(index = index, error = %e, "Archive read failed");
                return None;
            }
        };

        if !entry.matches(text, voices) {
            tracing::debug!(index = index, "Archive entry does not match text or voices");
            return None;
        }
        if !tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            tracing::warn!(index = index, path = %entry.path.display(), "Archived audio missing");
            return None;
        }

        let record = ParagraphAudioRecord::durable(
            index,
            text,
            voices.clone(),
            AudioHandle::new(entry.path),
            entry.metadata.duration_ms.map(Duration::from_millis),
        );
        match self.install(record, generation) {
            Ok(record) => {
                tracing::debug!(index = index, "Restored paragraph from archive");
                Some(record)
            }
            Err(_) => None,
        }
    }

    /// 后台镜像到归档；成功后记录改为指向归档文件并标记为持久
    fn spawn_mirror(self: &Arc<Self>, record: ParagraphAudioRecord) {
        let Some(archive) = self.archive.clone() else {
            return;
        };
        let Some(scratch) = record.audio_handle.clone() else {
            return;
        };
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            let metadata = ArchiveMetadata::new(
                &record.source_text,
                record.voices.clone(),
                record.duration_hint.map(|d| d.as_millis() as u64),
            );
            match archive
                .save(&inner.content_id, record.index, scratch.path(), metadata)
                .await
            {
                Ok(stored) => inner.promote_durable(record.index, &scratch, stored),
                Err(e) => {
                    tracing::warn!(index = record.index, error = %e, "Archive mirror failed");
                }
            }
        });
    }

    /// 临时文件保留到会话拆除，避免与正在加载的播放器竞争
    fn promote_durable(&self, index: usize, scratch: &AudioHandle, stored: PathBuf) {
        if let Some(mut record) = self.records.get_mut(&index) {
            if record.audio_handle.as_ref() == Some(scratch) {
                record.audio_handle = Some(AudioHandle::new(stored));
                record.is_durable = true;
                tracing::debug!(index = index, "Record mirrored to archive");
            }
        }
    }

    /// 执行一次预取，随后检查淘汰
    fn prefetch(self: &Arc<Self>, from: usize, paragraphs: &[String]) {
        let voices = self.voices();
        let rate = self.playback_rate();

        // 下一段优先发起
        let next = from + 1;
        let mut issued = 0;
        if let Some(text) = paragraphs.get(next) {
            if self.prefetch_one(next, text, &voices) {
                issued += 1;
            }
        }

        let counts: Vec<usize> = paragraphs.iter().map(|p| p.chars().count()).collect();
        let window = self.config.policy.window(from, &counts, rate);
        for index in window.iter().copied().filter(|&i| i != next) {
            if self.prefetch_one(index, &paragraphs[index], &voices) {
                issued += 1;
            }
        }

        tracing::debug!(
            from = from,
            window = window.len(),
            issued = issued,
            rate = rate,
            "Prefetch pass"
        );

        self.evict();
    }

    /// 对单个段落发起预取，已就绪/进行中/已失败的段落跳过
    fn prefetch_one(self: &Arc<Self>, index: usize, text: &str, voices: &VoicePair) -> bool {
        let skip = match self.records.get(&index) {
            Some(record) => match record.state {
                RecordState::Pending => true,
                RecordState::Ready => record.is_consistent() && record.matches(text, voices),
                RecordState::Failed => record.matches(text, voices),
                RecordState::Empty => false,
            },
            None => false,
        };
        if skip || self.in_flight.contains_key(&index) {
            return false;
        }

        drop(self.join_or_start(index, text.to_string(), voices.clone()));
        true
    }

    /// 记录数超限时淘汰保留窗口外的非持久记录
    fn evict(&self) {
        if self.records.len() <= self.config.max_cache_size {
            return;
        }

        let current = self.current_index.load(Ordering::SeqCst);
        let retention = self.config.policy.retention(current, self.playback_rate());

        let victims: Vec<usize> = self
            .records
            .iter()
            .filter(|r| {
                !r.is_durable && r.state != RecordState::Pending && !retention.contains(r.key())
            })
            .map(|r| *r.key())
            .collect();

        let mut removed = Vec::with_capacity(victims.len());
        for index in victims {
            if let Some((_, record)) = self.records.remove_if(&index, |_, r| {
                !r.is_durable && r.state != RecordState::Pending
            }) {
                removed.push(record);
            }
        }

        tracing::debug!(
            current = current,
            retain_from = *retention.start(),
            retain_to = *retention.end(),
            evicted = removed.len(),
            remaining = self.records.len(),
            "Cache eviction"
        );
        self.release_owned(removed);
    }

    /// `keep_pending` 为 true 时保留进行中合成的 Pending 记录
    fn remove_non_durable(&self, keep_pending: bool) -> Vec<ParagraphAudioRecord> {
        let removable = |r: &ParagraphAudioRecord| {
            !r.is_durable && !(keep_pending && r.state == RecordState::Pending)
        };
        let keys: Vec<usize> = self
            .records
            .iter()
            .filter(|r| removable(r.value()))
            .map(|r| *r.key())
            .collect();

        keys.into_iter()
            .filter_map(|index| self.records.remove_if(&index, |_, r| removable(r)))
            .map(|(_, record)| record)
            .collect()
    }

    /// 后台释放记录持有的临时文件（持久记录的文件属于归档，不释放）
    fn release_owned(&self, records: Vec<ParagraphAudioRecord>) {
        let handles: Vec<AudioHandle> = records
            .into_iter()
            .filter(|r| !r.is_durable)
            .filter_map(|r| r.audio_handle)
            .collect();
        if handles.is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(count = handles.len(), "No runtime, audio files left for teardown");
            return;
        };
        let storage = Arc::clone(&self.storage);
        runtime.spawn(async move {
            for handle in handles {
                if let Err(e) = storage.release(handle.path()).await {
                    tracing::warn!(path = %handle, error = %e, "Failed to release audio");
                }
            }
        });
    }
}
