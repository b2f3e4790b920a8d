//! 测试替身：计数合成器、内存存储、内存归档、脚本化播放引擎

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::application::ports::{
    ArchiveEntry, ArchiveError, ArchiveMetadata, ArchiveStats, AudioArchivePort,
    AudioStorageError, AudioStoragePort, EngineError, LoadedSound, PlaybackEnginePort,
    PlaybackStatus, SoundPort, SpeechSynthesizerPort, StorageStats, SynthesisRequest,
    SynthesisResponse, TtsError,
};
use crate::domain::{AudioHandle, ContentId, VoicePair};

pub fn paragraphs(texts: &[&str]) -> Arc<[String]> {
    texts.iter().map(|t| t.to_string()).collect::<Vec<_>>().into()
}

/// 轮询直到条件成立，2 秒超时
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Synthesizer
// ============================================================================

#[derive(Default)]
pub struct FakeSynthesizer {
    calls: Mutex<Vec<(String, VoicePair)>>,
    delay: Duration,
    failing: Mutex<HashSet<String>>,
    empty: AtomicBool,
    omit_duration: AtomicBool,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn return_empty(&self, empty: bool) {
        self.empty.store(empty, Ordering::SeqCst);
    }

    pub fn omit_duration(&self, omit: bool) {
        self.omit_duration.store(omit, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == text)
            .count()
    }

    pub fn last_voices(&self) -> Option<VoicePair> {
        self.calls.lock().unwrap().last().map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl SpeechSynthesizerPort for FakeSynthesizer {
    async fn synthesize(&self, request: SynthesisRequest) -> Result<SynthesisResponse, TtsError> {
        self.calls
            .lock()
            .unwrap()
            .push((request.text.clone(), request.voices.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.lock().unwrap().contains(&request.text) {
            return Err(TtsError::ServiceError("upstream unavailable".to_string()));
        }

        let audio_data = if self.empty.load(Ordering::SeqCst) {
            Vec::new()
        } else {
            request.text.as_bytes().to_vec()
        };
        let duration_ms = if self.omit_duration.load(Ordering::SeqCst) {
            None
        } else {
            Some(request.text.chars().count() as u64 * 50)
        };

        Ok(SynthesisResponse {
            audio_data,
            duration_ms,
            sample_rate: Some(24_000),
        })
    }
}

// ============================================================================
// Storage
// ============================================================================

/// 只记录路径的内存存储
#[derive(Default)]
pub struct MemoryStorage {
    live: Mutex<HashSet<PathBuf>>,
    next: AtomicU64,
    release_all_calls: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_file(&self, index: usize) -> PathBuf {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let path = PathBuf::from(format!("mem/{}-{}.wav", index, n));
        self.live.lock().unwrap().insert(path.clone());
        path
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub fn release_all_count(&self) -> u64 {
        self.release_all_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioStoragePort for MemoryStorage {
    async fn write_audio(&self, index: usize, _data: &[u8]) -> Result<PathBuf, AudioStorageError> {
        Ok(self.insert_file(index))
    }

    async fn release(&self, path: &Path) -> Result<(), AudioStorageError> {
        self.live.lock().unwrap().remove(path);
        Ok(())
    }

    async fn release_all(&self) -> Result<u64, AudioStorageError> {
        self.release_all_calls.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock().unwrap();
        let count = live.len() as u64;
        live.clear();
        Ok(count)
    }

    async fn stats(&self) -> Result<StorageStats, AudioStorageError> {
        Ok(StorageStats {
            used_bytes: 0,
            file_count: self.live_count() as u64,
        })
    }
}

// ============================================================================
// Archive
// ============================================================================

/// 内存归档：条目直接指向源文件
#[derive(Default)]
pub struct MemoryArchive {
    entries: Mutex<HashMap<(String, usize), ArchiveEntry>>,
    fail_saves: AtomicBool,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioArchivePort for MemoryArchive {
    async fn save(
        &self,
        content_id: &ContentId,
        index: usize,
        source: &Path,
        metadata: ArchiveMetadata,
    ) -> Result<PathBuf, ArchiveError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ArchiveError::IoError("disk full".to_string()));
        }
        let entry = ArchiveEntry {
            content_id: content_id.clone(),
            index,
            path: source.to_path_buf(),
            metadata,
            size_bytes: 0,
            stored_at: Utc::now(),
        };
        self.entries
            .lock()
            .unwrap()
            .insert((content_id.as_str().to_string(), index), entry);
        Ok(source.to_path_buf())
    }

    async fn read(
        &self,
        content_id: &ContentId,
        index: usize,
    ) -> Result<Option<ArchiveEntry>, ArchiveError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&(content_id.as_str().to_string(), index))
            .cloned())
    }

    async fn remove(&self, content_id: &ContentId, index: usize) -> Result<(), ArchiveError> {
        self.entries
            .lock()
            .unwrap()
            .remove(&(content_id.as_str().to_string(), index));
        Ok(())
    }

    async fn list(&self, content_id: &ContentId) -> Result<Vec<usize>, ArchiveError> {
        let mut indices: Vec<usize> = self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == content_id.as_str())
            .map(|(_, i)| *i)
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    async fn stats(&self) -> ArchiveStats {
        ArchiveStats {
            total_entries: self.entries.lock().unwrap().len(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Playback engine
// ============================================================================

#[derive(Default)]
pub struct EngineFlags {
    pub fail_load: AtomicBool,
    pub reject_pitch: AtomicBool,
    pub reject_rate: AtomicBool,
    /// play() 返回前的等待时间（毫秒）
    pub play_delay_ms: AtomicU64,
}

/// 单个已加载音频的调用记录
#[derive(Default)]
pub struct SoundLog {
    calls: Mutex<Vec<String>>,
    unloaded: AtomicBool,
}

impl SoundLog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }
}

struct ScriptedSound {
    log: Arc<SoundLog>,
    flags: Arc<EngineFlags>,
}

#[async_trait]
impl SoundPort for ScriptedSound {
    async fn play(&self) -> Result<(), EngineError> {
        self.log.calls.lock().unwrap().push("play".to_string());
        let delay = self.flags.play_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.log.calls.lock().unwrap().push("pause".to_string());
        Ok(())
    }

    async fn set_rate(&self, rate: f32, preserve_pitch: bool) -> Result<(), EngineError> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push(format!("set_rate({}, {})", rate, preserve_pitch));
        if self.flags.reject_rate.load(Ordering::SeqCst)
            || (preserve_pitch && self.flags.reject_pitch.load(Ordering::SeqCst))
        {
            return Err(EngineError::Unsupported("rate".to_string()));
        }
        Ok(())
    }

    async fn unload(&self) -> Result<(), EngineError> {
        self.log.unloaded.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// 由测试推送进度的播放引擎
#[derive(Default)]
pub struct ScriptedEngine {
    pub flags: Arc<EngineFlags>,
    loads: Mutex<Vec<AudioHandle>>,
    senders: Mutex<Vec<mpsc::Sender<PlaybackStatus>>>,
    sounds: Mutex<Vec<Arc<SoundLog>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    pub fn sound(&self, load: usize) -> Arc<SoundLog> {
        Arc::clone(&self.sounds.lock().unwrap()[load])
    }

    /// 向第 load 次加载的音频推送进度
    pub async fn push(&self, load: usize, status: PlaybackStatus) {
        let sender = self.senders.lock().unwrap()[load].clone();
        // 接收端已关闭说明音频已卸载
        let _ = sender.send(status).await;
    }

    pub async fn push_near_end(&self, load: usize) {
        self.push(
            load,
            PlaybackStatus {
                is_playing: true,
                position_ms: 9_990,
                duration_ms: Some(10_000),
                did_just_finish: false,
            },
        )
        .await;
    }

    pub async fn push_playing(&self, load: usize) {
        self.push(
            load,
            PlaybackStatus {
                is_playing: true,
                position_ms: 100,
                duration_ms: Some(10_000),
                did_just_finish: false,
            },
        )
        .await;
    }
}

#[async_trait]
impl PlaybackEnginePort for ScriptedEngine {
    async fn load(&self, handle: &AudioHandle) -> Result<LoadedSound, EngineError> {
        if self.flags.fail_load.load(Ordering::SeqCst) {
            return Err(EngineError::LoadFailed("corrupt stream".to_string()));
        }

        let (tx, rx) = mpsc::channel(16);
        let log = Arc::new(SoundLog::default());
        self.loads.lock().unwrap().push(handle.clone());
        self.senders.lock().unwrap().push(tx);
        self.sounds.lock().unwrap().push(Arc::clone(&log));

        Ok(LoadedSound {
            sound: Box::new(ScriptedSound {
                log,
                flags: Arc::clone(&self.flags),
            }),
            status: rx,
            duration_ms: Some(10_000),
        })
    }
}
