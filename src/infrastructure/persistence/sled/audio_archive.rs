//! Sled-based Audio Archive Implementation
//!
//! sled 保存索引（bincode），音频文件保存在 {dir}/audio/{content}/{index}.wav，
//! 超过容量上限时按最近访问时间淘汰

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{
    text_hash, ArchiveEntry, ArchiveError, ArchiveMetadata, ArchiveStats, AudioArchivePort,
};
use crate::domain::{ContentId, VoicePair};

const KEY_PREFIX: &str = "archive:";

/// Sled 归档配置
#[derive(Debug, Clone)]
pub struct SledArchiveConfig {
    /// 归档根目录
    pub dir: PathBuf,
    /// 最大归档大小（字节）
    pub max_size_bytes: u64,
}

impl Default for SledArchiveConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/archive"),
            max_size_bytes: 2 * 1024 * 1024 * 1024, // 2GB
        }
    }
}

/// 内部归档条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalArchiveEntry {
    content_id: String,
    index: u64,
    path: String,
    text_hash: String,
    narrator_voice: String,
    dialogue_voice: String,
    duration_ms: Option<u64>,
    size_bytes: u64,
    stored_at: i64,
    last_accessed: i64,
}

impl InternalArchiveEntry {
    fn into_entry(self) -> Result<ArchiveEntry, ArchiveError> {
        let content_id = ContentId::new(self.content_id)
            .map_err(|e| ArchiveError::SerializationError(e.to_string()))?;
        Ok(ArchiveEntry {
            content_id,
            index: self.index as usize,
            path: PathBuf::from(self.path),
            metadata: ArchiveMetadata {
                text_hash: self.text_hash,
                voices: VoicePair::new(self.narrator_voice, self.dialogue_voice),
                duration_ms: self.duration_ms,
            },
            size_bytes: self.size_bytes,
            stored_at: Utc
                .timestamp_opt(self.stored_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}

/// Sled 音频归档
pub struct SledAudioArchive {
    db: Db,
    audio_dir: PathBuf,
    max_size_bytes: u64,
    current_size: AtomicU64,
}

impl SledAudioArchive {
    pub fn new(config: &SledArchiveConfig) -> Result<Self, ArchiveError> {
        let audio_dir = config.dir.join("audio");
        std::fs::create_dir_all(&audio_dir).map_err(|e| ArchiveError::IoError(e.to_string()))?;

        let db = sled::open(config.dir.join("index.sled"))
            .map_err(|e| ArchiveError::DatabaseError(e.to_string()))?;

        // 计算当前归档大小
        let current_size = Self::calculate_total_size(&db)?;

        tracing::info!(
            dir = %config.dir.display(),
            max_size_bytes = config.max_size_bytes,
            current_size = current_size,
            "SledAudioArchive initialized"
        );

        Ok(Self {
            db,
            audio_dir,
            max_size_bytes: config.max_size_bytes,
            current_size: AtomicU64::new(current_size),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn key(content_id: &ContentId, index: usize) -> String {
        // 定宽索引使 scan_prefix 按段落顺序返回
        format!("{}{}:{:010}", KEY_PREFIX, content_id, index)
    }

    fn content_prefix(content_id: &ContentId) -> String {
        format!("{}{}:", KEY_PREFIX, content_id)
    }

    /// 内容 ID 可能包含路径分隔符，目录名使用其哈希
    fn blob_path(&self, content_id: &ContentId, index: usize) -> PathBuf {
        self.audio_dir
            .join(text_hash(content_id.as_str()))
            .join(format!("{}.wav", index))
    }

    fn calculate_total_size(db: &Db) -> Result<u64, ArchiveError> {
        let mut total = 0u64;
        for item in db.scan_prefix(KEY_PREFIX) {
            let (_, value) = item.map_err(|e| ArchiveError::DatabaseError(e.to_string()))?;
            if let Ok(entry) = bincode::deserialize::<InternalArchiveEntry>(&value) {
                total += entry.size_bytes;
            }
        }
        Ok(total)
    }

    fn load_entry(&self, key: &str) -> Result<Option<InternalArchiveEntry>, ArchiveError> {
        match self.db.get(key) {
            Ok(Some(data)) => bincode::deserialize(&data)
                .map(Some)
                .map_err(|e| ArchiveError::SerializationError(e.to_string())),
            Ok(None) => Ok(None),
            Err(e) => Err(ArchiveError::DatabaseError(e.to_string())),
        }
    }

    fn store_entry(&self, key: &str, entry: &InternalArchiveEntry) -> Result<(), ArchiveError> {
        let bytes =
            bincode::serialize(entry).map_err(|e| ArchiveError::SerializationError(e.to_string()))?;
        self.db
            .insert(key, bytes)
            .map_err(|e| ArchiveError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// 删除索引条目和音频文件，返回释放的字节数
    async fn delete_entry(&self, key: &str) -> Result<u64, ArchiveError> {
        let Some(data) = self
            .db
            .remove(key)
            .map_err(|e| ArchiveError::DatabaseError(e.to_string()))?
        else {
            return Ok(0);
        };

        let entry: InternalArchiveEntry = bincode::deserialize(&data)
            .map_err(|e| ArchiveError::SerializationError(e.to_string()))?;
        match tokio::fs::remove_file(&entry.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %entry.path, error = %e, "Failed to delete archived audio")
            }
        }
        self.current_size.fetch_sub(entry.size_bytes, Ordering::Relaxed);
        Ok(entry.size_bytes)
    }

    /// LRU 淘汰一个条目（跳过 keep），没有可淘汰条目时返回 false
    async fn evict_lru(&self, keep: &str) -> Result<bool, ArchiveError> {
        let mut oldest: Option<(String, i64)> = None;

        for item in self.db.scan_prefix(KEY_PREFIX) {
            let (key, value) = item.map_err(|e| ArchiveError::DatabaseError(e.to_string()))?;
            if key.as_ref() == keep.as_bytes() {
                continue;
            }
            if let Ok(entry) = bincode::deserialize::<InternalArchiveEntry>(&value) {
                let is_older = oldest
                    .as_ref()
                    .map(|(_, accessed)| entry.last_accessed < *accessed)
                    .unwrap_or(true);
                if is_older {
                    let key_str = String::from_utf8(key.to_vec())
                        .map_err(|e| ArchiveError::SerializationError(e.to_string()))?;
                    oldest = Some((key_str, entry.last_accessed));
                }
            }
        }

        let Some((key, _)) = oldest else {
            return Ok(false);
        };
        let freed = self.delete_entry(&key).await?;
        tracing::debug!(key = %key, size_bytes = freed, "LRU evicted archive entry");
        Ok(true)
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), ArchiveError> {
        self.db
            .flush()
            .map_err(|e| ArchiveError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AudioArchivePort for SledAudioArchive {
    async fn save(
        &self,
        content_id: &ContentId,
        index: usize,
        source: &Path,
        metadata: ArchiveMetadata,
    ) -> Result<PathBuf, ArchiveError> {
        let key = Self::key(content_id, index);
        let target = self.blob_path(content_id, index);

        let previous = self.load_entry(&key)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::IoError(e.to_string()))?;
        }
        let size = tokio::fs::copy(source, &target)
            .await
            .map_err(|e| ArchiveError::IoError(e.to_string()))?;

        // 复制成功后才扣除被覆盖条目的大小
        if let Some(previous) = previous {
            self.current_size
                .fetch_sub(previous.size_bytes, Ordering::Relaxed);
        }

        // 淘汰以腾出空间
        while self.current_size.load(Ordering::Relaxed) + size > self.max_size_bytes {
            if !self.evict_lru(&key).await? {
                break;
            }
        }

        let now = Utc::now().timestamp();
        let entry = InternalArchiveEntry {
            content_id: content_id.as_str().to_string(),
            index: index as u64,
            path: target.to_string_lossy().to_string(),
            text_hash: metadata.text_hash,
            narrator_voice: metadata.voices.narrator.as_str().to_string(),
            dialogue_voice: metadata.voices.dialogue.as_str().to_string(),
            duration_ms: metadata.duration_ms,
            size_bytes: size,
            stored_at: now,
            last_accessed: now,
        };
        self.store_entry(&key, &entry)?;
        self.current_size.fetch_add(size, Ordering::Relaxed);

        tracing::debug!(
            content_id = %content_id,
            index = index,
            size_bytes = size,
            "Audio archived"
        );

        Ok(target)
    }

    async fn read(
        &self,
        content_id: &ContentId,
        index: usize,
    ) -> Result<Option<ArchiveEntry>, ArchiveError> {
        let key = Self::key(content_id, index);
        let Some(mut entry) = self.load_entry(&key)? else {
            return Ok(None);
        };

        // 文件丢失的条目直接删除
        if !tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
            tracing::warn!(
                key = %key,
                path = %entry.path,
                "Archived audio missing, dropping entry"
            );
            self.delete_entry(&key).await?;
            return Ok(None);
        }

        // 更新 last_accessed (LRU touch)
        entry.last_accessed = Utc::now().timestamp();
        self.store_entry(&key, &entry)?;

        entry.into_entry().map(Some)
    }

    async fn remove(&self, content_id: &ContentId, index: usize) -> Result<(), ArchiveError> {
        self.delete_entry(&Self::key(content_id, index)).await?;
        Ok(())
    }

    async fn list(&self, content_id: &ContentId) -> Result<Vec<usize>, ArchiveError> {
        let mut indices = Vec::new();
        for item in self.db.scan_prefix(Self::content_prefix(content_id)) {
            let (_, value) = item.map_err(|e| ArchiveError::DatabaseError(e.to_string()))?;
            let entry: InternalArchiveEntry = bincode::deserialize(&value)
                .map_err(|e| ArchiveError::SerializationError(e.to_string()))?;
            indices.push(entry.index as usize);
        }
        Ok(indices)
    }

    async fn stats(&self) -> ArchiveStats {
        ArchiveStats {
            total_entries: self.db.scan_prefix(KEY_PREFIX).count(),
            total_size_bytes: self.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn voices() -> VoicePair {
        VoicePair::new("narrator", "dialogue")
    }

    fn archive(dir: &TempDir, max_size_bytes: u64) -> SledAudioArchive {
        SledAudioArchive::new(&SledArchiveConfig {
            dir: dir.path().join("archive"),
            max_size_bytes,
        })
        .unwrap()
    }

    async fn source(dir: &TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, vec![7u8; bytes]).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_save_and_read() {
        let dir = tempdir().unwrap();
        let archive = archive(&dir, 1024 * 1024);
        let content = ContentId::new("book/chapter-1").unwrap();
        let src = source(&dir, "p3.wav", 100).await;

        let stored = archive
            .save(&content, 3, &src, ArchiveMetadata::new("text", voices(), Some(1200)))
            .await
            .unwrap();
        assert!(stored.exists());
        assert_ne!(stored, src);

        let entry = archive.read(&content, 3).await.unwrap().unwrap();
        assert_eq!(entry.path, stored);
        assert_eq!(entry.size_bytes, 100);
        assert_eq!(entry.metadata.duration_ms, Some(1200));
        assert!(entry.matches("text", &voices()));
        assert!(!entry.matches("other text", &voices()));

        assert!(archive.read(&content, 4).await.unwrap().is_none());

        let stats = archive.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_size_bytes, 100);
    }

    #[tokio::test]
    async fn test_list_is_ordered_per_content() {
        let dir = tempdir().unwrap();
        let archive = archive(&dir, 1024 * 1024);
        let a = ContentId::new("a").unwrap();
        let b = ContentId::new("b").unwrap();
        let src = source(&dir, "p.wav", 10).await;

        for index in [12, 2, 7] {
            archive
                .save(&a, index, &src, ArchiveMetadata::new("t", voices(), None))
                .await
                .unwrap();
        }
        archive
            .save(&b, 1, &src, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();

        assert_eq!(archive.list(&a).await.unwrap(), vec![2, 7, 12]);
        assert_eq!(archive.list(&b).await.unwrap(), vec![1]);

        archive.remove(&a, 7).await.unwrap();
        assert_eq!(archive.list(&a).await.unwrap(), vec![2, 12]);
        assert_eq!(archive.stats().await.total_size_bytes, 30);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_size() {
        let dir = tempdir().unwrap();
        let archive = archive(&dir, 1024 * 1024);
        let content = ContentId::new("c").unwrap();

        let small = source(&dir, "small.wav", 10).await;
        let large = source(&dir, "large.wav", 50).await;
        archive
            .save(&content, 0, &small, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();
        archive
            .save(&content, 0, &large, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();

        assert_eq!(archive.stats().await.total_size_bytes, 50);
    }

    #[tokio::test]
    async fn test_failed_overwrite_keeps_size() {
        let dir = tempdir().unwrap();
        let archive = archive(&dir, 1024 * 1024);
        let content = ContentId::new("c").unwrap();

        let src = source(&dir, "p.wav", 40).await;
        archive
            .save(&content, 0, &src, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();

        let missing = dir.path().join("missing.wav");
        let result = archive
            .save(&content, 0, &missing, ArchiveMetadata::new("t", voices(), None))
            .await;
        assert!(matches!(result, Err(ArchiveError::IoError(_))));

        let stats = archive.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_size_bytes, 40);
        assert_eq!(archive.read(&content, 0).await.unwrap().unwrap().size_bytes, 40);
    }

    #[tokio::test]
    async fn test_size_limit_evicts_least_recently_used() {
        let dir = tempdir().unwrap();
        let archive = archive(&dir, 250);
        let content = ContentId::new("c").unwrap();
        let src = source(&dir, "p.wav", 100).await;

        archive
            .save(&content, 0, &src, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();
        archive
            .save(&content, 1, &src, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();
        archive
            .save(&content, 2, &src, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();

        let stats = archive.stats().await;
        assert_eq!(stats.total_entries, 2);
        assert!(stats.total_size_bytes <= 250);
        assert_eq!(archive.list(&content).await.unwrap().len(), 2);
        assert!(archive.read(&content, 2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_blob_drops_entry() {
        let dir = tempdir().unwrap();
        let archive = archive(&dir, 1024 * 1024);
        let content = ContentId::new("c").unwrap();
        let src = source(&dir, "p.wav", 10).await;

        let stored = archive
            .save(&content, 0, &src, ArchiveMetadata::new("t", voices(), None))
            .await
            .unwrap();
        tokio::fs::remove_file(&stored).await.unwrap();

        assert!(archive.read(&content, 0).await.unwrap().is_none());
        assert!(archive.list(&content).await.unwrap().is_empty());
        assert_eq!(archive.stats().await.total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_reopen_keeps_entries() {
        let dir = tempdir().unwrap();
        let content = ContentId::new("c").unwrap();
        let src = source(&dir, "p.wav", 40).await;

        {
            let archive = archive(&dir, 1024);
            archive
                .save(&content, 5, &src, ArchiveMetadata::new("t", voices(), None))
                .await
                .unwrap();
            archive.flush().unwrap();
        }

        let reopened = archive(&dir, 1024);
        assert_eq!(reopened.stats().await.total_size_bytes, 40);
        assert!(reopened.read(&content, 5).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_archived_audio_survives_session() {
        use crate::application::narration::test_support::{paragraphs, wait_until, FakeSynthesizer};
        use crate::application::{AudioStoragePort, SynthesisCache, SynthesisCacheConfig};
        use crate::infrastructure::adapters::FileAudioStorage;

        let dir = tempdir().unwrap();
        let archive: Arc<SledAudioArchive> = archive(&dir, 1024 * 1024).arc();
        let content = ContentId::new("book").unwrap();
        let list = paragraphs(&["first paragraph"]);

        let first_synth = Arc::new(FakeSynthesizer::new());
        let storage: Arc<dyn AudioStoragePort> =
            Arc::new(FileAudioStorage::new(dir.path().join("scratch")).await.unwrap());
        let first = SynthesisCache::new(
            content.clone(),
            voices(),
            SynthesisCacheConfig::default(),
            first_synth.clone(),
            storage,
            Some(archive.clone() as Arc<dyn AudioArchivePort>),
        );
        first.get_audio(0, &list[0], &list).await.unwrap();
        wait_until(|| first.record(0).is_some_and(|r| r.is_durable)).await;
        first.teardown().await;
        assert_eq!(first_synth.call_count(), 1);

        // 新会话直接复用归档，不再合成
        let second_synth = Arc::new(FakeSynthesizer::new());
        let storage: Arc<dyn AudioStoragePort> =
            Arc::new(FileAudioStorage::new(dir.path().join("scratch")).await.unwrap());
        let second = SynthesisCache::new(
            content.clone(),
            voices(),
            SynthesisCacheConfig::default(),
            second_synth.clone(),
            storage,
            Some(archive.clone() as Arc<dyn AudioArchivePort>),
        );
        assert!(second.seed_from_archive(0, &list[0]).await);
        assert!(second.is_ready(0));
        let record = second.get_audio(0, &list[0], &list).await.unwrap();
        assert!(record.is_durable);
        assert_eq!(second_synth.call_count(), 0);
    }
}
