//! File Storage - 会话临时音频文件
//!
//! 实现 AudioStoragePort trait，每个会话一个目录

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::application::ports::{AudioStorageError, AudioStoragePort, StorageStats};

/// 文件系统音频存储
pub struct FileAudioStorage {
    /// 本会话的目录：base_dir/{session_id}
    session_dir: PathBuf,
}

impl FileAudioStorage {
    /// 在 base_dir 下创建新的会话目录
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, AudioStorageError> {
        let session_dir = base_dir.as_ref().join(Uuid::new_v4().to_string());

        fs::create_dir_all(&session_dir)
            .await
            .map_err(|e| AudioStorageError::IoError(e.to_string()))?;

        tracing::debug!(dir = %session_dir.display(), "Scratch audio directory created");
        Ok(Self { session_dir })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }
}

#[async_trait]
impl AudioStoragePort for FileAudioStorage {
    async fn write_audio(&self, index: usize, data: &[u8]) -> Result<PathBuf, AudioStorageError> {
        // 目录可能已被 release_all 删除
        fs::create_dir_all(&self.session_dir)
            .await
            .map_err(|e| AudioStorageError::IoError(e.to_string()))?;

        // 同一段落重新合成时生成新文件，避免覆盖仍在播放的音频
        let audio_path = self
            .session_dir
            .join(format!("paragraph_{}_{}.wav", index, Uuid::new_v4().simple()));

        fs::write(&audio_path, data)
            .await
            .map_err(|e| AudioStorageError::IoError(e.to_string()))?;

        tracing::debug!(
            index = index,
            size = data.len(),
            path = %audio_path.display(),
            "Saved scratch audio"
        );

        Ok(audio_path)
    }

    async fn release(&self, path: &Path) -> Result<(), AudioStorageError> {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Released scratch audio");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AudioStorageError::IoError(e.to_string())),
        }
    }

    async fn release_all(&self) -> Result<u64, AudioStorageError> {
        if !self.session_dir.exists() {
            return Ok(0);
        }

        let mut deleted_count = 0u64;
        let mut entries = fs::read_dir(&self.session_dir)
            .await
            .map_err(|e| AudioStorageError::IoError(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AudioStorageError::IoError(e.to_string()))?
        {
            if entry.path().extension().map_or(false, |ext| ext == "wav") {
                fs::remove_file(entry.path())
                    .await
                    .map_err(|e| AudioStorageError::IoError(e.to_string()))?;
                deleted_count += 1;
            }
        }

        // 尝试删除空目录
        let _ = fs::remove_dir(&self.session_dir).await;

        tracing::info!(
            dir = %self.session_dir.display(),
            files = deleted_count,
            "Released session audio"
        );

        Ok(deleted_count)
    }

    async fn stats(&self) -> Result<StorageStats, AudioStorageError> {
        let mut stats = StorageStats::default();
        if !self.session_dir.exists() {
            return Ok(stats);
        }

        let mut entries = fs::read_dir(&self.session_dir)
            .await
            .map_err(|e| AudioStorageError::IoError(e.to_string()))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().extension().map_or(false, |ext| ext == "wav") {
                stats.file_count += 1;
                if let Ok(metadata) = entry.metadata().await {
                    stats.used_bytes += metadata.len();
                }
            }
        }

        Ok(stats)
    }
}
