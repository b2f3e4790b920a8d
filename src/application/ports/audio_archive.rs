//! Audio Archive Port - 持久化音频归档
//!
//! 按 (content_id, paragraph_index) 持久保存合成结果，跨会话离线复用

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::{ContentId, VoicePair};

/// 归档错误
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// 归档元数据
#[derive(Debug, Clone)]
pub struct ArchiveMetadata {
    /// md5(段落文本)
    pub text_hash: String,
    pub voices: VoicePair,
    pub duration_ms: Option<u64>,
}

impl ArchiveMetadata {
    pub fn new(text: &str, voices: VoicePair, duration_ms: Option<u64>) -> Self {
        Self {
            text_hash: text_hash(text),
            voices,
            duration_ms,
        }
    }
}

/// 归档条目
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub content_id: ContentId,
    pub index: usize,
    pub path: PathBuf,
    pub metadata: ArchiveMetadata,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

impl ArchiveEntry {
    /// 条目是否可用于指定文本和音色
    pub fn matches(&self, text: &str, voices: &VoicePair) -> bool {
        self.metadata.text_hash == text_hash(text) && &self.metadata.voices == voices
    }
}

/// 归档统计
#[derive(Debug, Clone, Default)]
pub struct ArchiveStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
}

/// Audio Archive Port
///
/// save 为尽力而为：调用方吞掉错误，只记录日志
#[async_trait]
pub trait AudioArchivePort: Send + Sync {
    /// 复制音频到归档，返回归档路径
    async fn save(
        &self,
        content_id: &ContentId,
        index: usize,
        source: &Path,
        metadata: ArchiveMetadata,
    ) -> Result<PathBuf, ArchiveError>;

    /// 读取归档条目
    async fn read(
        &self,
        content_id: &ContentId,
        index: usize,
    ) -> Result<Option<ArchiveEntry>, ArchiveError>;

    /// 删除归档条目及其文件
    async fn remove(&self, content_id: &ContentId, index: usize) -> Result<(), ArchiveError>;

    /// 列出内容已归档的段落索引（升序）
    async fn list(&self, content_id: &ContentId) -> Result<Vec<usize>, ArchiveError>;

    async fn stats(&self) -> ArchiveStats;
}

/// 段落文本指纹
pub fn text_hash(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}
