//! Audio Storage Port - 会话临时音频文件
//!
//! 合成缓存通过该端口把音频写入本地文件，并在淘汰/拆除时释放

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 音频存储错误
#[derive(Debug, Error)]
pub enum AudioStorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// 存储统计
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    /// 已使用空间（字节）
    pub used_bytes: u64,
    /// 文件数量
    pub file_count: u64,
}

/// Audio Storage Port
#[async_trait]
pub trait AudioStoragePort: Send + Sync {
    /// 写入段落音频，返回文件路径（每次写入生成新文件）
    async fn write_audio(&self, index: usize, data: &[u8]) -> Result<PathBuf, AudioStorageError>;

    /// 释放单个音频文件，文件不存在视为成功
    async fn release(&self, path: &Path) -> Result<(), AudioStorageError>;

    /// 释放全部音频文件，返回删除数量
    async fn release_all(&self) -> Result<u64, AudioStorageError>;

    /// 获取存储统计
    async fn stats(&self) -> Result<StorageStats, AudioStorageError>;
}
