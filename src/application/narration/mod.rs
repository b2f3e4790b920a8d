//! Narration - 段落合成缓存与播放协调
//!
//! - synthesis_cache: single-flight 合成、预取、淘汰、归档镜像
//! - coordinator: 播放状态机与自动前进
//! - prefetch / completion: 纯策略计算

mod completion;
mod coordinator;
mod prefetch;
mod synthesis_cache;

#[cfg(test)]
pub(crate) mod test_support;

pub use completion::{CompletionGuard, CompletionPolicy};
pub use coordinator::{CoordinatorConfig, PlaybackCoordinator};
pub use prefetch::PrefetchPolicy;
pub use synthesis_cache::{CacheError, CacheStats, SynthesisCache, SynthesisCacheConfig};
