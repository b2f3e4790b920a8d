//! 段落播放完成判定与自动前进延迟

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::application::ports::PlaybackStatus;

/// 完成判定配置
///
/// 默认值针对每 250ms 左右上报一次进度的引擎，换引擎时需要重新校准
#[derive(Debug, Clone)]
pub struct CompletionPolicy {
    /// 1.0 倍速下的尾部容差（毫秒）
    pub base_threshold_ms: f64,
    /// 每增加 1 倍速增加的容差（毫秒）
    pub rate_threshold_ms: f64,
    /// 下一段未就绪时的等待时间（毫秒，1.0 倍速）
    pub advance_delay_ms: f64,
    /// 每增加 1 倍速减少的等待时间（毫秒）
    pub advance_delay_rate_ms: f64,
    /// 速率放大上限
    pub max_rate_factor: f32,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            base_threshold_ms: 30.0,
            rate_threshold_ms: 50.0,
            advance_delay_ms: 150.0,
            advance_delay_rate_ms: 100.0,
            max_rate_factor: 2.5,
        }
    }
}

impl CompletionPolicy {
    fn rate_excess(&self, rate: f32) -> f64 {
        (rate.min(self.max_rate_factor) as f64) - 1.0
    }

    /// 尾部容差：base + (min(rate, 2.5) - 1) × per_rate，不小于 0
    pub fn threshold_ms(&self, rate: f32) -> f64 {
        (self.base_threshold_ms + self.rate_excess(rate) * self.rate_threshold_ms).max(0.0)
    }

    /// 引擎报告刚结束，或位置已进入尾部容差
    pub fn is_complete(&self, status: &PlaybackStatus, rate: f32) -> bool {
        if status.did_just_finish {
            return true;
        }
        match status.duration_ms {
            Some(duration) if duration > 0 => {
                status.position_ms as f64 >= duration as f64 - self.threshold_ms(rate)
            }
            _ => false,
        }
    }

    /// 下一段未就绪时的等待时间，不小于 0
    pub fn advance_delay(&self, rate: f32) -> Duration {
        let ms = (self.advance_delay_ms - self.rate_excess(rate) * self.advance_delay_rate_ms)
            .max(0.0);
        Duration::from_millis(ms.round() as u64)
    }
}

/// 单次触发保护：每个已加载音频只触发一次完成逻辑
#[derive(Debug, Default)]
pub struct CompletionGuard(AtomicBool);

impl CompletionGuard {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// 首次调用返回 true，之后始终返回 false
    pub fn fire(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_fired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(position_ms: u64, duration_ms: u64) -> PlaybackStatus {
        PlaybackStatus {
            is_playing: true,
            position_ms,
            duration_ms: Some(duration_ms),
            did_just_finish: false,
        }
    }

    #[test]
    fn test_threshold_scales_with_rate() {
        let policy = CompletionPolicy::default();
        assert_eq!(policy.threshold_ms(1.0), 30.0);
        assert_eq!(policy.threshold_ms(2.0), 80.0);
        assert_eq!(policy.threshold_ms(4.0), 105.0);
        assert_eq!(policy.threshold_ms(0.25), 0.0);
    }

    #[test]
    fn test_near_end_counts_as_complete() {
        let policy = CompletionPolicy::default();
        assert!(!policy.is_complete(&status(9_960, 10_000), 1.0));
        assert!(policy.is_complete(&status(9_970, 10_000), 1.0));
        assert!(policy.is_complete(&status(9_930, 10_000), 2.0));
    }

    #[test]
    fn test_finish_flag_wins() {
        let policy = CompletionPolicy::default();
        let finished = PlaybackStatus {
            is_playing: false,
            position_ms: 0,
            duration_ms: None,
            did_just_finish: true,
        };
        assert!(policy.is_complete(&finished, 1.0));
    }

    #[test]
    fn test_unknown_duration_not_complete() {
        let policy = CompletionPolicy::default();
        let unknown = PlaybackStatus {
            is_playing: true,
            position_ms: 5_000,
            duration_ms: None,
            did_just_finish: false,
        };
        assert!(!policy.is_complete(&unknown, 1.0));
        assert!(!policy.is_complete(&status(0, 0), 1.0));
    }

    #[test]
    fn test_advance_delay_shrinks_with_rate() {
        let policy = CompletionPolicy::default();
        assert_eq!(policy.advance_delay(1.0), Duration::from_millis(150));
        assert_eq!(policy.advance_delay(1.5), Duration::from_millis(100));
        assert_eq!(policy.advance_delay(2.5), Duration::ZERO);
        assert_eq!(policy.advance_delay(0.5), Duration::from_millis(200));
    }

    #[test]
    fn test_guard_fires_once() {
        let guard = CompletionGuard::new();
        assert!(!guard.has_fired());
        assert!(guard.fire());
        assert!(!guard.fire());
        assert!(guard.has_fired());
    }
}
