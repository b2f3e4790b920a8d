//! 预取与淘汰窗口策略
//!
//! 纯计算，不涉及 IO；由 SynthesisCache 在每次合成成功后调用

use std::ops::RangeInclusive;

/// 预取策略配置
#[derive(Debug, Clone)]
pub struct PrefetchPolicy {
    /// 累计字符数达到该阈值后停止扩展窗口
    pub char_threshold: usize,
    /// 1.0 倍速下的最大预取段数
    pub base_distance: usize,
    /// 速率放大上限
    pub max_rate_factor: f32,
    /// 淘汰时当前段之前保留的段数
    pub retain_behind: usize,
}

impl Default for PrefetchPolicy {
    fn default() -> Self {
        Self {
            char_threshold: 1000,
            base_distance: 8,
            max_rate_factor: 2.5,
            retain_behind: 3,
        }
    }
}

impl PrefetchPolicy {
    /// 最大预取距离：floor(base × min(rate, max_rate_factor))，至少为 1
    pub fn max_distance(&self, rate: f32) -> usize {
        let factor = rate.min(self.max_rate_factor).max(0.0);
        let distance = (self.base_distance as f32 * factor).floor() as usize;
        distance.max(1)
    }

    /// 计算从 `from` 开始的预取窗口（不含 from 本身）
    ///
    /// 累计字符数从 `from` 段开始计算；越过阈值的那一段包含在窗口内。
    /// 返回的索引升序排列，首个元素总是 from + 1（若存在）
    pub fn window(&self, from: usize, char_counts: &[usize], rate: f32) -> Vec<usize> {
        let max_distance = self.max_distance(rate);
        let mut total = char_counts.get(from).copied().unwrap_or(0);
        let mut window = Vec::new();

        for index in (from + 1)..char_counts.len() {
            if index - from > max_distance {
                break;
            }
            window.push(index);
            total += char_counts[index];
            if total >= self.char_threshold {
                break;
            }
        }

        window
    }

    /// 淘汰时的保留范围 [current - retain_behind, current + max_distance]
    pub fn retention(&self, current: usize, rate: f32) -> RangeInclusive<usize> {
        current.saturating_sub(self.retain_behind)..=current.saturating_add(self.max_distance(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_budget_stops_window() {
        let policy = PrefetchPolicy::default();
        let counts = vec![400, 400, 400, 400];

        // 400 + 400 = 800, + 400 = 1200 ≥ 1000
        assert_eq!(policy.window(0, &counts, 1.0), vec![1, 2]);
    }

    #[test]
    fn test_next_index_always_included() {
        let policy = PrefetchPolicy::default();
        let counts = vec![5000, 10, 10];
        assert_eq!(policy.window(0, &counts, 1.0), vec![1]);
    }

    #[test]
    fn test_speed_adaptive_distance() {
        let policy = PrefetchPolicy {
            base_distance: 8,
            ..Default::default()
        };
        assert_eq!(policy.max_distance(1.0), 8);
        assert_eq!(policy.max_distance(2.0), 16);
        assert_eq!(policy.max_distance(4.0), 20);
        assert_eq!(policy.max_distance(0.5), 4);
        assert_eq!(policy.max_distance(0.0), 1);
    }

    #[test]
    fn test_distance_caps_window() {
        let policy = PrefetchPolicy {
            char_threshold: usize::MAX,
            base_distance: 8,
            ..Default::default()
        };
        let counts = vec![1; 100];

        let window = policy.window(10, &counts, 2.0);
        assert_eq!(window.len(), 16);
        assert_eq!(window.first(), Some(&11));
        assert_eq!(window.last(), Some(&26));

        assert_eq!(policy.window(10, &counts, 1.0).len(), 8);
    }

    #[test]
    fn test_window_capped_by_remaining_paragraphs() {
        let policy = PrefetchPolicy {
            char_threshold: usize::MAX,
            ..Default::default()
        };
        let counts = vec![1; 5];
        assert_eq!(policy.window(2, &counts, 2.0), vec![3, 4]);
        assert!(policy.window(4, &counts, 2.0).is_empty());
    }

    #[test]
    fn test_retention_range() {
        let policy = PrefetchPolicy::default();
        let range = policy.retention(50, 1.0);
        assert_eq!(*range.start(), 47);
        assert_eq!(*range.end(), 58);

        let range = policy.retention(1, 1.0);
        assert_eq!(*range.start(), 0);
    }
}
