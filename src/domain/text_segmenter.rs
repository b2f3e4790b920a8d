//! 段落切分器
//!
//! 将原始正文切分为朗读段落：每个非空行为一个段落，超长段落在句末标点处拆开

/// 默认段落最大字符数
/// 超过该长度的段落会在句末标点处拆分，避免单次合成过长
pub const DEFAULT_MAX_PARAGRAPH_CHARS: usize = 500;

/// 段落切分配置
#[derive(Debug, Clone)]
pub struct ParagraphConfig {
    pub max_chars: usize,
}

impl Default for ParagraphConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_PARAGRAPH_CHARS,
        }
    }
}

/// 检查是否为句末标点
#[inline]
fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '。' | '？' | '！' | '.' | '?' | '!' | '…')
}

/// 检查片段是否只包含引号或空白
#[inline]
fn is_trivial_segment(s: &str) -> bool {
    s.chars().all(|c| {
        matches!(
            c,
            '"' | '\u{201C}' | '\u{201D}' | '\'' | '\u{2018}' | '\u{2019}' | ' ' | '\t'
        )
    })
}

/// 在句末标点处拆分超长段落
fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 || paragraph.chars().count() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut char_count = 0;

    for ch in paragraph.chars() {
        current.push(ch);
        char_count += 1;

        if is_sentence_end(ch) && char_count >= max_chars / 2 {
            parts.push(std::mem::take(&mut current));
            char_count = 0;
        } else if char_count >= max_chars {
            // 没有合适的标点，硬切
            parts.push(std::mem::take(&mut current));
            char_count = 0;
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// 切分段落
///
/// 1. 按行切分（支持 \n 和 \r\n），忽略空行
/// 2. 只有引号的行合并到前一段
/// 3. 超长段落按 max_chars 拆分
pub fn split_paragraphs_with(text: &str, config: &ParagraphConfig) -> Vec<String> {
    let mut paragraphs: Vec<String> = Vec::new();

    for line in text.lines().map(str::trim).filter(|s| !s.is_empty()) {
        if is_trivial_segment(line) {
            if let Some(last) = paragraphs.last_mut() {
                last.push_str(line);
            }
            continue;
        }
        paragraphs.extend(split_long(line, config.max_chars));
    }

    paragraphs
}

/// 使用默认配置切分（便捷方法）
pub fn split_paragraphs(text: &str) -> Vec<String> {
    split_paragraphs_with(text, &ParagraphConfig::default())
}
