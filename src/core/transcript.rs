//! 会话转录与单轮结果
//!
//! Transcript 只追加、保持顺序；写入前统一做媒体脱敏，保证转录中永远不会保留原始 base64 图片。

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// 替换图片字节的固定占位符
pub const REDACTION_PLACEHOLDER: &str = "<image_bytes_removed>";

/// 转录条目（带标签的字符串）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Thinking(String),
    Text(String),
    /// 工具名 + 已脱敏的参数
    Tool { name: String, input: String },
    /// 工具结果（已截断）
    Result(String),
    Error(String),
    Complete(String),
}

impl TranscriptEntry {
    fn redacted(self) -> Self {
        match self {
            Self::Thinking(t) => Self::Thinking(redact_media(&t)),
            Self::Text(t) => Self::Text(redact_media(&t)),
            Self::Tool { name, input } => Self::Tool {
                name,
                input: redact_media(&input),
            },
            Self::Result(t) => Self::Result(redact_media(&t)),
            Self::Error(t) => Self::Error(redact_media(&t)),
            Self::Complete(t) => Self::Complete(redact_media(&t)),
        }
    }
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thinking(t) => write!(f, "[thinking] {t}"),
            Self::Text(t) => write!(f, "{t}"),
            Self::Tool { name, input } => write!(f, "[tool] {name}: {input}"),
            Self::Result(t) => write!(f, "[result] {t}"),
            Self::Error(t) => write!(f, "[error] {t}"),
            Self::Complete(t) => write!(f, "[complete] {t}"),
        }
    }
}

/// 有序、只追加的转录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry.redacted());
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// 每条渲染为一行文本（恢复提示词与 raw_prediction 使用）
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    pub fn render(&self) -> String {
        self.lines().join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 一次引擎调用的完整结果，由 EventStreamProcessor 产出、恢复逻辑消费
#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnOutcome {
    pub final_answer: Option<String>,
    pub transcript: Transcript,
    pub completed: bool,
    pub media_error: bool,
    pub usage_error: bool,
    /// 会话结束事件带回的续接令牌
    pub resume_token: Option<String>,
    pub num_turns: u32,
    /// 本次调用实际使用的模型
    pub model: String,
}

impl TurnOutcome {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

static MEDIA_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn media_patterns() -> &'static [(Regex, &'static str)] {
    MEDIA_PATTERNS.get_or_init(|| {
        [
            (
                r"'data': '[A-Za-z0-9+/=]{100,}'",
                "'data': '<image_bytes_removed>'",
            ),
            (
                r#""data":\s*"[A-Za-z0-9+/=]{100,}""#,
                r#""data": "<image_bytes_removed>""#,
            ),
            (
                r"data:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/=]{100,}",
                "data:image;base64,<image_bytes_removed>",
            ),
            // 裸 PNG / JPEG base64
            (r"iVBORw0KG[A-Za-z0-9+/=]{91,}", REDACTION_PLACEHOLDER),
            (r"/9j/[A-Za-z0-9+/=]{96,}", REDACTION_PLACEHOLDER),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// 将 ≥100 字符的 base64 图片载荷替换为占位符
pub fn redact_media(content: &str) -> String {
    let mut out = content.to_string();
    for (re, replacement) in media_patterns() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).into_owned();
        }
    }
    out
}

/// 按字符截断（不切断 UTF-8），超出时追加 "..."
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// 取前 max_chars 个字符，不加省略号
pub fn head_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_payload(len: usize) -> String {
        let mut s = String::from("iVBORw0KGgo");
        while s.len() < len {
            s.push('A');
        }
        s
    }

    #[test]
    fn test_redact_single_quoted_data() {
        let payload = png_payload(150);
        let content = format!("{{'type': 'image', 'data': '{payload}'}}");
        let redacted = redact_media(&content);
        assert!(!redacted.contains(&payload));
        assert!(redacted.contains(REDACTION_PLACEHOLDER));
    }

    #[test]
    fn test_redact_double_quoted_data() {
        let payload = "Q".repeat(120);
        let content = format!(r#"{{"type": "image", "data": "{payload}"}}"#);
        let redacted = redact_media(&content);
        assert!(!redacted.contains(&payload));
        assert!(redacted.contains(r#""data": "<image_bytes_removed>""#));
    }

    #[test]
    fn test_redact_data_uri() {
        let payload = "/9j/".to_string() + &"B".repeat(200);
        let content = format!("screenshot: data:image/jpeg;base64,{payload} done");
        let redacted = redact_media(&content);
        assert!(!redacted.contains(&payload));
        assert!(redacted.ends_with(" done"));
    }

    #[test]
    fn test_short_payload_untouched() {
        let content = "'data': 'abc123'";
        assert_eq!(redact_media(content), content);
    }

    #[test]
    fn test_push_redacts_every_entry_kind() {
        let payload = png_payload(300);
        let mut t = Transcript::new();
        t.push(TranscriptEntry::Result(format!("'data': '{payload}'")));
        t.push(TranscriptEntry::Error(payload.clone()));
        t.push(TranscriptEntry::Tool {
            name: "screenshot".into(),
            input: format!(r#"{{"data": "{payload}"}}"#),
        });
        assert_eq!(t.len(), 3);
        for line in t.lines() {
            assert!(!line.contains(&payload), "raw payload leaked: {line}");
        }
    }

    #[test]
    fn test_entry_rendering() {
        let mut t = Transcript::new();
        t.push(TranscriptEntry::Thinking("plan".into()));
        t.push(TranscriptEntry::Text("hello".into()));
        t.push(TranscriptEntry::Tool {
            name: "click".into(),
            input: r#"{"target":"Submit"}"#.into(),
        });
        t.push(TranscriptEntry::Complete("42".into()));
        assert_eq!(
            t.lines(),
            vec![
                "[thinking] plan".to_string(),
                "hello".to_string(),
                r#"[tool] click: {"target":"Submit"}"#.to_string(),
                "[complete] 42".to_string(),
            ]
        );
    }

    #[test]
    fn test_truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("你好世界", 2), "你好...");
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(head_chars("你好世界", 3), "你好世");
    }
}
