//! 引擎事件流的封闭类型
//!
//! 每次调用产出一个有序事件序列，以 SessionEnd 结束；处理方对其做穷尽 match。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 推理引擎产出的单个事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 推理过程（只进转录，永远不作为答案）
    Thinking { text: String },
    /// 叙述文本
    Text { text: String },
    /// 工具调用
    ToolCall {
        id: String,
        name: String,
        input: Value,
    },
    /// 工具结果
    ToolResult {
        tool_use_id: String,
        content: ToolResultContent,
        is_error: bool,
    },
    /// 会话结束：续接令牌、错误标志与消息、轮数
    SessionEnd {
        session_id: Option<String>,
        is_error: bool,
        message: Option<String>,
        num_turns: u32,
    },
}

/// 工具结果内容：纯文本或结构化块
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolResultContent {
    #[default]
    Empty,
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// 结构化内容块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: Option<String>,
        data: String,
    },
    Other {
        value: Value,
    },
}

impl ToolResultContent {
    /// 从引擎原始 JSON（字符串 / 块数组 / null）解析
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::Blocks(items.iter().map(ContentBlock::from_value).collect()),
            other => Self::Blocks(vec![ContentBlock::from_value(other)]),
        }
    }
}

impl ContentBlock {
    pub fn from_value(value: &Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some("text") => match value.get("text").and_then(Value::as_str) {
                Some(text) => Self::Text {
                    text: text.to_string(),
                },
                None => Self::Other {
                    value: value.clone(),
                },
            },
            Some("image") => {
                // Anthropic 形式 {source: {media_type, data}} 或 MCP 形式 {data, mimeType}
                let source = value.get("source").unwrap_or(value);
                let data = source.get("data").and_then(Value::as_str);
                let media_type = source
                    .get("media_type")
                    .or_else(|| source.get("mimeType"))
                    .and_then(Value::as_str)
                    .map(String::from);
                match data {
                    Some(data) => Self::Image {
                        media_type,
                        data: data.to_string(),
                    },
                    None => Self::Other {
                        value: value.clone(),
                    },
                }
            }
            _ => Self::Other {
                value: value.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_from_string_and_null() {
        assert_eq!(
            ToolResultContent::from_value(&json!("ok")),
            ToolResultContent::Text("ok".into())
        );
        assert_eq!(
            ToolResultContent::from_value(&Value::Null),
            ToolResultContent::Empty
        );
    }

    #[test]
    fn test_content_blocks_both_image_shapes() {
        let content = ToolResultContent::from_value(&json!([
            {"type": "text", "text": "Screenshot taken"},
            {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}},
            {"type": "image", "data": "BBBB", "mimeType": "image/jpeg"},
            {"type": "resource", "uri": "file:///x"}
        ]));
        let ToolResultContent::Blocks(blocks) = content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 4);
        assert_eq!(
            blocks[1],
            ContentBlock::Image {
                media_type: Some("image/png".into()),
                data: "AAAA".into()
            }
        );
        assert_eq!(
            blocks[2],
            ContentBlock::Image {
                media_type: Some("image/jpeg".into()),
                data: "BBBB".into()
            }
        );
        assert!(matches!(blocks[3], ContentBlock::Other { .. }));
    }
}
