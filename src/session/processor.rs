//! 单次引擎调用的事件流处理
//!
//! 按顺序消费 EngineEvent，累积脱敏后的转录、记录工具耗时、识别完成标记，
//! 遇到 SessionEnd 即停止，最终产出唯一的 TurnOutcome。

use std::time::Instant;

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::core::transcript::{head_chars, redact_media, truncate_chars, REDACTION_PLACEHOLDER};
use crate::core::{AgentError, TranscriptEntry, TurnOutcome};
use crate::engine::{ContentBlock, EngineEvent, ToolResultContent};
use crate::session::events::{send_event, AgentEvent, EventSink};

/// 工具结果中的完成标记（与 task-completion 工具的输出前缀一致）
pub const COMPLETION_MARKER: &str = "TASK_COMPLETE:";

/// 会话结束消息中表示图片处理失败的片段
pub const MEDIA_ERROR_MARKER: &str = "Could not process image";

const ARGS_PREVIEW_CHARS: usize = 500;
const RESULT_LOG_CHARS: usize = 1000;
const RESULT_TRANSCRIPT_CHARS: usize = 200;
const ERROR_LOG_CHARS: usize = 500;
const SESSION_MESSAGE_CHARS: usize = 200;

/// 流处理器：一次调用对应一个实例，handle 返回 false 表示会话已结束
pub struct StreamProcessor<'a> {
    outcome: TurnOutcome,
    sink: Option<&'a EventSink>,
    last_mark: Instant,
    tool_started: Option<Instant>,
    ended: bool,
}

impl<'a> StreamProcessor<'a> {
    pub fn new(model: impl Into<String>, sink: Option<&'a EventSink>) -> Self {
        Self {
            outcome: TurnOutcome::new(model),
            sink,
            last_mark: Instant::now(),
            tool_started: None,
            ended: false,
        }
    }

    /// 处理单个事件；SessionEnd 之后的事件一律忽略
    pub fn handle(&mut self, event: EngineEvent) -> bool {
        if self.ended {
            return false;
        }
        match event {
            EngineEvent::Thinking { text } => {
                send_event(self.sink, AgentEvent::Thinking { text: text.clone() });
                self.outcome.transcript.push(TranscriptEntry::Thinking(text));
            }
            EngineEvent::Text { text } => {
                tracing::info!(text = %truncate_chars(&text, RESULT_LOG_CHARS), "engine text");
                send_event(self.sink, AgentEvent::Text { text: text.clone() });
                if !self.outcome.completed {
                    self.outcome.final_answer = Some(text.clone());
                }
                self.outcome.transcript.push(TranscriptEntry::Text(text));
            }
            EngineEvent::ToolCall { name, input, .. } => self.on_tool_call(name, &input),
            EngineEvent::ToolResult {
                content, is_error, ..
            } => self.on_tool_result(&content, is_error),
            EngineEvent::SessionEnd {
                session_id,
                is_error,
                message,
                num_turns,
            } => {
                self.on_session_end(session_id, is_error, message, num_turns);
                return false;
            }
        }
        true
    }

    fn on_tool_call(&mut self, name: String, input: &Value) {
        let now = Instant::now();
        let think_secs = now.duration_since(self.last_mark).as_secs_f64();
        self.tool_started = Some(now);

        let args = redact_media(&input.to_string());
        let args_preview = truncate_chars(&args, ARGS_PREVIEW_CHARS);
        tracing::info!(tool = %name, think_secs, args = %args_preview, "tool call");
        send_event(
            self.sink,
            AgentEvent::ToolCall {
                tool: name.clone(),
                args_preview: args_preview.clone(),
                think_secs,
            },
        );
        self.outcome.transcript.push(TranscriptEntry::Tool {
            name,
            input: head_chars(&args, ARGS_PREVIEW_CHARS).to_string(),
        });
    }

    fn on_tool_result(&mut self, content: &ToolResultContent, is_error: bool) {
        let now = Instant::now();
        let exec_secs = self
            .tool_started
            .take()
            .map(|start| now.duration_since(start).as_secs_f64());
        self.last_mark = now;

        let content = redact_media(&normalize_content(content));

        if let Some(answer) = extract_completion(&content) {
            tracing::info!(answer = %answer, "task complete");
            send_event(
                self.sink,
                AgentEvent::Completed {
                    answer: answer.clone(),
                },
            );
            self.outcome.transcript.push(TranscriptEntry::Complete(answer.clone()));
            self.outcome.final_answer = Some(answer);
            self.outcome.completed = true;
            return;
        }

        if is_error {
            let preview = truncate_chars(&content, ERROR_LOG_CHARS);
            tracing::error!(exec_secs = ?exec_secs, error = %preview, "tool error");
            send_event(self.sink, AgentEvent::ToolError { preview, exec_secs });
            self.outcome.transcript.push(TranscriptEntry::Error(content));
        } else {
            let preview = truncate_chars(&content, RESULT_LOG_CHARS);
            tracing::info!(exec_secs = ?exec_secs, result = %preview, "tool result");
            send_event(self.sink, AgentEvent::ToolResult { preview, exec_secs });
            self.outcome.transcript.push(TranscriptEntry::Result(
                head_chars(&content, RESULT_TRANSCRIPT_CHARS).to_string(),
            ));
        }
    }

    fn on_session_end(
        &mut self,
        session_id: Option<String>,
        is_error: bool,
        message: Option<String>,
        num_turns: u32,
    ) {
        self.ended = true;
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            self.outcome.resume_token = Some(id);
        }
        self.outcome.num_turns = num_turns;

        // 分类基于完整消息，截断只用于日志与事件
        let preview = message
            .as_deref()
            .map(|m| truncate_chars(m, SESSION_MESSAGE_CHARS));
        if is_error {
            let text = message.as_deref().unwrap_or("Unknown error");
            let shown = preview.as_deref().unwrap_or(text);
            if text.contains(MEDIA_ERROR_MARKER) {
                self.outcome.media_error = true;
                tracing::error!(message = %shown, "image processing error");
            } else {
                self.outcome.usage_error = true;
                tracing::error!(message = %shown, "session error");
            }
        }
        tracing::info!(num_turns, "session complete");
        send_event(
            self.sink,
            AgentEvent::SessionEnded {
                num_turns,
                is_error,
                message: preview,
            },
        );
    }

    /// 流结束（无论是否收到 SessionEnd）后取出结果
    pub fn finish(self) -> TurnOutcome {
        if !self.ended {
            tracing::warn!("event stream ended without session end");
        }
        self.outcome
    }
}

/// 消费整个事件流，返回本轮结果；流内的错误项立即中止并向上传播
pub async fn process_stream<S>(
    mut stream: S,
    model: &str,
    sink: Option<&EventSink>,
) -> Result<TurnOutcome, AgentError>
where
    S: Stream<Item = Result<EngineEvent, AgentError>> + Unpin,
{
    let mut processor = StreamProcessor::new(model, sink);
    while let Some(item) = stream.next().await {
        if !processor.handle(item?) {
            break;
        }
    }
    Ok(processor.finish())
}

/// 将工具结果统一为单个字符串：文本块取文本，图片块一律以占位符代替原始数据，其余为 JSON，空格连接
pub fn normalize_content(content: &ToolResultContent) -> String {
    match content {
        ToolResultContent::Empty => String::new(),
        ToolResultContent::Text(text) => text.clone(),
        ToolResultContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::Image { .. } => {
                    format!("{{'type': 'image', 'data': '{REDACTION_PLACEHOLDER}'}}")
                }
                ContentBlock::Other { value } => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// 提取完成标记之后的答案
///
/// 去掉首尾空白与结尾的 `}`；结尾的 `"` 仅在未转义引号数为奇数时视为残留并去掉；
/// 最后还原 `\'` `\"` `\\`。
pub fn extract_completion(content: &str) -> Option<String> {
    let (_, after) = content.split_once(COMPLETION_MARKER)?;
    let mut answer = after
        .trim()
        .trim_end_matches(|c: char| c == '}' || c.is_whitespace());
    if answer.ends_with('"') && unescaped_quotes(answer) % 2 == 1 {
        answer = &answer[..answer.len() - 1];
    }
    Some(unescape(answer.trim()))
}

fn unescaped_quotes(s: &str) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for c in s.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => count += 1,
            _ => escaped = false,
        }
    }
    count
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '\'' | '"' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
