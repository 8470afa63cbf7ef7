//! Claude CLI 引擎适配
//!
//! 以 `--print --output-format stream-json --verbose` 启动 CLI 子进程，提示词写入 stdin，
//! 逐行解析 stdout 的 JSON 消息为 EngineEvent；stderr 转入 tracing。
//! 子进程设置 kill_on_drop，事件流被丢弃（隔离上下文拆除）时随之结束。

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use futures_util::stream;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::engine::{EngineEvent, EventStream, ReasoningEngine, ToolResultContent};
use crate::session::SessionOptions;

/// 通过本地 CLI 调用推理引擎
#[derive(Debug, Clone)]
pub struct ClaudeCliEngine {
    cli_path: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ClaudeCliEngine {
    pub fn new(cli_path: impl Into<PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
            working_dir: None,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.engine.cli_path)
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// 由 SessionOptions 生成命令行参数（提示词经 stdin 传入）
pub fn build_args(options: &SessionOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "--print",
        "--output-format",
        "stream-json",
        "--verbose",
        "--model",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(options.model.clone());
    args.push("--allowedTools".into());
    args.push(options.allowed_tools.join(","));
    args.push("--disallowedTools".into());
    args.push(options.disallowed_tools.join(","));
    args.push("--permission-mode".into());
    args.push(options.permission_mode.clone());
    if !options.setting_sources.is_empty() {
        args.push("--setting-sources".into());
        args.push(options.setting_sources.join(","));
    }
    if let Some(token) = &options.resume {
        args.push("--resume".into());
        args.push(token.clone());
    }
    if let Some(agents) = options.agents_json() {
        args.push("--agents".into());
        args.push(agents);
    }
    if let Some(path) = &options.mcp_config {
        args.push("--mcp-config".into());
        args.push(path.display().to_string());
    }
    args
}

#[async_trait]
impl ReasoningEngine for ClaudeCliEngine {
    async fn invoke(&self, prompt: &str, options: &SessionOptions) -> Result<EventStream, AgentError> {
        let mut cmd = Command::new(&self.cli_path);
        cmd.args(build_args(options))
            .envs(&options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::Engine(format!(
                "failed to spawn '{}': {}",
                self.cli_path.display(),
                e
            ))
        })?;
        tracing::debug!(model = %options.model, resumed = options.resume.is_some(), "engine process started");

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(stderr = %line, "engine stderr");
                }
            });
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Engine("engine stdout not captured".to_string()))?;

        let state = StreamState {
            lines: BufReader::new(stdout).lines(),
            child,
            pending: VecDeque::new(),
            max_line: options.max_buffer_size,
            saw_end: false,
            done: false,
        };
        Ok(Box::pin(stream::unfold(state, next_event)))
    }
}

struct StreamState {
    lines: Lines<BufReader<ChildStdout>>,
    child: Child,
    pending: VecDeque<EngineEvent>,
    max_line: usize,
    saw_end: bool,
    done: bool,
}

async fn next_event(
    mut st: StreamState,
) -> Option<(Result<EngineEvent, AgentError>, StreamState)> {
    loop {
        if let Some(event) = st.pending.pop_front() {
            return Some((Ok(event), st));
        }
        if st.done {
            return None;
        }
        match st.lines.next_line().await {
            Ok(Some(line)) => {
                if line.len() > st.max_line {
                    st.done = true;
                    let err = AgentError::Engine(format!(
                        "stream message of {} bytes exceeds buffer limit {}",
                        line.len(),
                        st.max_line
                    ));
                    return Some((Err(err), st));
                }
                match parse_stream_line(&line) {
                    Ok(events) => {
                        st.saw_end |= events
                            .iter()
                            .any(|e| matches!(e, EngineEvent::SessionEnd { .. }));
                        st.pending.extend(events);
                    }
                    Err(e) => tracing::debug!(error = %e, "skipping non-JSON engine output"),
                }
            }
            Ok(None) => {
                st.done = true;
                let status = st.child.wait().await;
                if let Some(err) = exit_error(status, st.saw_end) {
                    return Some((Err(err), st));
                }
            }
            Err(e) => {
                st.done = true;
                return Some((Err(AgentError::Engine(format!("engine stream read failed: {e}"))), st));
            }
        }
    }
}

fn exit_error(status: std::io::Result<ExitStatus>, saw_end: bool) -> Option<AgentError> {
    match status {
        Ok(s) if s.success() || saw_end => None,
        Ok(s) => Some(AgentError::Engine(format!("engine exited with {s}"))),
        Err(e) => Some(AgentError::Engine(format!("failed to wait for engine: {e}"))),
    }
}

/// 解析一行 stream-json 消息；未知类型返回空列表
pub fn parse_stream_line(line: &str) -> Result<Vec<EngineEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    let msg: Value = serde_json::from_str(line)?;
    let events = match msg.get("type").and_then(Value::as_str) {
        Some("assistant") => content_blocks(&msg)
            .iter()
            .filter_map(assistant_block)
            .collect(),
        Some("user") => content_blocks(&msg)
            .iter()
            .filter_map(user_block)
            .collect(),
        Some("result") => vec![EngineEvent::SessionEnd {
            session_id: msg
                .get("session_id")
                .and_then(Value::as_str)
                .map(String::from),
            is_error: msg.get("is_error").and_then(Value::as_bool).unwrap_or(false),
            message: msg
                .get("result")
                .or_else(|| msg.get("subtype"))
                .and_then(Value::as_str)
                .map(String::from),
            num_turns: msg
                .get("num_turns")
                .and_then(Value::as_u64)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(0),
        }],
        _ => Vec::new(),
    };
    Ok(events)
}

fn content_blocks(msg: &Value) -> &[Value] {
    msg.get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn str_field(block: &Value, key: &str) -> String {
    block
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn assistant_block(block: &Value) -> Option<EngineEvent> {
    match block.get("type").and_then(Value::as_str)? {
        "text" => Some(EngineEvent::Text {
            text: str_field(block, "text"),
        }),
        "thinking" => Some(EngineEvent::Thinking {
            text: str_field(block, "thinking"),
        }),
        "tool_use" => Some(EngineEvent::ToolCall {
            id: str_field(block, "id"),
            name: block
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            input: block.get("input").cloned().unwrap_or(Value::Null),
        }),
        _ => None,
    }
}

fn user_block(block: &Value) -> Option<EngineEvent> {
    if block.get("type").and_then(Value::as_str)? != "tool_result" {
        return None;
    }
    Some(EngineEvent::ToolResult {
        tool_use_id: str_field(block, "tool_use_id"),
        content: ToolResultContent::from_value(block.get("content").unwrap_or(&Value::Null)),
        is_error: block.get("is_error").and_then(Value::as_bool).unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ModelSelector, SessionOptionsFactory, SubagentDefinition};

    #[test]
    fn test_parse_assistant_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"thinking","thinking":"plan"},
            {"type":"text","text":"Taking a screenshot"},
            {"type":"tool_use","id":"toolu_1","name":"mcp__gbox-browser__screenshot","input":{"boxId":"b"}}
        ]}}"#
            .replace('\n', "");
        let events = parse_stream_line(&line).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], EngineEvent::Thinking { text: "plan".into() });
        assert!(matches!(&events[2], EngineEvent::ToolCall { name, input, .. }
            if name == "mcp__gbox-browser__screenshot" && input["boxId"] == "b"));
    }

    #[test]
    fn test_parse_tool_result_and_skip_prompt_echo() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","content":[{"type":"text","text":"TASK_COMPLETE:42"}],"is_error":false}]}}"#;
        let events = parse_stream_line(line).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], EngineEvent::ToolResult { tool_use_id, is_error: false, .. }
            if tool_use_id == "toolu_1"));

        let echo = r#"{"type":"user","message":{"content":"hello"}}"#;
        assert!(parse_stream_line(echo).unwrap().is_empty());
    }

    #[test]
    fn test_parse_result_message() {
        let line = r#"{"type":"result","subtype":"error_during_execution","is_error":true,"result":"API Error: 400 Could not process image","session_id":"sess-9","num_turns":7}"#;
        assert_eq!(
            parse_stream_line(line).unwrap(),
            vec![EngineEvent::SessionEnd {
                session_id: Some("sess-9".into()),
                is_error: true,
                message: Some("API Error: 400 Could not process image".into()),
                num_turns: 7,
            }]
        );

        let no_result = r#"{"type":"result","subtype":"error_max_turns","is_error":true,"session_id":"s"}"#;
        assert!(matches!(&parse_stream_line(no_result).unwrap()[0],
            EngineEvent::SessionEnd { message: Some(m), .. } if m == "error_max_turns"));
    }

    #[test]
    fn test_num_turns_saturates() {
        let line = r#"{"type":"result","is_error":false,"session_id":"s","num_turns":4294967296}"#;
        assert!(matches!(&parse_stream_line(line).unwrap()[0],
            EngineEvent::SessionEnd { num_turns, .. } if *num_turns == u32::MAX));
    }

    #[test]
    fn test_unknown_and_invalid_lines() {
        assert!(parse_stream_line(r#"{"type":"system","subtype":"init"}"#)
            .unwrap()
            .is_empty());
        assert!(parse_stream_line("").unwrap().is_empty());
        assert!(parse_stream_line("not json").is_err());
    }

    #[test]
    fn test_build_args() {
        let tools = vec!["screenshot".to_string()];
        let opts = SessionOptionsFactory::new("gbox-browser", &tools, "primary", "fallback")
            .with_agents(vec![SubagentDefinition {
                name: "wikipedia-researcher".into(),
                description: "d".into(),
                prompt: "p".into(),
                tools: vec![],
                model: "inherit".into(),
            }])
            .with_mcp_config("/tmp/mcp.json")
            .build(ModelSelector::Fallback, Some("sess-1"));
        let args = build_args(&opts);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();

        assert_eq!(args[pos("--model") + 1], "fallback");
        assert_eq!(args[pos("--resume") + 1], "sess-1");
        assert_eq!(
            args[pos("--allowedTools") + 1],
            "mcp__gbox-browser__screenshot,mcp__task-completion__complete_task,Task"
        );
        assert!(args[pos("--disallowedTools") + 1].contains("Write"));
        assert_eq!(args[pos("--mcp-config") + 1], "/tmp/mcp.json");
        assert!(args[pos("--agents") + 1].contains("wikipedia-researcher"));
        assert_eq!(args[pos("--output-format") + 1], "stream-json");
    }

    #[test]
    fn test_fresh_session_has_no_resume_flag() {
        let opts = SessionOptionsFactory::new("b", &[], "p", "f").build(ModelSelector::Primary, None);
        assert!(!build_args(&opts).contains(&"--resume".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let engine = ClaudeCliEngine::new("/nonexistent/claude-cli-binary");
        let opts = SessionOptionsFactory::new("b", &[], "p", "f").build(ModelSelector::Primary, None);
        assert!(matches!(
            engine.invoke("hi", &opts).await,
            Err(AgentError::Engine(_))
        ));
    }
}
