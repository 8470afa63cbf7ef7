//! 脚本化引擎（用于测试，无需 CLI / 凭据）
//!
//! 按入队顺序为每次 invoke 回放一组事件，并记录每次调用的提示词、模型与续接令牌。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::core::AgentError;
use crate::engine::{EngineEvent, EventStream, ReasoningEngine};
use crate::session::{ModelSelector, SessionOptions};

/// 一次被记录的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub prompt: String,
    pub model: String,
    pub selector: ModelSelector,
    pub resume: Option<String>,
}

enum Script {
    Events(Vec<EngineEvent>),
    Failure(String),
}

/// 脚本化引擎：队列为空时返回 Engine 错误
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队一次调用要回放的事件
    pub fn push_turn(&self, events: Vec<EngineEvent>) -> &Self {
        if let Ok(mut q) = self.scripts.lock() {
            q.push_back(Script::Events(events));
        }
        self
    }

    /// 入队一次启动失败
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        if let Ok(mut q) = self.scripts.lock() {
            q.push_back(Script::Failure(message.into()));
        }
        self
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.scripts.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn invoke(&self, prompt: &str, options: &SessionOptions) -> Result<EventStream, AgentError> {
        if let Ok(mut v) = self.invocations.lock() {
            v.push(RecordedInvocation {
                prompt: prompt.to_string(),
                model: options.model.clone(),
                selector: options.selector,
                resume: options.resume.clone(),
            });
        }
        let script = self
            .scripts
            .lock()
            .map_err(|e| AgentError::Engine(e.to_string()))?
            .pop_front();
        match script {
            Some(Script::Events(events)) => Ok(Box::pin(stream::iter(
                events.into_iter().map(Ok::<_, AgentError>),
            ))),
            Some(Script::Failure(message)) => Err(AgentError::Engine(message)),
            None => Err(AgentError::Engine("no scripted turn left".to_string())),
        }
    }
}

/// 常用脚本片段
pub mod script {
    use serde_json::json;

    use crate::engine::{EngineEvent, ToolResultContent};

    pub fn text(text: &str) -> EngineEvent {
        EngineEvent::Text {
            text: text.to_string(),
        }
    }

    pub fn tool_call(name: &str, input: serde_json::Value) -> EngineEvent {
        EngineEvent::ToolCall {
            id: format!("toolu_{name}"),
            name: name.to_string(),
            input,
        }
    }

    pub fn tool_result(content: &str) -> EngineEvent {
        EngineEvent::ToolResult {
            tool_use_id: "toolu".to_string(),
            content: ToolResultContent::Text(content.to_string()),
            is_error: false,
        }
    }

    /// complete_task 调用及其结果
    pub fn complete(answer: &str) -> Vec<EngineEvent> {
        vec![
            tool_call(
                "mcp__task-completion__complete_task",
                json!({ "finalAnswer": answer }),
            ),
            tool_result(&format!("TASK_COMPLETE:{answer}")),
        ]
    }

    pub fn end_ok(session_id: &str) -> EngineEvent {
        EngineEvent::SessionEnd {
            session_id: Some(session_id.to_string()),
            is_error: false,
            message: None,
            num_turns: 1,
        }
    }

    pub fn end_error(session_id: Option<&str>, message: &str) -> EngineEvent {
        EngineEvent::SessionEnd {
            session_id: session_id.map(String::from),
            is_error: true,
            message: Some(message.to_string()),
            num_turns: 1,
        }
    }
}
