//! 会话过程事件：向注入的 sink 推送思考、工具调用、结果、恢复决策等结构化事件
//!
//! 各组件不依赖全局 logger 单例；调用方若需要可观测性，传入 mpsc 发送端即可（接收端关闭时静默丢弃）。

use serde::Serialize;
use tokio::sync::mpsc;

/// 事件接收端
pub type EventSink = mpsc::UnboundedSender<AgentEvent>;

/// 单个结构化事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 外层循环进入新一步
    StepStarted { step: u32 },
    /// 发起一次引擎调用
    TurnStarted {
        turn_id: String,
        model: String,
        resumed: bool,
    },
    Thinking { text: String },
    Text { text: String },
    /// 工具调用（参数预览 ≤500 字符；think_secs 为距上次结果的思考耗时）
    ToolCall {
        tool: String,
        args_preview: String,
        think_secs: f64,
    },
    /// 工具返回（预览 ≤1000 字符）
    ToolResult {
        preview: String,
        exec_secs: Option<f64>,
    },
    ToolError {
        preview: String,
        exec_secs: Option<f64>,
    },
    /// 收到完成标记
    Completed { answer: String },
    /// 会话结束事件
    SessionEnded {
        num_turns: u32,
        is_error: bool,
        message: Option<String>,
    },
    /// 恢复决策（RetryFreshSession / RetryWithFallback / Exhaust）
    Recovery { action: String, detail: String },
    /// 宿主环境刷新结果
    EnvironmentRefreshed { ok: bool, detail: Option<String> },
}

pub fn send_event(sink: Option<&EventSink>, event: AgentEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event);
    }
}
