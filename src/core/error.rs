//! Agent 错误类型与单轮结果分类
//!
//! AgentError 只覆盖「调用级异常」（引擎传输、配置、隔离上下文崩溃等），直接返回给外层驱动循环；
//! 媒体错误 / 用量错误属于可恢复的轮次结果，用 TurnClass 表示，由 RecoveryController 内部消化。

use thiserror::Error;

/// 调用级错误：next_action 以 Err 返回，外层循环视为当前步失败
#[derive(Error, Debug)]
pub enum AgentError {
    /// 任务已完成后仍调用 next_action
    #[error("Agent already completed task")]
    AlreadyCompleted,

    /// 引擎适配层失败（进程启动、流协议、传输中断）
    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Environment(String),

    /// 隔离执行上下文中的调用 panic
    #[error("Engine session panicked: {0}")]
    BridgePanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 单轮引擎调用结果的分类（见 recovery::classify）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnClass {
    /// 已收到完成标记
    Success,
    /// 图片处理失败：刷新环境、丢弃会话后重试（有上限）
    RecoverableMedia,
    /// 用量 / 容量类失败：保留会话、切换备用模型重试一次
    RecoverableUsage,
    /// 引擎正常结束但未完成任务，下一步继续
    Incomplete,
}
