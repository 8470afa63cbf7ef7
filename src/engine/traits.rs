//! 推理引擎抽象
//!
//! 所有后端（Claude CLI / Scripted Mock）实现 ReasoningEngine：invoke(prompt, options) 返回有序事件流，
//! 以 SessionEnd 结束。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::AgentError;
use crate::engine::EngineEvent;
use crate::session::SessionOptions;

/// 单次调用的事件流
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EngineEvent, AgentError>> + Send>>;

/// 推理引擎 trait
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// 发起一次调用；启动失败返回 Err，流中途失败以 Err 项出现
    async fn invoke(&self, prompt: &str, options: &SessionOptions) -> Result<EventStream, AgentError>;
}
