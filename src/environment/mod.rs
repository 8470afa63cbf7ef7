//! 宿主环境（承载浏览器的沙箱）
//!
//! 只暴露一个尽力而为的「刷新可见页面」动作，仅在媒体错误恢复时调用；失败由调用方记录，不中断任务。

pub mod gbox;

use async_trait::async_trait;

use crate::core::AgentError;

pub use gbox::GboxEnvironment;

#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// 刷新浏览器当前页面
    async fn refresh(&self) -> Result<(), AgentError>;
}

/// 未配置宿主客户端时使用：刷新直接成功
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnvironment;

#[async_trait]
impl HostEnvironment for NoopEnvironment {
    async fn refresh(&self) -> Result<(), AgentError> {
        tracing::debug!("no host environment configured, skipping refresh");
        Ok(())
    }
}
