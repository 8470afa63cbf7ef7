//! Arena Agent - 面向 WebArena 类任务的浏览器智能体编排
//!
//! 模块划分：
//! - **agent**: ArenaAgent，对外层驱动循环暴露同步的 next_action / reset
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、转录、同步桥、恢复状态机与任务状态
//! - **session**: 提示词、会话配置、事件流处理、外层循环契约类型
//! - **engine**: 推理引擎抽象与后端（Claude CLI / 脚本化 Mock）
//! - **environment**: 宿主环境刷新（GBOX / Noop）
//! - **completion**: task-completion 工具服务器协议
//! - **observability**: tracing 初始化

pub mod agent;
pub mod completion;
pub mod config;
pub mod core;
pub mod engine;
pub mod environment;
pub mod observability;
pub mod session;

pub use agent::ArenaAgent;
pub use session::{Action, TaskMeta, TrajectoryStep};
