//! 推理引擎层：事件类型、引擎 trait 与各后端

pub mod claude_cli;
pub mod events;
pub mod mock;
pub mod traits;

pub use claude_cli::ClaudeCliEngine;
pub use events::{ContentBlock, EngineEvent, ToolResultContent};
pub use mock::ScriptedEngine;
pub use traits::{EventStream, ReasoningEngine};
