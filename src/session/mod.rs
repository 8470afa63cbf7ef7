//! 会话层：提示词、会话配置、事件流处理与外层循环契约类型

pub mod events;
pub mod options;
pub mod processor;
pub mod prompt;
pub mod subagents;
pub mod trajectory;

pub use events::{send_event, AgentEvent, EventSink};
pub use options::{
    EnvironmentProfile, ModelSelector, SessionOptions, SessionOptionsFactory, SubagentDefinition,
    TurnRequest,
};
pub use processor::{extract_completion, process_stream, StreamProcessor, COMPLETION_MARKER};
pub use prompt::{PromptContext, DEFAULT_TEMPLATE};
pub use subagents::{builtin_subagents, resolve_subagents};
pub use trajectory::{current_url, last_known_url, Action, StateInfo, TaskMeta, TrajectoryStep};
