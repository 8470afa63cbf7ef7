//! 核心层：错误、转录、同步桥、恢复状态机与任务状态

pub mod bridge;
pub mod error;
pub mod recovery;
pub mod state;
pub mod transcript;

pub use bridge::SyncBridge;
pub use error::{AgentError, TurnClass};
pub use recovery::{classify, RecoveryController, RecoveryDecision, RecoveryState, EXHAUSTED_ANSWER};
pub use state::AgentState;
pub use transcript::{Transcript, TranscriptEntry, TurnOutcome, REDACTION_PLACEHOLDER};
