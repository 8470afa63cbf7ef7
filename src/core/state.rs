//! 任务级状态：续接令牌、完成标志、最终答案、步数、媒体错误重试计数
//!
//! 只由 ArenaAgent 修改；外部通过只读快照查看。

use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AgentState {
    pub(crate) resume_token: Option<String>,
    pub(crate) completed: bool,
    pub(crate) final_answer: Option<String>,
    pub(crate) step: u32,
    pub(crate) media_retries: u32,
}

impl AgentState {
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn media_retries(&self) -> u32 {
        self.media_retries
    }

    /// 回到初始值（幂等）
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_is_idempotent() {
        let mut state = AgentState {
            resume_token: Some("sess".into()),
            completed: true,
            final_answer: Some("42".into()),
            step: 3,
            media_retries: 2,
        };
        state.reset();
        let once = state.clone();
        state.reset();
        assert_eq!(state, once);
        assert_eq!(once, AgentState::default());
        assert!(once.resume_token().is_none());
    }
}
