//! 轮次结果分类与恢复状态机
//!
//! classify 把 TurnOutcome 的标志映射为 TurnClass；RecoveryController 据此给出下一步决策：
//! 媒体错误在上限内换新会话重试（到达上限即 Exhausted），用量错误保留会话、换备用模型重试一次，
//! 完成则提交，未完成则留待下一步续接。状态机本身不做 I/O，也不持有会话令牌。

use serde::Serialize;

use crate::core::{TurnClass, TurnOutcome};

/// 媒体错误重试耗尽时的失败答案
pub const EXHAUSTED_ANSWER: &str = "ERROR: Could not process image after multiple retries";

/// 按标志分类；两个错误标志同时出现时媒体错误优先
pub fn classify(outcome: &TurnOutcome) -> TurnClass {
    if outcome.media_error {
        TurnClass::RecoverableMedia
    } else if outcome.usage_error {
        TurnClass::RecoverableUsage
    } else if outcome.completed {
        TurnClass::Success
    } else {
        TurnClass::Incomplete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryState {
    Normal,
    RecoveringMedia,
    RecoveringUsage,
    Exhausted,
}

/// 对单个轮次结果的处理决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryDecision {
    /// 刷新环境、丢弃续接令牌，用恢复提示词新开会话
    RetryFreshSession,
    /// 保留续接令牌，用备用模型重发同一提示词
    RetryWithFallback,
    /// 提交答案，任务完成
    Commit,
    /// 本步结束，下一步续接会话
    Continue,
    /// 媒体错误重试耗尽，以失败答案结束任务
    Exhaust,
}

impl RecoveryDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryFreshSession => "retry_fresh_session",
            Self::RetryWithFallback => "retry_with_fallback",
            Self::Commit => "commit",
            Self::Continue => "continue",
            Self::Exhaust => "exhaust",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryController {
    max_media_retries: u32,
    state: RecoveryState,
    /// 本步是否已做过备用模型重试
    usage_retried: bool,
}

impl RecoveryController {
    pub fn new(max_media_retries: u32) -> Self {
        Self {
            max_media_retries,
            state: RecoveryState::Normal,
            usage_retried: false,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn max_media_retries(&self) -> u32 {
        self.max_media_retries
    }

    /// 每次 next_action 开始时调用（Exhausted 保持到 reset）
    pub fn begin_step(&mut self) {
        self.usage_retried = false;
        if self.state != RecoveryState::Exhausted {
            self.state = RecoveryState::Normal;
        }
    }

    /// 新任务边界
    pub fn reset(&mut self) {
        self.usage_retried = false;
        self.state = RecoveryState::Normal;
    }

    /// media_retries_used 为本任务已消耗的媒体错误重试次数（由 AgentState 持有）
    pub fn decide(&mut self, outcome: &TurnOutcome, media_retries_used: u32) -> RecoveryDecision {
        let class = classify(outcome);

        // 备用模型重试的结果即为本步最终结果
        if self.usage_retried {
            self.state = RecoveryState::Normal;
            return match class {
                TurnClass::Success => RecoveryDecision::Commit,
                _ => RecoveryDecision::Continue,
            };
        }

        match class {
            TurnClass::RecoverableMedia if media_retries_used < self.max_media_retries => {
                self.state = RecoveryState::RecoveringMedia;
                RecoveryDecision::RetryFreshSession
            }
            TurnClass::RecoverableMedia => {
                self.state = RecoveryState::Exhausted;
                RecoveryDecision::Exhaust
            }
            TurnClass::RecoverableUsage => {
                self.state = RecoveryState::RecoveringUsage;
                self.usage_retried = true;
                RecoveryDecision::RetryWithFallback
            }
            TurnClass::Success => {
                self.state = RecoveryState::Normal;
                RecoveryDecision::Commit
            }
            TurnClass::Incomplete => {
                self.state = RecoveryState::Normal;
                RecoveryDecision::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(completed: bool, media: bool, usage: bool) -> TurnOutcome {
        TurnOutcome {
            completed,
            media_error: media,
            usage_error: usage,
            ..TurnOutcome::new("m")
        }
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(classify(&outcome(true, true, true)), TurnClass::RecoverableMedia);
        assert_eq!(classify(&outcome(true, false, true)), TurnClass::RecoverableUsage);
        assert_eq!(classify(&outcome(true, false, false)), TurnClass::Success);
        assert_eq!(classify(&outcome(false, false, false)), TurnClass::Incomplete);
    }

    #[test]
    fn test_media_retries_are_bounded() {
        let mut rc = RecoveryController::new(2);
        rc.begin_step();
        let media = outcome(false, true, false);
        assert_eq!(rc.decide(&media, 0), RecoveryDecision::RetryFreshSession);
        assert_eq!(rc.state(), RecoveryState::RecoveringMedia);
        assert_eq!(rc.decide(&media, 1), RecoveryDecision::RetryFreshSession);
        assert_eq!(rc.decide(&media, 2), RecoveryDecision::Exhaust);
        assert_eq!(rc.state(), RecoveryState::Exhausted);

        rc.begin_step();
        assert_eq!(rc.state(), RecoveryState::Exhausted);
        rc.reset();
        assert_eq!(rc.state(), RecoveryState::Normal);
    }

    #[test]
    fn test_zero_bound_exhausts_immediately() {
        let mut rc = RecoveryController::new(0);
        assert_eq!(rc.decide(&outcome(false, true, false), 0), RecoveryDecision::Exhaust);
    }

    #[test]
    fn test_usage_retry_happens_once_per_step() {
        let mut rc = RecoveryController::new(2);
        rc.begin_step();
        let usage = outcome(false, false, true);
        assert_eq!(rc.decide(&usage, 0), RecoveryDecision::RetryWithFallback);
        assert_eq!(rc.state(), RecoveryState::RecoveringUsage);
        // 第二次用量错误不再重试
        assert_eq!(rc.decide(&usage, 0), RecoveryDecision::Continue);
        assert_eq!(rc.state(), RecoveryState::Normal);

        rc.begin_step();
        assert_eq!(rc.decide(&usage, 0), RecoveryDecision::RetryWithFallback);
        assert_eq!(rc.decide(&outcome(true, false, false), 0), RecoveryDecision::Commit);
    }

    #[test]
    fn test_fallback_outcome_with_media_flag_continues() {
        let mut rc = RecoveryController::new(2);
        rc.begin_step();
        assert_eq!(
            rc.decide(&outcome(false, false, true), 0),
            RecoveryDecision::RetryWithFallback
        );
        assert_eq!(
            rc.decide(&outcome(false, true, false), 0),
            RecoveryDecision::Continue
        );
    }

    #[test]
    fn test_media_then_usage_then_success() {
        let mut rc = RecoveryController::new(2);
        rc.begin_step();
        assert_eq!(
            rc.decide(&outcome(false, true, false), 0),
            RecoveryDecision::RetryFreshSession
        );
        assert_eq!(
            rc.decide(&outcome(false, false, true), 1),
            RecoveryDecision::RetryWithFallback
        );
        assert_eq!(rc.decide(&outcome(true, false, false), 1), RecoveryDecision::Commit);
    }
}
