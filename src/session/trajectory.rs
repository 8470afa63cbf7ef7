//! 外层驱动循环的契约类型：轨迹、任务元数据、动作

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 无法得知当前位置时使用的上下文标记
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// next_action 的返回：停止并给出答案，或空操作（下一步继续）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum Action {
    Stop {
        answer: String,
        /// 完整转录，供离线诊断
        raw_prediction: String,
    },
    /// 会话未完成，下一次调用续接同一会话
    Continue,
}

impl Action {
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Stop { answer, .. } => Some(answer),
            Self::Continue => None,
        }
    }
}

/// 环境状态的位置信息（url 之外的字段原样保留）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMeta {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 一次观察到的环境状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    #[serde(default)]
    pub observation: Value,
    #[serde(default)]
    pub info: Option<StateMeta>,
}

impl StateInfo {
    pub fn at_url(url: impl Into<String>) -> Self {
        Self {
            observation: Value::Null,
            info: Some(StateMeta {
                url: Some(url.into()),
                extra: Map::new(),
            }),
        }
    }
}

/// 轨迹元素：状态与动作交替出现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrajectoryStep {
    Action(Action),
    State(StateInfo),
}

/// 任务元数据（动作历史供恢复提示词使用）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    #[serde(default)]
    pub action_history: Vec<String>,
}

/// 从轨迹最后一条状态取当前 URL；为空或缺少位置信息时返回 "unknown"
pub fn current_url(trajectory: &[TrajectoryStep]) -> &str {
    match trajectory.last() {
        Some(TrajectoryStep::State(state)) => state
            .info
            .as_ref()
            .and_then(|info| info.url.as_deref())
            .unwrap_or(UNKNOWN_CONTEXT),
        _ => UNKNOWN_CONTEXT,
    }
}

/// 轨迹中最近一次带 URL 的状态；驱动程序用它为下一步状态补上位置
pub fn last_known_url(trajectory: &[TrajectoryStep]) -> Option<&str> {
    trajectory.iter().rev().find_map(|step| match step {
        TrajectoryStep::State(state) => state.info.as_ref().and_then(|info| info.url.as_deref()),
        TrajectoryStep::Action(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_url_variants() {
        assert_eq!(current_url(&[]), UNKNOWN_CONTEXT);
        assert_eq!(
            current_url(&[TrajectoryStep::State(StateInfo::default())]),
            UNKNOWN_CONTEXT
        );
        assert_eq!(
            current_url(&[TrajectoryStep::State(StateInfo::at_url("http://shop/item"))]),
            "http://shop/item"
        );
        assert_eq!(
            current_url(&[
                TrajectoryStep::State(StateInfo::at_url("http://shop/item")),
                TrajectoryStep::Action(Action::Continue),
            ]),
            UNKNOWN_CONTEXT
        );
    }

    #[test]
    fn test_last_known_url_skips_blank_states() {
        let trajectory = vec![
            TrajectoryStep::State(StateInfo::at_url("http://shop/start")),
            TrajectoryStep::Action(Action::Continue),
            TrajectoryStep::State(StateInfo::at_url("http://shop/cart")),
            TrajectoryStep::Action(Action::Continue),
            TrajectoryStep::State(StateInfo::default()),
        ];
        assert_eq!(last_known_url(&trajectory), Some("http://shop/cart"));
        assert_eq!(last_known_url(&[TrajectoryStep::State(StateInfo::default())]), None);
    }

    #[test]
    fn test_trajectory_deserializes_untagged() {
        let steps: Vec<TrajectoryStep> = serde_json::from_value(json!([
            {"observation": {"text": "page"}, "info": {"url": "http://a", "page": 1}},
            {"action_type": "continue"},
            {"observation": "x"}
        ]))
        .unwrap();
        assert!(matches!(steps[0], TrajectoryStep::State(_)));
        assert_eq!(steps[1], TrajectoryStep::Action(Action::Continue));
        assert_eq!(current_url(&steps), UNKNOWN_CONTEXT);
        assert_eq!(current_url(&steps[..1]), "http://a");
    }

    #[test]
    fn test_action_serialization() {
        let stop = Action::Stop {
            answer: "19.99".into(),
            raw_prediction: "[complete] 19.99".into(),
        };
        let v = serde_json::to_value(&stop).unwrap();
        assert_eq!(v["action_type"], "stop");
        assert_eq!(v["answer"], "19.99");
        assert_eq!(stop.answer(), Some("19.99"));
        assert!(!Action::Continue.is_stop());
    }
}
