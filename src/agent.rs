//! 对外层驱动循环暴露同步的 next_action / reset
//!
//! 每次 next_action：根据步数构建初始或续接提示词，经 SyncBridge 在隔离上下文中跑完一次引擎调用，
//! 再交给 RecoveryController 决定提交、续接、换新会话重试（媒体错误）或换备用模型重试（用量错误）。
//! AgentState 只在这里被修改。

use std::sync::Arc;

use crate::config::{load_prompt_template, AppConfig};
use crate::core::{
    AgentError, AgentState, RecoveryController, RecoveryDecision, SyncBridge, TurnOutcome,
    EXHAUSTED_ANSWER,
};
use crate::engine::{ClaudeCliEngine, ReasoningEngine};
use crate::environment::{GboxEnvironment, HostEnvironment, NoopEnvironment};
use crate::session::prompt::{continuation_prompt, initial_prompt, recovery_prompt};
use crate::session::{
    current_url, process_stream, send_event, Action, AgentEvent, EventSink, ModelSelector,
    PromptContext, SessionOptionsFactory, TaskMeta, TrajectoryStep, TurnRequest, DEFAULT_TEMPLATE,
};

/// 完成但没有任何答案文本时的占位答案
pub const NO_ANSWER: &str = "No answer provided";

const DEFAULT_MAX_MEDIA_RETRIES: u32 = 2;

pub struct ArenaAgent {
    engine: Arc<dyn ReasoningEngine>,
    environment: Arc<dyn HostEnvironment>,
    options: SessionOptionsFactory,
    bridge: SyncBridge,
    recovery: RecoveryController,
    template: String,
    box_id: String,
    state: AgentState,
    event_tx: Option<EventSink>,
}

impl ArenaAgent {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        environment: Arc<dyn HostEnvironment>,
        options: SessionOptionsFactory,
        box_id: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            environment,
            options,
            bridge: SyncBridge::new(),
            recovery: RecoveryController::new(DEFAULT_MAX_MEDIA_RETRIES),
            template: DEFAULT_TEMPLATE.to_string(),
            box_id: box_id.into(),
            state: AgentState::default(),
            event_tx: None,
        }
    }

    /// 从配置构建：Claude CLI 引擎；配置了 GBOX key 与 box_id 时使用 GBOX 刷新，否则不刷新
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        if cfg.browser.box_id.is_empty() {
            return Err(AgentError::Config("browser.box_id is required".to_string()));
        }
        let engine: Arc<dyn ReasoningEngine> = Arc::new(ClaudeCliEngine::from_config(cfg));
        let environment: Arc<dyn HostEnvironment> = match GboxEnvironment::from_config(cfg) {
            Some(env) => Arc::new(env),
            None => {
                tracing::warn!("GBOX API key not configured, page refresh disabled");
                Arc::new(NoopEnvironment)
            }
        };
        let mut agent = Self::new(
            engine,
            environment,
            SessionOptionsFactory::from_config(cfg),
            cfg.browser.box_id.clone(),
        )
        .with_max_media_retries(cfg.recovery.max_media_retries);
        if let Some(template) = load_prompt_template(cfg)? {
            agent = agent.with_template(template);
        }
        Ok(agent)
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_max_media_retries(mut self, max: u32) -> Self {
        self.recovery = RecoveryController::new(max);
        self
    }

    /// 注入结构化事件接收端
    pub fn with_event_tx(mut self, tx: EventSink) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// 开始新任务前调用：清空续接令牌、完成标志、答案、步数与媒体错误计数
    pub fn reset(&mut self, task_ref: &str) {
        self.state.reset();
        self.recovery.reset();
        tracing::info!(task = %task_ref, "agent reset");
    }

    /// 产出下一步动作：Stop（带答案与完整转录）或 Continue
    pub fn next_action(
        &mut self,
        trajectory: &[TrajectoryStep],
        intent: &str,
        meta: &TaskMeta,
    ) -> Result<Action, AgentError> {
        if self.state.completed {
            return Err(AgentError::AlreadyCompleted);
        }
        self.state.step += 1;
        self.recovery.begin_step();
        let step = self.state.step;
        send_event(self.event_tx.as_ref(), AgentEvent::StepStarted { step });

        let ctx = PromptContext {
            intent,
            url: current_url(trajectory),
            box_id: &self.box_id,
            step,
        };
        let prompt = if step == 1 {
            initial_prompt(&self.template, &ctx)
        } else {
            continuation_prompt(&ctx)
        };
        let mut request = TurnRequest::new(
            prompt,
            ModelSelector::Primary,
            self.state.resume_token.clone(),
        );

        loop {
            let outcome = self.run_turn(&request)?;
            if let Some(token) = &outcome.resume_token {
                self.state.resume_token = Some(token.clone());
            }

            let decision = self.recovery.decide(&outcome, self.state.media_retries);
            match decision {
                RecoveryDecision::RetryFreshSession => {
                    self.state.media_retries += 1;
                    tracing::warn!(
                        attempt = self.state.media_retries,
                        max = self.recovery.max_media_retries(),
                        "image processing error, retrying in a fresh session"
                    );
                    self.emit_recovery(decision, format!(
                        "attempt {}/{}",
                        self.state.media_retries,
                        self.recovery.max_media_retries()
                    ));
                    self.refresh_environment();
                    self.state.resume_token = None;
                    let prompt =
                        recovery_prompt(&ctx, &outcome.transcript.lines(), &meta.action_history);
                    request = TurnRequest::new(prompt, ModelSelector::Primary, None);
                }
                RecoveryDecision::RetryWithFallback => {
                    tracing::warn!(step, "usage error, retrying with fallback model");
                    self.emit_recovery(decision, format!(
                        "model {}",
                        self.options.model_for(ModelSelector::Fallback)
                    ));
                    request = TurnRequest::new(
                        request.prompt,
                        ModelSelector::Fallback,
                        self.state.resume_token.clone(),
                    );
                }
                RecoveryDecision::Commit => return Ok(self.commit(outcome)),
                RecoveryDecision::Continue => {
                    tracing::warn!(step, "session incomplete, continuing next step");
                    return Ok(Action::Continue);
                }
                RecoveryDecision::Exhaust => {
                    tracing::error!(
                        max = self.recovery.max_media_retries(),
                        "max image error retries exceeded, giving up"
                    );
                    self.emit_recovery(decision, EXHAUSTED_ANSWER.to_string());
                    self.state.completed = true;
                    self.state.final_answer = Some(EXHAUSTED_ANSWER.to_string());
                    return Ok(Action::Stop {
                        answer: EXHAUSTED_ANSWER.to_string(),
                        raw_prediction: outcome.transcript.render(),
                    });
                }
            }
        }
    }

    fn commit(&mut self, outcome: TurnOutcome) -> Action {
        let answer = outcome
            .final_answer
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| NO_ANSWER.to_string());
        tracing::info!(answer = %answer, steps = self.state.step, "final answer");
        self.state.completed = true;
        self.state.final_answer = Some(answer.clone());
        Action::Stop {
            answer,
            raw_prediction: outcome.transcript.render(),
        }
    }

    /// 在隔离上下文中跑完一次引擎调用
    fn run_turn(&self, request: &TurnRequest) -> Result<TurnOutcome, AgentError> {
        let options = self.options.for_request(request);
        let turn_id = uuid::Uuid::new_v4().to_string();
        match &options.resume {
            Some(token) => tracing::info!(turn_id = %turn_id, session = %token, model = %options.model, "resuming session"),
            None => tracing::info!(turn_id = %turn_id, model = %options.model, "starting new session"),
        }
        send_event(
            self.event_tx.as_ref(),
            AgentEvent::TurnStarted {
                turn_id,
                model: options.model.clone(),
                resumed: options.resume.is_some(),
            },
        );

        let engine = Arc::clone(&self.engine);
        let sink = self.event_tx.clone();
        let prompt = request.prompt.as_str();
        self.bridge.run(move || async move {
            let stream = engine.invoke(prompt, &options).await?;
            process_stream(stream, &options.model, sink.as_ref()).await
        })
    }

    /// 尽力刷新宿主页面，失败只记录
    fn refresh_environment(&self) {
        let environment = Arc::clone(&self.environment);
        let result = self
            .bridge
            .run(move || async move { environment.refresh().await });
        let event = match result {
            Ok(()) => {
                tracing::info!("page refreshed");
                AgentEvent::EnvironmentRefreshed {
                    ok: true,
                    detail: None,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to refresh page");
                AgentEvent::EnvironmentRefreshed {
                    ok: false,
                    detail: Some(e.to_string()),
                }
            }
        };
        send_event(self.event_tx.as_ref(), event);
    }

    fn emit_recovery(&self, decision: RecoveryDecision, detail: String) {
        send_event(
            self.event_tx.as_ref(),
            AgentEvent::Recovery {
                action: decision.as_str().to_string(),
                detail,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::script;
    use crate::engine::ScriptedEngine;

    fn agent(engine: Arc<ScriptedEngine>) -> ArenaAgent {
        let tools = vec!["screenshot".to_string()];
        ArenaAgent::new(
            engine,
            Arc::new(NoopEnvironment),
            SessionOptionsFactory::new("gbox-browser", &tools, "primary", "fallback"),
            "box-1",
        )
    }

    #[test]
    fn test_engine_failure_propagates_as_error() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_failure("spawn failed");
        let mut agent = agent(engine);
        let err = agent.next_action(&[], "goal", &TaskMeta::default()).unwrap_err();
        assert!(matches!(err, AgentError::Engine(ref m) if m == "spawn failed"));
        assert!(!agent.state().is_completed());
        assert_eq!(agent.state().step(), 1);
    }

    #[test]
    fn test_completion_without_answer_text() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_turn(vec![script::tool_result("TASK_COMPLETE:"), script::end_ok("s")]);
        let mut agent = agent(engine);
        let action = agent.next_action(&[], "goal", &TaskMeta::default()).unwrap();
        assert_eq!(action.answer(), Some(NO_ANSWER));
    }

    #[test]
    fn test_custom_template_used_on_first_step() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_turn(vec![script::end_ok("s")]);
        let mut agent = agent(engine.clone()).with_template("Do {intent} in {box_id} at {url}");
        agent.next_action(&[], "the thing", &TaskMeta::default()).unwrap();
        assert_eq!(engine.invocations()[0].prompt, "Do the thing in box-1 at unknown");
    }

    #[test]
    fn test_from_config_requires_box_id() {
        let cfg = AppConfig::default();
        assert!(matches!(
            ArenaAgent::from_config(&cfg),
            Err(AgentError::Config(_))
        ));
    }
}
