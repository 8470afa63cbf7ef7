//! 每次引擎调用的会话配置
//!
//! SessionOptionsFactory 根据（模型选择、续接令牌）构建不可变的 SessionOptions：
//! 显式工具白名单（从不使用通配符）、禁用的文件修改类工具、模型、续接令牌与环境参数。
//! 切换备用模型只改变 model，不影响白名单 / 黑名单。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::AppConfig;
use crate::session::subagents::resolve_subagents;

/// 任务完成工具在引擎侧的能力名（task-completion MCP 服务器的 complete_task）
pub const TASK_COMPLETION_TOOL: &str = "mcp__task-completion__complete_task";

/// 调用子智能体的能力名
pub const DELEGATE_TOOL: &str = "Task";

/// 禁止的文件修改类能力（保留 Bash / Read）
pub const DISALLOWED_TOOLS: &[&str] = &["Write", "Edit", "Glob", "NotebookEdit"];

/// 白名单只接受具体能力名：不含通配符，也不在黑名单中
fn is_allowable(tool: &str) -> bool {
    !tool.is_empty() && !tool.contains('*') && !DISALLOWED_TOOLS.contains(&tool)
}

/// 主模型 / 备用模型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSelector {
    Primary,
    Fallback,
}

/// 单次调用请求：提示词、模型选择、续接令牌；每次调用重新构建
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    pub selector: ModelSelector,
    pub resume: Option<String>,
}

impl TurnRequest {
    pub fn new(prompt: impl Into<String>, selector: ModelSelector, resume: Option<String>) -> Self {
        Self {
            prompt: prompt.into(),
            selector,
            resume,
        }
    }
}

/// 子智能体定义（序列化后传给引擎）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubagentDefinition {
    #[serde(skip)]
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub tools: Vec<String>,
    pub model: String,
}

/// 一次调用的完整配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub model: String,
    pub selector: ModelSelector,
    pub resume: Option<String>,
    /// 传给引擎进程的环境变量（凭据等）
    pub env: BTreeMap<String, String>,
    pub permission_mode: String,
    pub setting_sources: Vec<String>,
    pub max_buffer_size: usize,
    pub agents: Vec<SubagentDefinition>,
    pub mcp_config: Option<PathBuf>,
}

impl SessionOptions {
    /// 子智能体定义的 JSON（name -> 定义），无子智能体时为 None
    pub fn agents_json(&self) -> Option<String> {
        if self.agents.is_empty() {
            return None;
        }
        let map: BTreeMap<&str, &SubagentDefinition> =
            self.agents.iter().map(|a| (a.name.as_str(), a)).collect();
        serde_json::to_string(&map).ok()
    }
}

/// 环境参数：Bedrock 凭据从进程环境读取一次
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentProfile {
    vars: BTreeMap<String, String>,
}

impl EnvironmentProfile {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bedrock_from_env(default_region: &str) -> Self {
        let get = |k: &str| std::env::var(k).unwrap_or_default();
        let region = std::env::var("AWS_REGION").unwrap_or_else(|_| default_region.to_string());
        let mut vars = BTreeMap::new();
        vars.insert("CLAUDE_CODE_USE_BEDROCK".to_string(), "true".to_string());
        vars.insert("AWS_ACCESS_KEY_ID".to_string(), get("AWS_ACCESS_KEY_ID"));
        vars.insert("AWS_SECRET_ACCESS_KEY".to_string(), get("AWS_SECRET_ACCESS_KEY"));
        vars.insert("AWS_REGION".to_string(), region);
        Self { vars }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}

/// 构建 SessionOptions 的工厂（本身不可变，可跨调用复用）
#[derive(Debug, Clone)]
pub struct SessionOptionsFactory {
    allowed_tools: Vec<String>,
    primary_model: String,
    fallback_model: String,
    profile: EnvironmentProfile,
    permission_mode: String,
    setting_sources: Vec<String>,
    max_buffer_size: usize,
    agents: Vec<SubagentDefinition>,
    mcp_config: Option<PathBuf>,
}

impl SessionOptionsFactory {
    /// server_name 下的浏览器工具 + 任务完成工具 + 子智能体工具
    pub fn new(
        server_name: &str,
        browser_tools: &[String],
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        let mut allowed_tools: Vec<String> = browser_tools
            .iter()
            .map(|tool| format!("mcp__{server_name}__{tool}"))
            .collect();
        allowed_tools.push(TASK_COMPLETION_TOOL.to_string());
        allowed_tools.push(DELEGATE_TOOL.to_string());
        Self {
            allowed_tools,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            profile: EnvironmentProfile::empty(),
            permission_mode: "acceptEdits".to_string(),
            setting_sources: vec!["user".into(), "project".into(), "local".into()],
            max_buffer_size: 10 * 1024 * 1024,
            agents: Vec::new(),
            mcp_config: None,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let profile = if cfg.engine.use_bedrock {
            EnvironmentProfile::bedrock_from_env(&cfg.engine.aws_region)
        } else {
            EnvironmentProfile::empty()
        };
        let agents = resolve_subagents(
            &cfg.subagents,
            &cfg.browser.box_id,
            &cfg.browser.server_name,
        );
        let mut factory = Self::new(
            &cfg.browser.server_name,
            &cfg.browser.tools,
            cfg.engine.primary_model.clone(),
            cfg.engine.fallback_model().to_string(),
        )
        .with_profile(profile)
        .with_agents(agents);
        for extra in &cfg.engine.extra_allowed_tools {
            if !is_allowable(extra) {
                tracing::warn!(tool = %extra, "ignoring extra allowed tool");
                continue;
            }
            if !factory.allowed_tools.contains(extra) {
                factory.allowed_tools.push(extra.clone());
            }
        }
        factory.permission_mode = cfg.engine.permission_mode.clone();
        factory.setting_sources = cfg.engine.setting_sources.clone();
        factory.max_buffer_size = cfg.engine.max_buffer_size;
        factory.mcp_config = cfg.engine.mcp_config.clone();
        factory
    }

    pub fn with_profile(mut self, profile: EnvironmentProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_agents(mut self, agents: Vec<SubagentDefinition>) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_mcp_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.mcp_config = Some(path.into());
        self
    }

    pub fn model_for(&self, selector: ModelSelector) -> &str {
        match selector {
            ModelSelector::Primary => &self.primary_model,
            ModelSelector::Fallback => &self.fallback_model,
        }
    }

    pub fn build(&self, selector: ModelSelector, resume: Option<&str>) -> SessionOptions {
        SessionOptions {
            allowed_tools: self.allowed_tools.clone(),
            disallowed_tools: DISALLOWED_TOOLS.iter().map(|s| s.to_string()).collect(),
            model: self.model_for(selector).to_string(),
            selector,
            resume: resume.map(String::from),
            env: self.profile.vars().clone(),
            permission_mode: self.permission_mode.clone(),
            setting_sources: self.setting_sources.clone(),
            max_buffer_size: self.max_buffer_size,
            agents: self.agents.clone(),
            mcp_config: self.mcp_config.clone(),
        }
    }

    /// 按请求构建（TurnRequest -> SessionOptions）
    pub fn for_request(&self, request: &TurnRequest) -> SessionOptions {
        self.build(request.selector, request.resume.as_deref())
    }
}
