//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARENA__*` 覆盖（双下划线表示嵌套，如 `ARENA__ENGINE__PRIMARY_MODEL=...`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub browser: BrowserSection,
    pub recovery: RecoverySection,
    pub gbox: GboxSection,
    pub prompts: PromptsSection,
    pub subagents: Vec<SubagentSection>,
    pub run: RunSection,
}

/// [engine] 段：模型、CLI 路径、Bedrock 凭据与会话参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub primary_model: String,
    /// 用量错误时切换的备用模型；未设置时与主模型相同
    pub fallback_model: Option<String>,
    pub cli_path: String,
    pub use_bedrock: bool,
    pub aws_region: String,
    pub permission_mode: String,
    pub setting_sources: Vec<String>,
    /// 单行流消息上限（截图较大，默认 10MB）
    pub max_buffer_size: usize,
    /// 传给引擎的 MCP 配置文件（task-completion 与浏览器工具服务器）
    pub mcp_config: Option<PathBuf>,
    pub extra_allowed_tools: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            primary_model: "us.anthropic.claude-sonnet-4-5-20250929-v1:0".to_string(),
            fallback_model: None,
            cli_path: "claude".to_string(),
            use_bedrock: true,
            aws_region: "us-west-2".to_string(),
            permission_mode: "acceptEdits".to_string(),
            setting_sources: vec!["user".into(), "project".into(), "local".into()],
            max_buffer_size: 10 * 1024 * 1024,
            mcp_config: None,
            extra_allowed_tools: Vec::new(),
        }
    }
}

impl EngineSection {
    pub fn fallback_model(&self) -> &str {
        self.fallback_model
            .as_deref()
            .unwrap_or(&self.primary_model)
    }
}

/// [browser] 段：沙箱中的浏览器 box 与其工具服务器
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub box_id: String,
    pub server_name: String,
    pub tools: Vec<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            box_id: String::new(),
            server_name: "gbox-browser".to_string(),
            tools: default_browser_tools(),
        }
    }
}

fn default_browser_tools() -> Vec<String> {
    [
        "screenshot",
        "click",
        "hover",
        "type",
        "scroll",
        "press_key",
        "wait",
        "list_tabs",
        "switch_tab",
        "close_tab",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [recovery] 段：媒体错误重试上限与刷新动作
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    pub max_media_retries: u32,
    pub refresh_keys: Vec<String>,
    pub refresh_settle_ms: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            max_media_retries: 2,
            refresh_keys: vec!["control".into(), "r".into()],
            refresh_settle_ms: 2000,
        }
    }
}

/// [gbox] 段：宿主环境 HTTP API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GboxSection {
    pub api_base: String,
    /// 未配置时读 GBOX_API_KEY
    pub api_key: Option<String>,
}

impl Default for GboxSection {
    fn default() -> Self {
        Self {
            api_base: "https://gbox.ai/api/v1".to_string(),
            api_key: None,
        }
    }
}

impl GboxSection {
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GBOX_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// [prompts] 段：自定义初始提示词模板（占位符 {intent} {url} {box_id}）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PromptsSection {
    pub system_template_path: Option<PathBuf>,
}

/// [[subagents]]：转交给引擎的子智能体定义
#[derive(Debug, Clone, Deserialize)]
pub struct SubagentSection {
    pub name: String,
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_subagent_model")]
    pub model: String,
}

fn default_subagent_model() -> String {
    "inherit".to_string()
}

/// [run] 段：驱动程序的外层循环
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub max_steps: u32,
    pub result_dir: Option<PathBuf>,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_steps: 30,
            result_dir: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 ARENA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ARENA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARENA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 读取初始提示词模板：配置了路径则读文件，否则返回 None（使用内置模板）
pub fn load_prompt_template(cfg: &AppConfig) -> std::io::Result<Option<String>> {
    match &cfg.prompts.system_template_path {
        Some(path) => std::fs::read_to_string(path).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.recovery.max_media_retries, 2);
        assert_eq!(cfg.browser.server_name, "gbox-browser");
        assert_eq!(cfg.browser.tools.len(), 10);
        assert_eq!(cfg.engine.fallback_model(), cfg.engine.primary_model);
        assert_eq!(cfg.run.max_steps, 30);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
primary_model = "sonnet-primary"
fallback_model = "sonnet-fallback"

[browser]
box_id = "box-123"

[recovery]
max_media_retries = 3

[[subagents]]
name = "wikipedia-researcher"
description = "Looks things up"
prompt = "You are a researcher"
tools = ["Bash"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.primary_model, "sonnet-primary");
        assert_eq!(cfg.engine.fallback_model(), "sonnet-fallback");
        assert_eq!(cfg.browser.box_id, "box-123");
        // 未写的字段保持默认
        assert_eq!(cfg.browser.server_name, "gbox-browser");
        assert_eq!(cfg.recovery.max_media_retries, 3);
        assert_eq!(cfg.subagents.len(), 1);
        assert_eq!(cfg.subagents[0].model, "inherit");
    }

    #[test]
    fn test_prompt_template_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Goal: {{intent}}").unwrap();
        let mut cfg = AppConfig::default();
        assert!(load_prompt_template(&cfg).unwrap().is_none());
        cfg.prompts.system_template_path = Some(file.path().to_path_buf());
        assert_eq!(load_prompt_template(&cfg).unwrap().as_deref(), Some("Goal: {intent}"));
    }
}
