//! GBOX 宿主环境：通过 HTTP API 在浏览器 box 上按键刷新页面
//!
//! POST {api_base}/boxes/{box_id}/actions/press-key，body `{"keys": ["control", "r"]}`，之后等待页面加载。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::environment::HostEnvironment;

#[derive(Debug, Serialize)]
struct PressKeyRequest<'a> {
    keys: &'a [String],
}

/// GBOX 浏览器 box
#[derive(Debug, Clone)]
pub struct GboxEnvironment {
    api_base: String,
    api_key: String,
    box_id: String,
    refresh_keys: Vec<String>,
    settle: Duration,
}

impl GboxEnvironment {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, box_id: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
            box_id: box_id.into(),
            refresh_keys: vec!["control".to_string(), "r".to_string()],
            settle: Duration::from_secs(2),
        }
    }

    /// 需要 box_id 与 API key；缺任一项返回 None（由调用方退回 NoopEnvironment）
    pub fn from_config(cfg: &AppConfig) -> Option<Self> {
        let api_key = cfg.gbox.api_key()?;
        if cfg.browser.box_id.is_empty() {
            return None;
        }
        Some(
            Self::new(cfg.gbox.api_base.clone(), api_key, cfg.browser.box_id.clone())
                .with_refresh(
                    cfg.recovery.refresh_keys.clone(),
                    Duration::from_millis(cfg.recovery.refresh_settle_ms),
                ),
        )
    }

    pub fn with_refresh(mut self, keys: Vec<String>, settle: Duration) -> Self {
        self.refresh_keys = keys;
        self.settle = settle;
        self
    }

    pub fn press_key_url(&self) -> String {
        format!(
            "{}/boxes/{}/actions/press-key",
            self.api_base.trim_end_matches('/'),
            self.box_id
        )
    }
}

#[async_trait]
impl HostEnvironment for GboxEnvironment {
    async fn refresh(&self) -> Result<(), AgentError> {
        tracing::info!(box_id = %self.box_id, keys = ?self.refresh_keys, "refreshing page");
        let client = reqwest::Client::new();
        let resp = client
            .post(self.press_key_url())
            .bearer_auth(&self.api_key)
            .json(&PressKeyRequest {
                keys: &self.refresh_keys,
            })
            .send()
            .await
            .map_err(|e| AgentError::Environment(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::Environment(format!(
                "press-key failed ({status}): {text}"
            )));
        }

        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_key_url() {
        let env = GboxEnvironment::new("https://gbox.ai/api/v1/", "key", "box-42");
        assert_eq!(
            env.press_key_url(),
            "https://gbox.ai/api/v1/boxes/box-42/actions/press-key"
        );
    }

    #[test]
    fn test_request_body() {
        let keys = vec!["control".to_string(), "r".to_string()];
        let body = serde_json::to_value(PressKeyRequest { keys: &keys }).unwrap();
        assert_eq!(body, serde_json::json!({"keys": ["control", "r"]}));
    }

    #[test]
    fn test_from_config_requires_box_and_key() {
        let mut cfg = AppConfig::default();
        cfg.gbox.api_key = Some("k".into());
        assert!(GboxEnvironment::from_config(&cfg).is_none());
        cfg.browser.box_id = "box-1".into();
        cfg.recovery.refresh_settle_ms = 10;
        let env = GboxEnvironment::from_config(&cfg).unwrap();
        assert_eq!(env.settle, Duration::from_millis(10));
        assert_eq!(env.refresh_keys, vec!["control", "r"]);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_environment_error() {
        let env = GboxEnvironment::new("http://127.0.0.1:1", "k", "b")
            .with_refresh(vec!["f5".into()], Duration::ZERO);
        assert!(matches!(env.refresh().await, Err(AgentError::Environment(_))));
    }
}
