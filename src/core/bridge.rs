//! 同步桥：在隔离的执行上下文中跑完一次异步调用
//!
//! 每次 run 新建一个专用线程和其上的 current-thread tokio runtime，block_on 到结束后关闭 runtime、
//! join 线程再返回。调用方自身是否处于某个 runtime 中不受影响；不复用、不池化。

use std::any::Any;
use std::future::Future;
use std::thread;
use std::time::Duration;

use crate::core::AgentError;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct SyncBridge {
    thread_name: Option<String>,
}

impl SyncBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// 在新线程 + 私有 runtime 上运行 make() 产生的 future，同步返回其结果
    ///
    /// future 内的错误原样返回；future panic 转为 BridgePanicked。
    /// 返回前 runtime 已关闭、线程已退出（成功、错误、panic 三种路径相同）。
    pub fn run<F, Fut, T>(&self, make: F) -> Result<T, AgentError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, AgentError>>,
        T: Send,
    {
        let name = self
            .thread_name
            .clone()
            .unwrap_or_else(|| "engine-session".to_string());

        thread::scope(|scope| {
            let handle = thread::Builder::new()
                .name(name)
                .spawn_scoped(scope, move || {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()?;
                    let result = rt.block_on(make());
                    rt.shutdown_timeout(SHUTDOWN_GRACE);
                    result
                })?;
            match handle.join() {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(error = %message, "engine session panicked");
                    Err(AgentError::BridgePanicked(message))
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_value() {
        let bridge = SyncBridge::new();
        let value = bridge
            .run(|| async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, AgentError>(42)
            })
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_propagates_error_unchanged() {
        let bridge = SyncBridge::new();
        let err = bridge
            .run(|| async { Err::<(), _>(AgentError::Engine("transport closed".into())) })
            .unwrap_err();
        assert!(matches!(err, AgentError::Engine(ref m) if m == "transport closed"));
    }

    #[test]
    fn test_panic_becomes_error() {
        let bridge = SyncBridge::new();
        let err = bridge
            .run(|| async {
                if true {
                    panic!("boom");
                }
                Ok::<(), AgentError>(())
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::BridgePanicked(ref m) if m == "boom"));
        // 之后的调用不受影响
        assert_eq!(bridge.run(|| async { Ok::<_, AgentError>(1) }).unwrap(), 1);
    }

    #[test]
    fn test_borrows_caller_data() {
        let bridge = SyncBridge::new();
        let words = vec!["a".to_string(), "b".to_string()];
        let joined = bridge
            .run(|| {
                let words = &words;
                async move { Ok::<_, AgentError>(words.join("+")) }
            })
            .unwrap();
        assert_eq!(joined, "a+b");
    }

    #[test]
    fn test_runs_on_dedicated_thread() {
        let caller = thread::current().id();
        let bridge = SyncBridge::new().with_thread_name("bridge-test");
        let (id, name) = bridge
            .run(|| async {
                let t = thread::current();
                Ok::<_, AgentError>((t.id(), t.name().map(String::from)))
            })
            .unwrap();
        assert_ne!(id, caller);
        assert_eq!(name.as_deref(), Some("bridge-test"));
    }

    #[tokio::test]
    async fn test_usable_inside_ambient_runtime() {
        let bridge = SyncBridge::new();
        let value = bridge
            .run(|| async {
                tokio::task::yield_now().await;
                Ok::<_, AgentError>("isolated")
            })
            .unwrap();
        assert_eq!(value, "isolated");
        // 外层 runtime 仍然可用
        tokio::task::yield_now().await;
    }
}
