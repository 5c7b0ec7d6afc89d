//! 工具执行桥
//!
//! invoke(tool_name, args, timeout) -> ToolInvocationResult：先查目录、再校验参数，
//! 然后按工具类别取并发许可（超额排队而非失败），在超时内调用执行服务并归一化结果。
//! 桥自身不做任何容器/文件系统访问，也从不自动重试——失败留给反思阶段决策。
//! 每次调用输出结构化审计日志（JSON）。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::config::ToolsSection;
use crate::core::ErrorKind;
use crate::tools::{validate_args, ExecutionService, ToolCatalog};

/// 步骤级调用错误：种类可区分（超时 ≠ 工具自身报错），随轨迹持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationError {
    pub kind: ErrorKind,
    pub message: String,
}

/// 一次工具调用的归一化结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub step_id: String,
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<InvocationError>,
    pub duration_ms: u64,
}

impl ToolInvocationResult {
    fn failure(step_id: &str, kind: ErrorKind, message: String, started: Instant) -> Self {
        Self {
            step_id: step_id.to_string(),
            success: false,
            output: Value::Null,
            error: Some(InvocationError { kind, message }),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// 跨 Run 共享的并发上限：副作用类与只读类各一个信号量
///
/// 计数器只存在于桥内，不做全局环境状态，保证 Run 隔离可审计。
#[derive(Clone)]
pub struct ToolLimits {
    side_effect: Arc<Semaphore>,
    read_only: Arc<Semaphore>,
    side_effect_names: Arc<HashSet<String>>,
}

impl ToolLimits {
    pub fn from_config(cfg: &ToolsSection) -> Self {
        Self {
            side_effect: Arc::new(Semaphore::new(cfg.side_effect_limit.max(1))),
            read_only: Arc::new(Semaphore::new(cfg.read_only_limit.max(1))),
            side_effect_names: Arc::new(cfg.side_effect.iter().cloned().collect()),
        }
    }

    fn is_side_effect(&self, tool: &str) -> bool {
        self.side_effect_names.contains(tool)
    }

    /// 取执行许可；超出上限时在此排队
    async fn acquire(&self, tool: &str) -> OwnedSemaphorePermit {
        let sem = if self.is_side_effect(tool) {
            self.side_effect.clone()
        } else {
            self.read_only.clone()
        };
        sem.acquire_owned().await.expect("semaphore closed")
    }

    /// 当前某类别的空闲许可数（测试用）
    pub fn available(&self, tool: &str) -> usize {
        if self.is_side_effect(tool) {
            self.side_effect.available_permits()
        } else {
            self.read_only.available_permits()
        }
    }
}

/// 工具执行桥：每个 Run 持一份（目录按 Run 缓存），限流器跨 Run 共享
pub struct ToolBridge {
    catalog: ToolCatalog,
    service: Arc<dyn ExecutionService>,
    limits: ToolLimits,
    default_timeout: Duration,
}

impl ToolBridge {
    pub fn new(
        catalog: ToolCatalog,
        service: Arc<dyn ExecutionService>,
        limits: ToolLimits,
        default_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            service,
            limits,
            default_timeout,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// 执行一次工具调用；总是返回归一化结果，从不 panic、从不重试
    pub async fn invoke(
        &self,
        step_id: &str,
        tool_name: &str,
        args: &Value,
        invoke_timeout: Option<Duration>,
    ) -> ToolInvocationResult {
        let started = Instant::now();

        // 未知工具：立即失败，不发起网络调用
        let spec = match self.catalog.get(tool_name) {
            Some(s) => s,
            None => {
                let result = ToolInvocationResult::failure(
                    step_id,
                    ErrorKind::UnknownTool,
                    format!("tool not in catalog: {tool_name}"),
                    started,
                );
                self.audit(tool_name, &result, "unknown_tool");
                return result;
            }
        };

        // 参数不符合声明的 argSchema：同样不出网
        if let Err(reason) = validate_args(spec, args) {
            let result = ToolInvocationResult::failure(
                step_id,
                ErrorKind::InvalidArgs,
                reason,
                started,
            );
            self.audit(tool_name, &result, "invalid_args");
            return result;
        }

        let _permit = self.limits.acquire(tool_name).await;

        let limit = invoke_timeout.unwrap_or(self.default_timeout);
        let outcome = timeout(limit, self.service.call_tool(tool_name, args)).await;

        let result = match outcome {
            Ok(Ok(resp)) if resp.success => ToolInvocationResult {
                step_id: step_id.to_string(),
                success: true,
                output: resp.output,
                error: None,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Ok(resp)) => ToolInvocationResult::failure(
                step_id,
                ErrorKind::ToolError,
                resp.error.unwrap_or_else(|| "tool reported failure".to_string()),
                started,
            ),
            Ok(Err(transport)) => ToolInvocationResult::failure(
                step_id,
                ErrorKind::ToolError,
                transport,
                started,
            ),
            Err(_) => ToolInvocationResult::failure(
                step_id,
                ErrorKind::ToolTimeout,
                format!("no response within {}s", limit.as_secs()),
                started,
            ),
        };

        let outcome_tag = match &result.error {
            None => "ok",
            Some(e) if e.kind == ErrorKind::ToolTimeout => "timeout",
            Some(_) => "error",
        };
        self.audit(tool_name, &result, outcome_tag);
        result
    }

    fn audit(&self, tool_name: &str, result: &ToolInvocationResult, outcome: &str) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "step_id": result.step_id,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": result.duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "tool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolResponse, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 可编程的执行服务：固定延迟 + 固定响应，并统计调用次数
    struct FakeService {
        delay: Duration,
        response: Result<ToolResponse, String>,
        calls: AtomicUsize,
    }

    impl FakeService {
        fn ok_with_delay(delay: Duration) -> Self {
            Self {
                delay,
                response: Ok(ToolResponse {
                    success: true,
                    output: json!("done"),
                    error: None,
                }),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExecutionService for FakeService {
        async fn list_tools(&self) -> Result<Vec<ToolSpec>, String> {
            Ok(vec![])
        }

        async fn call_tool(&self, _name: &str, _args: &Value) -> Result<ToolResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.response.clone()
        }
    }

    fn catalog() -> ToolCatalog {
        ToolCatalog::new(vec![
            ToolSpec {
                name: "filesystem_list".to_string(),
                description: "List contents of a directory".to_string(),
                arg_schema: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"]
                }),
            },
            ToolSpec {
                name: "docker_exec_command".to_string(),
                description: "Execute a command inside a Docker container".to_string(),
                arg_schema: json!({
                    "type": "object",
                    "properties": {
                        "container_id": {"type": "string"},
                        "command": {"type": "string"}
                    },
                    "required": ["container_id", "command"]
                }),
            },
        ])
    }

    fn limits() -> ToolLimits {
        ToolLimits::from_config(&crate::config::ToolsSection::default())
    }

    fn bridge(service: Arc<FakeService>) -> ToolBridge {
        ToolBridge::new(catalog(), service, limits(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_unknown_tool_no_network_call() {
        let service = Arc::new(FakeService::ok_with_delay(Duration::ZERO));
        let b = bridge(service.clone());
        let r = b.invoke("step-1", "shell", &json!({}), None).await;
        assert!(!r.success);
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::UnknownTool);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_args_no_network_call() {
        let service = Arc::new(FakeService::ok_with_delay(Duration::ZERO));
        let b = bridge(service.clone());
        let r = b
            .invoke("step-1", "filesystem_list", &json!({"path": 1}), None)
            .await;
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::InvalidArgs);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_distinguishable() {
        let service = Arc::new(FakeService::ok_with_delay(Duration::from_millis(200)));
        let b = bridge(service);
        let r = b
            .invoke(
                "step-2",
                "filesystem_list",
                &json!({"path": "."}),
                Some(Duration::from_millis(20)),
            )
            .await;
        assert!(!r.success);
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::ToolTimeout);
    }

    #[tokio::test]
    async fn test_tool_reported_failure_kind() {
        let service = Arc::new(FakeService {
            delay: Duration::ZERO,
            response: Ok(ToolResponse {
                success: false,
                output: Value::Null,
                error: Some("no such container".to_string()),
            }),
            calls: AtomicUsize::new(0),
        });
        let b = bridge(service);
        let r = b
            .invoke(
                "step-1",
                "docker_exec_command",
                &json!({"container_id": "abc", "command": "ls"}),
                None,
            )
            .await;
        assert_eq!(r.error.as_ref().unwrap().kind, ErrorKind::ToolError);
        assert!(r.error.unwrap().message.contains("no such container"));
    }

    #[tokio::test]
    async fn test_ceiling_queues_excess_instead_of_failing() {
        // 副作用类上限 1：两个并发调用必须串行，都成功
        let mut cfg = crate::config::ToolsSection::default();
        cfg.side_effect_limit = 1;
        let service = Arc::new(FakeService::ok_with_delay(Duration::from_millis(50)));
        let b = Arc::new(ToolBridge::new(
            catalog(),
            service.clone(),
            ToolLimits::from_config(&cfg),
            Duration::from_secs(5),
        ));

        let args = json!({"container_id": "abc", "command": "ls"});
        let started = Instant::now();
        let (r1, r2) = tokio::join!(
            b.invoke("s1", "docker_exec_command", &args, None),
            b.invoke("s2", "docker_exec_command", &args, None),
        );
        assert!(r1.success && r2.success);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        // 串行化：总耗时至少两次延迟
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
