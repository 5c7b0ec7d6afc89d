//! 工具执行服务协议
//!
//! 执行服务是独立进程：`GET /tools` 返回目录，`POST /tools/{name}` 调用工具，
//! 响应为 `{success, output|error}`。本模块只做协议客户端，不含任何工具实现。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolSpec;

/// 工具调用响应（线协议）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct ListToolsResponse {
    #[serde(default)]
    tools: Vec<ToolSpec>,
}

/// 执行服务能力接口：目录获取 + 工具调用。Err 表示传输层故障（连不上、响应畸形），
/// 工具自身报告的失败放在 ToolResponse.success=false 里。
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, String>;

    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolResponse, String>;
}

/// HTTP 实现：面向 MCP 风格的工具服务
pub struct HttpExecutionService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpExecutionService {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionService {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, String> {
        let resp = self
            .http
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .map_err(|e| format!("catalog request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("catalog returned status {}", resp.status()));
        }
        let parsed: ListToolsResponse = resp
            .json()
            .await
            .map_err(|e| format!("malformed catalog response: {e}"))?;
        Ok(parsed.tools)
    }

    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolResponse, String> {
        let resp = self
            .http
            .post(format!("{}/tools/{}", self.base_url, name))
            .json(args)
            .send()
            .await
            .map_err(|e| format!("tool request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("tool service returned status {}", resp.status()));
        }
        resp.json::<ToolResponse>()
            .await
            .map_err(|e| format!("malformed tool response: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_response_defaults() {
        let r: ToolResponse = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(r.success);
        assert!(r.output.is_null());
        assert!(r.error.is_none());

        let r: ToolResponse =
            serde_json::from_value(json!({"success": false, "error": "no such container"}))
                .unwrap();
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("no such container"));
    }
}
