//! Mock 推理客户端（用于测试与本地联调，无需引擎）

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::inference::{InferenceClient, Prompt};

/// 按脚本依次吐出预设响应；脚本耗尽后返回 Err（视为引擎不可达）。
/// 同时记录收到的每个 Prompt，供测试断言纠偏提示等内容。
#[derive(Default)]
pub struct ScriptedInference {
    replies: Mutex<VecDeque<Result<String, String>>>,
    seen: Mutex<Vec<Prompt>>,
}

impl ScriptedInference {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 全部成功响应的便捷构造
    pub fn from_texts(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(|t| Ok(t.to_string())).collect())
    }

    /// 追加一条脚本响应
    pub fn push(&self, reply: Result<String, String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// 已收到的请求（按顺序）
    pub fn prompts(&self) -> Vec<Prompt> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn generate(&self, prompt: &Prompt) -> Result<String, String> {
        self.seen.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("scripted replies exhausted".to_string()))
    }
}

/// 最小可用的 Mock：规划请求返回单步 filesystem_list 计划，反思请求返回 COMPLETE。
/// 用于在没有推理引擎时本地跑通整条链路（provider = "mock"）。
#[derive(Debug, Default)]
pub struct MockInference;

#[async_trait]
impl InferenceClient for MockInference {
    async fn generate(&self, prompt: &Prompt) -> Result<String, String> {
        if prompt.text.contains("CONTINUE") {
            return Ok("COMPLETE".to_string());
        }
        Ok(r#"[{"description": "list the workspace root", "tool": "filesystem_list", "args": {"path": "."}}]"#
            .to_string())
    }
}
