//! 推理客户端抽象
//!
//! 所有后端（Ollama / Mock）实现 InferenceClient：一次 generate 一次响应，不保留任何会话状态。

use async_trait::async_trait;

/// 单次生成请求：system 指令 + 用户文本
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: String,
    pub text: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            text: text.into(),
        }
    }
}

/// 推理客户端 trait：无状态文本生成
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// 生成回复；引擎不可达或响应畸形时返回 Err（由调用方决定重试）
    async fn generate(&self, prompt: &Prompt) -> Result<String, String>;
}
