//! Ollama 客户端
//!
//! 通过本地 Ollama 端点（/api/generate，非流式）完成生成；base_url 与模型名来自配置。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::inference::{InferenceClient, Prompt};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama HTTP 客户端：持有 reqwest Client、端点与模型名
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String, String> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: &prompt.text,
            system: &prompt.system,
            stream: false,
        };
        let resp = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("engine returned status {}", resp.status()));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| format!("malformed response: {e}"))?;
        Ok(parsed.response)
    }
}
