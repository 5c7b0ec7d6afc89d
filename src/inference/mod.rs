//! 推理网关：文本生成引擎的客户端抽象与实现
//!
//! 引擎被视为无状态的请求/响应 oracle：`generate(prompt) -> text`。
//! 失败以可区分的错误字符串浮出，由调用方状态决定是否重试（至多一次）。

pub mod client;
pub mod mock;
pub mod ollama;

pub use client::{InferenceClient, Prompt};
pub use mock::{MockInference, ScriptedInference};
pub use ollama::OllamaClient;
