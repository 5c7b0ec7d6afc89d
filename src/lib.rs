//! Hive - Rust 自主任务编排智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与错误种类
//! - **inference**: 推理网关（Ollama / Mock）
//! - **memory**: 追加式轨迹存储（SQLite / 内存）
//! - **orchestrator**: Plan/Execute/Reflect 状态机、Run 协调器
//! - **tools**: 工具目录、执行服务协议、参数校验与执行桥
//! - **server**: HTTP 入口（触发、状态、取消、健康）

pub mod config;
pub mod core;
pub mod inference;
pub mod memory;
pub mod observability;
pub mod orchestrator;
pub mod server;
pub mod tools;
