//! 工具层：目录客户端、执行服务协议、参数校验与执行桥
//!
//! 所有副作用都委托给隔离的执行服务；本进程只做协议翻译、校验、限流与超时。

pub mod bridge;
pub mod catalog;
pub mod schema;
pub mod service;

pub use bridge::{InvocationError, ToolBridge, ToolInvocationResult, ToolLimits};
pub use catalog::{ToolCatalog, ToolSpec};
pub use schema::{plan_step_schema_json, validate_args};
pub use service::{ExecutionService, HttpExecutionService, ToolResponse};
