//! Run 错误类型与错误种类
//!
//! ErrorKind 随 Run 轨迹持久化：终态失败必须带上具体种类与出错时所处的状态/步骤，
//! 便于事后从记忆库还原失败原因，而不是一个笼统的失败标记。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误种类（可序列化，写入步骤结果与终态轨迹）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PlanParse,
    UnknownTool,
    InvalidArgs,
    ToolTimeout,
    ToolError,
    InferenceUnavailable,
    ReflectionAmbiguous,
    ReplanBudgetExhausted,
    Cancelled,
    /// 反思判定不可恢复（abort 决策本身，区别于具体工具错误）
    Aborted,
    Catalog,
    Memory,
    Config,
    DuplicateTrigger,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PlanParse => "plan_parse",
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArgs => "invalid_args",
            Self::ToolTimeout => "tool_timeout",
            Self::ToolError => "tool_error",
            Self::InferenceUnavailable => "inference_unavailable",
            Self::ReflectionAmbiguous => "reflection_ambiguous",
            Self::ReplanBudgetExhausted => "replan_budget_exhausted",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
            Self::Catalog => "catalog",
            Self::Memory => "memory",
            Self::Config => "config",
            Self::DuplicateTrigger => "duplicate_trigger",
        };
        f.write_str(s)
    }
}

/// Run 运行过程中可能出现的错误
///
/// 传播策略：UnknownTool / InvalidArgs / ToolTimeout / ToolError 仅使当前步骤失败，
/// Run 进入反思阶段由其决定后续；PlanParse / InferenceUnavailable 各本地重试一次后才使整个 Run 失败；
/// ReplanBudgetExhausted / Cancelled 总是终止 Run。
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid args for tool {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Reflection ambiguous: {0}")]
    ReflectionAmbiguous(String),

    #[error("Replan budget exhausted after {0} cycles")]
    ReplanBudgetExhausted(u32),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Reflection decided abort: {0}")]
    Aborted(String),

    #[error("Tool catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Memory store error: {0}")]
    Memory(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Duplicate trigger in flight: {0}")]
    DuplicateTrigger(String),
}

impl RunError {
    /// 对应的可持久化错误种类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PlanParse(_) => ErrorKind::PlanParse,
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::InvalidArgs { .. } => ErrorKind::InvalidArgs,
            Self::ToolTimeout(_) => ErrorKind::ToolTimeout,
            Self::ToolError(_) => ErrorKind::ToolError,
            Self::InferenceUnavailable(_) => ErrorKind::InferenceUnavailable,
            Self::ReflectionAmbiguous(_) => ErrorKind::ReflectionAmbiguous,
            Self::ReplanBudgetExhausted(_) => ErrorKind::ReplanBudgetExhausted,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::CatalogUnavailable(_) => ErrorKind::Catalog,
            Self::Memory(_) => ErrorKind::Memory,
            Self::Config(_) => ErrorKind::Config,
            Self::DuplicateTrigger(_) => ErrorKind::DuplicateTrigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RunError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            RunError::ReplanBudgetExhausted(5).kind(),
            ErrorKind::ReplanBudgetExhausted
        );
        assert_eq!(
            RunError::ToolTimeout("docker_exec_command".into()).kind(),
            ErrorKind::ToolTimeout
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let s = serde_json::to_string(&ErrorKind::ToolTimeout).unwrap();
        assert_eq!(s, "\"tool_timeout\"");
    }
}
