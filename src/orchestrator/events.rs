//! Run 过程事件：用于观察状态机推进（测试断言、前端推送）

use serde::Serialize;

use crate::core::ErrorKind;
use crate::orchestrator::types::{ReflectionDecision, RunStatus};

/// 单个 Run 的过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 状态机进入新状态
    PhaseChange { status: RunStatus },
    /// 规划完成（第几个规划周期、产出多少步骤）
    PlanReady { iteration: u32, steps: usize },
    /// 步骤开始执行
    StepStarted { step_id: String, tool: String },
    /// 步骤结束（成功或带种类的失败）
    StepFinished {
        step_id: String,
        success: bool,
        error_kind: Option<ErrorKind>,
    },
    /// 反思决策
    Reflected { decision: ReflectionDecision },
    /// Run 到达终态
    Finished { status: RunStatus },
}
