//! 编排核心数据模型：Task / Run / Plan / Step 与状态
//!
//! 不变量：一个 Run 任一时刻至多一个 Step 处于 running；iteration_count 每次进入规划严格递增且有上界；
//! 计划修订时整体替换，从不局部修补；Step 在一次执行尝试内恰好经历 pending→running→{done|failed}。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ErrorKind;
use crate::tools::ToolInvocationResult;

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// 任务描述（触发器入口），创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub trigger_id: String,
    pub action: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, Value>,
    #[serde(default)]
    pub context: serde_json::Map<String, Value>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(trigger_id: &str, action: &str) -> Self {
        Self {
            trigger_id: trigger_id.to_string(),
            action: action.to_string(),
            parameters: serde_json::Map::new(),
            context: serde_json::Map::new(),
            created_at: Utc::now(),
        }
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

/// 计划中的一个工具绑定步骤；仅由编排循环变更状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Value,
    pub status: StepStatus,
}

/// 有序步骤序列；修订时整体替换以保证顺序无歧义
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// 第一个 pending 步骤的下标（计划顺序即执行顺序）
    pub fn next_pending(&self) -> Option<usize> {
        self.steps.iter().position(|s| s.status == StepStatus::Pending)
    }

    /// 将所有仍 pending 的步骤标记为 skipped（revise 决策丢弃剩余步骤）
    pub fn skip_pending(&mut self) {
        for s in &mut self.steps {
            if s.status == StepStatus::Pending {
                s.status = StepStatus::Skipped;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Run 状态（状态机节点）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Planning,
    Executing,
    Reflecting,
    Done,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// 终态失败详情：种类 + 出错时所处状态，供事后还原失败原因
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// 出错时状态机所处的状态
    pub state: RunStatus,
}

/// 反思决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionDecision {
    /// 推进到下一个 pending 步骤
    Continue,
    /// 丢弃剩余步骤，带上下文重新规划
    Revise,
    /// 目标达成
    Complete,
    /// 不可恢复
    Abort,
}

/// 一次端到端执行；由创建它的编排循环独占
#[derive(Debug, Clone)]
pub struct Run {
    pub run_id: String,
    pub task: Task,
    pub plan: Plan,
    pub step_results: Vec<ToolInvocationResult>,
    pub status: RunStatus,
    /// 规划/重规划次数，严格递增且有界
    pub iteration_count: u32,
    pub failure: Option<RunFailure>,
    pub summary: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(task: Task) -> Self {
        Self {
            run_id: format!("run_{}", uuid::Uuid::new_v4()),
            task,
            plan: Plan::default(),
            step_results: Vec::new(),
            status: RunStatus::Pending,
            iteration_count: 0,
            failure: None,
            summary: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// 单步摘要（状态查询响应的一部分）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: String,
    pub description: String,
    pub tool_name: String,
    pub status: StepStatus,
}

/// Run 状态快照：watch 通道发布 + HTTP 查询返回
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub trigger_id: String,
    pub status: RunStatus,
    pub iteration_count: u32,
    pub steps: Vec<StepSummary>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub failure: Option<RunFailure>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
}

impl RunReport {
    pub fn from_run(run: &Run) -> Self {
        Self {
            run_id: run.run_id.clone(),
            trigger_id: run.task.trigger_id.clone(),
            status: run.status,
            iteration_count: run.iteration_count,
            steps: run
                .plan
                .steps
                .iter()
                .map(|s| StepSummary {
                    id: s.id.clone(),
                    description: s.description.clone(),
                    tool_name: s.tool_name.clone(),
                    status: s.status,
                })
                .collect(),
            summary: run.summary.clone(),
            failure: run.failure.clone(),
            execution_time_ms: run
                .finished_at
                .map(|f| (f - run.started_at).num_milliseconds().max(0) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(id: &str, status: StepStatus) -> Step {
        Step {
            id: id.to_string(),
            description: String::new(),
            tool_name: "filesystem_list".to_string(),
            tool_args: json!({"path": "."}),
            status,
        }
    }

    #[test]
    fn test_next_pending_respects_order() {
        let plan = Plan::new(vec![
            step("s1", StepStatus::Done),
            step("s2", StepStatus::Pending),
            step("s3", StepStatus::Pending),
        ]);
        assert_eq!(plan.next_pending(), Some(1));
    }

    #[test]
    fn test_skip_pending_leaves_finished_alone() {
        let mut plan = Plan::new(vec![
            step("s1", StepStatus::Done),
            step("s2", StepStatus::Failed),
            step("s3", StepStatus::Pending),
        ]);
        plan.skip_pending();
        assert_eq!(plan.steps[0].status, StepStatus::Done);
        assert_eq!(plan.steps[1].status, StepStatus::Failed);
        assert_eq!(plan.steps[2].status, StepStatus::Skipped);
        assert_eq!(plan.next_pending(), None);
    }

    #[test]
    fn test_task_ingress_shape() {
        let t: Task = serde_json::from_value(json!({
            "trigger_id": "n8n-42",
            "action": "restart the web container",
            "parameters": {"container": "web"},
            "context": {"env": "staging"}
        }))
        .unwrap();
        assert_eq!(t.trigger_id, "n8n-42");
        assert_eq!(t.parameters["container"], "web");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Reflecting.is_terminal());
    }
}
