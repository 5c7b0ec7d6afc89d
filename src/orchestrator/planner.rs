//! 规划：把任务 + 工具目录 + 历史变成一个工具绑定的有序计划
//!
//! 要求模型输出 `[{"description", "tool", "args"}]` JSON 数组；从回复中提取 JSON
//! （```json 围栏或方括号切片）并解析。解析不出至少一个步骤时用纠偏提示重试一次，
//! 再失败则返回 PlanParse 使 Run 失败。引擎不可达同样本地重试一次。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::core::RunError;
use crate::inference::{InferenceClient, Prompt};
use crate::memory::MemoryRecord;
use crate::orchestrator::types::{Plan, Step, StepStatus, Task};
use crate::tools::{plan_step_schema_json, ToolCatalog};

/// 历史记录注入时单条内容的最大字符数
const HISTORY_PREVIEW_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct StepDraft {
    description: String,
    tool: String,
    #[serde(default)]
    args: Value,
}

/// 从回复文本中提取 JSON 数组并解析为步骤草稿
fn parse_plan(output: &str) -> Result<Vec<StepDraft>, String> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Err("no JSON array found".to_string());
        }
    } else {
        return Err("no JSON array found".to_string());
    };

    let drafts: Vec<StepDraft> =
        serde_json::from_str(json_str).map_err(|e| format!("{e}: {json_str}"))?;
    if drafts.is_empty() {
        return Err("plan contains no steps".to_string());
    }
    Ok(drafts)
}

fn drafts_to_plan(drafts: Vec<StepDraft>) -> Plan {
    let steps = drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| Step {
            id: format!("step-{}", i + 1),
            description: d.description,
            tool_name: d.tool,
            tool_args: d.args,
            status: StepStatus::Pending,
        })
        .collect();
    Plan::new(steps)
}

/// Planner：持有推理客户端，负责 prompt 拼装与计划解析
pub struct Planner {
    inference: Arc<dyn InferenceClient>,
}

impl Planner {
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    fn history_block(history: &[MemoryRecord], max_records: usize) -> String {
        if history.is_empty() {
            return "(none)".to_string();
        }
        history
            .iter()
            .rev()
            .take(max_records)
            .map(|r| {
                let preview: String = r.content.chars().take(HISTORY_PREVIEW_CHARS).collect();
                format!("[{}] {}", r.role.as_str(), preview)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn build_prompt(
        &self,
        task: &Task,
        catalog: &ToolCatalog,
        history: &[MemoryRecord],
        max_history: usize,
        corrective: Option<&str>,
    ) -> Prompt {
        let system = format!(
            "You are an autonomous agent coordinating container and filesystem operations \
             through an isolated tool service. You plan before acting.\n\
             Output ONLY a JSON array of steps. Each step must conform to this schema:\n{}",
            plan_step_schema_json()
        );

        let mut text = format!(
            "Task: {}\n\nParameters: {}\nContext: {}\n\nAvailable tools:\n{}\n\n\
             Previous results:\n{}\n\n\
             Create a step-by-step plan to accomplish this task. Be specific and practical.\n\
             Respond with a JSON array of steps, in execution order.",
            task.action,
            Value::Object(task.parameters.clone()),
            Value::Object(task.context.clone()),
            catalog.descriptions_block(),
            Self::history_block(history, max_history),
        );
        if let Some(c) = corrective {
            text.push_str("\n\n");
            text.push_str(c);
        }
        Prompt::new(system, text)
    }

    /// 产出一个新计划；解析失败与引擎故障各本地重试一次
    pub async fn plan(
        &self,
        task: &Task,
        catalog: &ToolCatalog,
        history: &[MemoryRecord],
        max_history: usize,
    ) -> Result<Plan, RunError> {
        let mut corrective: Option<String> = None;
        let mut engine_retried = false;
        let mut parse_retried = false;

        loop {
            let prompt = self.build_prompt(task, catalog, history, max_history, corrective.as_deref());
            let output = match self.inference.generate(&prompt).await {
                Ok(o) => o,
                Err(e) => {
                    if engine_retried {
                        return Err(RunError::InferenceUnavailable(e));
                    }
                    engine_retried = true;
                    tracing::warn!(error = %e, "planning inference failed, retrying once");
                    continue;
                }
            };

            match parse_plan(&output) {
                Ok(drafts) => return Ok(drafts_to_plan(drafts)),
                Err(reason) => {
                    if parse_retried {
                        return Err(RunError::PlanParse(reason));
                    }
                    parse_retried = true;
                    tracing::warn!(error = %reason, "plan parse failed, re-prompting once");
                    corrective = Some(format!(
                        "Your previous reply could not be parsed as a plan ({reason}). \
                         Reply with ONLY a JSON array of step objects, no prose, no markdown \
                         outside a single ```json block."
                    ));
                }
            }
        }
    }
}
