//! 编排主循环：Planning -> Executing -> Reflecting -> …… 直至 Done / Failed / Cancelled
//!
//! 单个 Run 的状态严格串行推进，挂起点只有三处外部调用（推理、执行桥、记忆 I/O）。
//! 取消标志在每次状态转换顶端检查；在途的桥调用允许自然结束并记录结果，不强杀。
//! 终态把完整轨迹（任务、计划、每步结果、反思、结局）追加进记忆库。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{ErrorKind, RunError};
use crate::inference::InferenceClient;
use crate::memory::{MemoryRecord, MemoryRole, MemoryStore};
use crate::orchestrator::events::RunEvent;
use crate::orchestrator::planner::Planner;
use crate::orchestrator::reflector::{ReflectInput, Reflector};
use crate::orchestrator::types::{
    ReflectionDecision, Run, RunFailure, RunReport, RunStatus, StepStatus, Task,
};
use crate::tools::{ExecutionService, ToolBridge, ToolCatalog, ToolLimits};

/// 循环参数（来自配置）
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub max_replan_cycles: u32,
    pub max_history_records: usize,
    pub tool_timeout: Duration,
}

impl LoopSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_replan_cycles: cfg.orchestrator.max_replan_cycles,
            max_history_records: cfg.orchestrator.max_history_records,
            tool_timeout: Duration::from_secs(cfg.tools.tool_timeout_secs),
        }
    }
}

/// 单个 Run 的运行上下文：共享依赖 + 通道
pub struct RunContext {
    pub inference: Arc<dyn InferenceClient>,
    pub service: Arc<dyn ExecutionService>,
    pub memory: Arc<dyn MemoryStore>,
    /// 跨 Run 共享的并发上限
    pub limits: ToolLimits,
    pub cancel: CancellationToken,
    /// 每次状态转换后发布的状态快照
    pub status_tx: watch::Sender<RunReport>,
    /// 可选：过程事件推送
    pub event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
    pub settings: LoopSettings,
}

impl RunContext {
    fn publish(&self, run: &Run) {
        let _ = self.status_tx.send(RunReport::from_run(run));
    }

    fn emit(&self, ev: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 进入反思的原因
enum ReflectTrigger {
    /// 刚执行完下标为 idx 的步骤
    StepOutcome(usize),
    /// 没有剩余 pending 步骤
    PlanExhausted,
}

enum Phase {
    Planning,
    Executing,
    Reflecting(ReflectTrigger),
}

/// 驱动一个 Run 到终态并返回最终快照
pub async fn run_loop(ctx: RunContext, task: Task) -> RunReport {
    let mut run = Run::new(task);
    let run_id = run.run_id.clone();
    tracing::info!(run_id = %run_id, trigger_id = %run.task.trigger_id, "run started");
    ctx.publish(&run);

    // 该触发器的历史记录，规划时注入
    let stored_history = match ctx.memory.query_trigger(&run.task.trigger_id).await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "history query failed, planning without history");
            Vec::new()
        }
    };

    // 工具目录：每 Run 取一次并缓存；取不到则规划立即中止
    let outcome = if ctx.cancel.is_cancelled() {
        Err(to_failure(&run, RunError::Cancelled))
    } else {
        match ctx.service.list_tools().await {
            Ok(specs) => {
                let catalog = ToolCatalog::new(specs);
                let bridge = ToolBridge::new(
                    catalog.clone(),
                    ctx.service.clone(),
                    ctx.limits.clone(),
                    ctx.settings.tool_timeout,
                );
                drive(&ctx, &mut run, &catalog, &bridge, &stored_history).await
            }
            Err(e) => Err(to_failure(&run, RunError::CatalogUnavailable(e))),
        }
    };

    run.finished_at = Some(chrono::Utc::now());
    match outcome {
        Ok(()) => {
            run.status = RunStatus::Done;
            run.summary = Some(build_summary(&run));
            tracing::info!(run_id = %run_id, "run done");
        }
        Err(failure) => {
            run.status = if failure.kind == ErrorKind::Cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            };
            tracing::warn!(run_id = %run_id, kind = %failure.kind, error = %failure.message, "run terminated");
            run.summary = Some(failure.message.clone());
            run.failure = Some(failure);
        }
    }

    persist_trace(&ctx, &run).await;
    ctx.publish(&run);
    ctx.emit(RunEvent::Finished { status: run.status });
    RunReport::from_run(&run)
}

/// 状态机主体；返回 Ok(目标达成) 或带状态上下文的失败
async fn drive(
    ctx: &RunContext,
    run: &mut Run,
    catalog: &ToolCatalog,
    bridge: &ToolBridge,
    stored_history: &[MemoryRecord],
) -> Result<(), RunFailure> {
    let planner = Planner::new(ctx.inference.clone());
    let reflector = Reflector::new(ctx.inference.clone());
    let mut phase = Phase::Planning;

    loop {
        // 每次状态转换顶端检查取消；在途调用此前已自然完成并记录
        if ctx.cancel.is_cancelled() {
            return Err(to_failure(run, RunError::Cancelled));
        }

        match phase {
            Phase::Planning => {
                if run.iteration_count >= ctx.settings.max_replan_cycles {
                    return Err(to_failure(
                        run,
                        RunError::ReplanBudgetExhausted(run.iteration_count),
                    ));
                }
                run.iteration_count += 1;
                run.status = RunStatus::Planning;
                ctx.publish(run);
                ctx.emit(RunEvent::PhaseChange {
                    status: RunStatus::Planning,
                });

                // 累积上下文：跨 Run 历史 + 本 Run 已有的步骤结果
                let mut context = stored_history.to_vec();
                for (i, r) in run.step_results.iter().enumerate() {
                    context.push(MemoryRecord::new(
                        &run.run_id,
                        &run.task.trigger_id,
                        i as u32,
                        MemoryRole::StepResult,
                        serde_json::to_string(r).unwrap_or_default(),
                    ));
                }

                match planner
                    .plan(&run.task, catalog, &context, ctx.settings.max_history_records)
                    .await
                {
                    Ok(plan) => {
                        ctx.emit(RunEvent::PlanReady {
                            iteration: run.iteration_count,
                            steps: plan.steps.len(),
                        });
                        // 整体替换，从不局部修补
                        run.plan = plan;
                        phase = Phase::Executing;
                    }
                    Err(e) => return Err(to_failure(run, e)),
                }
            }

            Phase::Executing => {
                run.status = RunStatus::Executing;
                ctx.publish(run);
                ctx.emit(RunEvent::PhaseChange {
                    status: RunStatus::Executing,
                });

                match run.plan.next_pending() {
                    None => {
                        phase = Phase::Reflecting(ReflectTrigger::PlanExhausted);
                    }
                    Some(idx) => {
                        run.plan.steps[idx].status = StepStatus::Running;
                        ctx.publish(run);
                        ctx.emit(RunEvent::StepStarted {
                            step_id: run.plan.steps[idx].id.clone(),
                            tool: run.plan.steps[idx].tool_name.clone(),
                        });

                        let step = run.plan.steps[idx].clone();
                        let result = bridge
                            .invoke(&step.id, &step.tool_name, &step.tool_args, None)
                            .await;

                        run.plan.steps[idx].status = if result.success {
                            StepStatus::Done
                        } else {
                            StepStatus::Failed
                        };
                        ctx.emit(RunEvent::StepFinished {
                            step_id: step.id.clone(),
                            success: result.success,
                            error_kind: result.error.as_ref().map(|e| e.kind),
                        });
                        run.step_results.push(result);
                        ctx.publish(run);
                        phase = Phase::Reflecting(ReflectTrigger::StepOutcome(idx));
                    }
                }
            }

            Phase::Reflecting(trigger) => {
                run.status = RunStatus::Reflecting;
                ctx.publish(run);
                ctx.emit(RunEvent::PhaseChange {
                    status: RunStatus::Reflecting,
                });

                let remaining = run
                    .plan
                    .steps
                    .iter()
                    .filter(|s| s.status == StepStatus::Pending)
                    .count();
                let exhausted = matches!(trigger, ReflectTrigger::PlanExhausted);

                let decision = {
                    let input = match &trigger {
                        ReflectTrigger::StepOutcome(idx) => ReflectInput::StepOutcome {
                            description: &run.plan.steps[*idx].description,
                            tool_name: &run.plan.steps[*idx].tool_name,
                            result: run
                                .step_results
                                .last()
                                .expect("step outcome without result"),
                        },
                        ReflectTrigger::PlanExhausted => ReflectInput::PlanExhausted,
                    };
                    reflector.reflect(&run.task.action, input, remaining).await
                };

                match decision {
                    Ok(d) => {
                        ctx.emit(RunEvent::Reflected { decision: d });
                        match d {
                            // 计划已耗尽时 continue 没有可推进对象，按原义视为目标达成
                            ReflectionDecision::Continue if exhausted => return Ok(()),
                            ReflectionDecision::Continue => phase = Phase::Executing,
                            ReflectionDecision::Revise => {
                                run.plan.skip_pending();
                                ctx.publish(run);
                                phase = Phase::Planning;
                            }
                            ReflectionDecision::Complete => return Ok(()),
                            ReflectionDecision::Abort => {
                                return Err(abort_failure(run, &trigger));
                            }
                        }
                    }
                    // ReflectionAmbiguous / InferenceUnavailable：默认按 abort 处理
                    Err(e) => return Err(to_failure(run, e)),
                }
            }
        }
    }
}

/// 把 RunError 转成带当前状态的失败记录
fn to_failure(run: &Run, err: RunError) -> RunFailure {
    RunFailure {
        kind: err.kind(),
        message: err.to_string(),
        state: run.status,
    }
}

/// abort 决策的失败记录：若反思对象是失败步骤，沿用其错误种类；否则记为 Aborted
fn abort_failure(run: &Run, trigger: &ReflectTrigger) -> RunFailure {
    if let ReflectTrigger::StepOutcome(idx) = trigger {
        if let Some(err) = run
            .step_results
            .last()
            .and_then(|r| r.error.as_ref())
            .filter(|_| run.plan.steps[*idx].status == StepStatus::Failed)
        {
            return RunFailure {
                kind: err.kind,
                message: format!(
                    "aborted after step {} failed: {}",
                    run.plan.steps[*idx].id, err.message
                ),
                state: RunStatus::Reflecting,
            };
        }
    }
    to_failure(run, RunError::Aborted("reflection decided abort".to_string()))
}

fn build_summary(run: &Run) -> String {
    let done = run
        .plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Done)
        .count();
    let failed = run
        .plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .count();
    let skipped = run
        .plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Skipped)
        .count();
    format!(
        "Goal satisfied after {} planning cycle(s): {} step(s) done, {} failed, {} skipped",
        run.iteration_count, done, failed, skipped
    )
}

/// 终态把完整轨迹追加进记忆库；追加失败只告警，不改变 Run 结局
async fn persist_trace(ctx: &RunContext, run: &Run) {
    let mut turn: u32 = 0;
    let mut append = |role: MemoryRole, content: String| {
        let record = MemoryRecord::new(&run.run_id, &run.task.trigger_id, turn, role, content);
        turn += 1;
        record
    };

    let mut records = Vec::new();
    records.push(append(
        MemoryRole::Task,
        serde_json::json!({
            "action": run.task.action,
            "parameters": run.task.parameters,
            "context": run.task.context,
        })
        .to_string(),
    ));
    records.push(append(
        MemoryRole::Plan,
        serde_json::to_string(&run.plan).unwrap_or_default(),
    ));
    for result in &run.step_results {
        records.push(append(
            MemoryRole::StepResult,
            serde_json::to_string(result).unwrap_or_default(),
        ));
    }
    records.push(append(
        MemoryRole::Outcome,
        serde_json::json!({
            "status": run.status,
            "iteration_count": run.iteration_count,
            "summary": run.summary,
            "failure": run.failure,
        })
        .to_string(),
    ));

    for record in records {
        if let Err(e) = ctx.memory.append(record).await {
            tracing::warn!(run_id = %run.run_id, error = %e, "trace append failed");
        }
    }
}
