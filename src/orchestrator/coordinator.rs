//! Run 协调器：按 trigger_id 管理并发的 Run
//!
//! 每个 Run 在独立 tokio 任务中推进，互不共享可变步骤状态；
//! 跨 Run 共享的只有工具目录获取通道与执行桥的并发上限。
//! 重复提交：在途的 trigger_id 拒绝（不重启）；已完成的直接返回存档结果，不重新执行任何步骤。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::core::RunError;
use crate::inference::InferenceClient;
use crate::memory::MemoryStore;
use crate::orchestrator::events::RunEvent;
use crate::orchestrator::loop_::{run_loop, LoopSettings, RunContext};
use crate::orchestrator::types::{RunReport, RunStatus, Task};
use crate::tools::{ExecutionService, ToolLimits};

struct RunHandle {
    cancel: CancellationToken,
    status_rx: watch::Receiver<RunReport>,
}

/// 协调器：提交、取消、查询
pub struct RunCoordinator {
    inference: Arc<dyn InferenceClient>,
    service: Arc<dyn ExecutionService>,
    memory: Arc<dyn MemoryStore>,
    limits: ToolLimits,
    settings: LoopSettings,
    runs: RwLock<HashMap<String, RunHandle>>,
}

impl RunCoordinator {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        service: Arc<dyn ExecutionService>,
        memory: Arc<dyn MemoryStore>,
        limits: ToolLimits,
        settings: LoopSettings,
    ) -> Self {
        Self {
            inference,
            service,
            memory,
            limits,
            settings,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// 提交任务；返回初始快照（或已完成 Run 的存档结果）
    pub async fn submit(&self, task: Task) -> Result<RunReport, RunError> {
        self.submit_with_events(task, None).await
    }

    /// 提交任务并挂接过程事件通道（测试/前端用）
    pub async fn submit_with_events(
        &self,
        task: Task,
        event_tx: Option<mpsc::UnboundedSender<RunEvent>>,
    ) -> Result<RunReport, RunError> {
        let trigger_id = task.trigger_id.clone();
        let mut runs = self.runs.write().await;

        if let Some(handle) = runs.get(&trigger_id) {
            let report = handle.status_rx.borrow().clone();
            if report.status.is_terminal() {
                // 幂等：返回存档结果，不重新执行
                return Ok(report);
            }
            return Err(RunError::DuplicateTrigger(trigger_id));
        }

        let initial = RunReport {
            run_id: String::new(),
            trigger_id: trigger_id.clone(),
            status: RunStatus::Pending,
            iteration_count: 0,
            steps: Vec::new(),
            summary: None,
            failure: None,
            execution_time_ms: None,
        };
        let (status_tx, status_rx) = watch::channel(initial.clone());
        let cancel = CancellationToken::new();

        let ctx = RunContext {
            inference: self.inference.clone(),
            service: self.service.clone(),
            memory: self.memory.clone(),
            limits: self.limits.clone(),
            cancel: cancel.clone(),
            status_tx,
            event_tx,
            settings: self.settings.clone(),
        };
        tokio::spawn(run_loop(ctx, task));

        runs.insert(trigger_id, RunHandle { cancel, status_rx });
        Ok(initial)
    }

    /// 当前状态快照；未知 trigger_id 返回 None
    pub async fn status(&self, trigger_id: &str) -> Option<RunReport> {
        let runs = self.runs.read().await;
        runs.get(trigger_id).map(|h| h.status_rx.borrow().clone())
    }

    /// 等待 Run 到达终态并返回最终快照
    pub async fn wait(&self, trigger_id: &str) -> Option<RunReport> {
        let mut rx = {
            let runs = self.runs.read().await;
            runs.get(trigger_id)?.status_rx.clone()
        };
        loop {
            let report = rx.borrow().clone();
            if report.status.is_terminal() {
                return Some(report);
            }
            if rx.changed().await.is_err() {
                return Some(rx.borrow().clone());
            }
        }
    }

    /// 请求取消；在途桥调用允许自然结束。返回是否找到该 Run。
    pub async fn cancel(&self, trigger_id: &str) -> bool {
        let runs = self.runs.read().await;
        match runs.get(trigger_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// 非终态 Run 数（健康信号用）
    pub async fn active_count(&self) -> usize {
        let runs = self.runs.read().await;
        runs.values()
            .filter(|h| !h.status_rx.borrow().status.is_terminal())
            .count()
    }
}
