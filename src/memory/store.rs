//! 记忆存储接口与内存实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 记录角色：轨迹里这一条是什么
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryRole {
    /// 任务描述（触发器原文）
    Task,
    /// 某一轮规划产出的计划
    Plan,
    /// 单步执行结果
    StepResult,
    /// 反思决策
    Reflection,
    /// 终态结果（状态 + 摘要 + 失败种类）
    Outcome,
}

impl MemoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Plan => "plan",
            Self::StepResult => "step_result",
            Self::Reflection => "reflection",
            Self::Outcome => "outcome",
        }
    }
}

/// 单条记忆记录：追加后不再变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub run_id: String,
    pub trigger_id: String,
    pub turn_index: u32,
    pub role: MemoryRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(
        run_id: &str,
        trigger_id: &str,
        turn_index: u32,
        role: MemoryRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            trigger_id: trigger_id.to_string(),
            turn_index,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 记忆存储能力接口：append 是唯一的写操作
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, record: MemoryRecord) -> Result<(), String>;

    /// 按 run_id 查询，按追加顺序返回
    async fn query_run(&self, run_id: &str) -> Result<Vec<MemoryRecord>, String>;

    /// 按 trigger_id 查询（同一触发器的历史 Run），按追加顺序返回
    async fn query_trigger(&self, trigger_id: &str) -> Result<Vec<MemoryRecord>, String>;
}

/// 内存实现：测试与无持久化场景
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, record: MemoryRecord) -> Result<(), String> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn query_run(&self, run_id: &str) -> Result<Vec<MemoryRecord>, String> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn query_trigger(&self, trigger_id: &str) -> Result<Vec<MemoryRecord>, String> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.trigger_id == trigger_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_query() {
        let store = InMemoryStore::new();
        store
            .append(MemoryRecord::new("r1", "t1", 0, MemoryRole::Task, "deploy"))
            .await
            .unwrap();
        store
            .append(MemoryRecord::new("r1", "t1", 1, MemoryRole::Plan, "[]"))
            .await
            .unwrap();
        store
            .append(MemoryRecord::new("r2", "t2", 0, MemoryRole::Task, "other"))
            .await
            .unwrap();

        let by_run = store.query_run("r1").await.unwrap();
        assert_eq!(by_run.len(), 2);
        assert_eq!(by_run[0].role, MemoryRole::Task);
        assert_eq!(by_run[1].turn_index, 1);

        let by_trigger = store.query_trigger("t2").await.unwrap();
        assert_eq!(by_trigger.len(), 1);
        assert_eq!(by_trigger[0].run_id, "r2");
    }
}
