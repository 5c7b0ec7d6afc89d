//! SQLite 记忆存储
//!
//! 单表 memory_records，run_id / trigger_id 建索引；同步 rusqlite 连接加锁使用，
//! 记录体量小、本地文件，锁内操作为微秒级。

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::memory::{MemoryRecord, MemoryRole, MemoryStore};

pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// 打开（或创建）记忆库；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_records (
                 id         INTEGER PRIMARY KEY AUTOINCREMENT,
                 run_id     TEXT NOT NULL,
                 trigger_id TEXT NOT NULL,
                 turn_index INTEGER NOT NULL,
                 role       TEXT NOT NULL,
                 content    TEXT NOT NULL,
                 timestamp  TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_memory_run ON memory_records(run_id);
             CREATE INDEX IF NOT EXISTS idx_memory_trigger ON memory_records(trigger_id);",
        )
        .map_err(|e| e.to_string())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn rows_where(&self, column: &str, value: &str) -> Result<Vec<MemoryRecord>, String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let sql = format!(
            "SELECT run_id, trigger_id, turn_index, role, content, timestamp
             FROM memory_records WHERE {column} = ?1 ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![value], |row| {
                let role: String = row.get(3)?;
                let timestamp: DateTime<Utc> = row.get(5)?;
                Ok(MemoryRecord {
                    run_id: row.get(0)?,
                    trigger_id: row.get(1)?,
                    turn_index: row.get(2)?,
                    role: parse_role(&role),
                    content: row.get(4)?,
                    timestamp,
                })
            })
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
    }
}

fn parse_role(s: &str) -> MemoryRole {
    match s {
        "task" => MemoryRole::Task,
        "plan" => MemoryRole::Plan,
        "step_result" => MemoryRole::StepResult,
        "reflection" => MemoryRole::Reflection,
        _ => MemoryRole::Outcome,
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn append(&self, record: MemoryRecord) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        conn.execute(
            "INSERT INTO memory_records (run_id, trigger_id, turn_index, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.run_id,
                record.trigger_id,
                record.turn_index,
                record.role.as_str(),
                record.content,
                record.timestamp,
            ],
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn query_run(&self, run_id: &str) -> Result<Vec<MemoryRecord>, String> {
        self.rows_where("run_id", run_id)
    }

    async fn query_trigger(&self, trigger_id: &str) -> Result<Vec<MemoryRecord>, String> {
        self.rows_where("trigger_id", trigger_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMemoryStore::open(dir.path().join("mem.db")).unwrap();

        store
            .append(MemoryRecord::new("r1", "t1", 0, MemoryRole::Task, "deploy app"))
            .await
            .unwrap();
        store
            .append(MemoryRecord::new(
                "r1",
                "t1",
                1,
                MemoryRole::Outcome,
                "{\"status\":\"done\"}",
            ))
            .await
            .unwrap();

        let rows = store.query_run("r1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].role, MemoryRole::Task);
        assert_eq!(rows[1].content, "{\"status\":\"done\"}");

        let by_trigger = store.query_trigger("t1").await.unwrap();
        assert_eq!(by_trigger.len(), 2);
        assert!(store.query_trigger("missing").await.unwrap().is_empty());
    }
}
