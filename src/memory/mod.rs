//! 记忆层：追加式轨迹存储
//!
//! 对话与事实记录只追加、只查询，核心从不编辑或删除历史。
//! 后端可替换：SQLite（生产）或内存（测试）。

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteMemoryStore;
pub use store::{InMemoryStore, MemoryRecord, MemoryRole, MemoryStore};
