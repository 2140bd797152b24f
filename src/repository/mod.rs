// ==========================================
// Zephyr 导入工具 - 目标库层
// ==========================================
// 红线: 目标库不含导入规则
// ==========================================
// 职责: 提供目标用例库接口与实现，屏蔽存储细节
// 约束: 所有 SQL 使用参数化查询
// ==========================================

pub mod error;
pub mod memory_store;
pub mod sqlite_store;
pub mod target_store;

pub use error::{RepositoryError, RepositoryResult};
pub use memory_store::{InMemoryTargetStore, StoredCase, StoredSuite};
pub use sqlite_store::SqliteTargetStore;
pub use target_store::TargetStore;
