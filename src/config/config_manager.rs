// ==========================================
// Zephyr 导入工具 - 配置管理器
// ==========================================
// 职责: 导入配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约束: 非法配置值回退默认值并记录 warn，不阻断导入
// ==========================================

use crate::config::import_config::{parse_bool_text, ImportConfig};
use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::types::DuplicatePolicy;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA 并建表（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&conn_guard)?;
            init_schema(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 配置值（已存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON格式，键有序）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    fn get_bool_or(&self, key: &str, default: bool) -> RepositoryResult<bool> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        Ok(parse_bool_text(&raw).unwrap_or_else(|| {
            warn!(config_key = key, raw_value = %raw, "布尔配置格式错误，使用默认值");
            default
        }))
    }

    fn get_usize_or(&self, key: &str, default: usize) -> RepositoryResult<usize> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        Ok(raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or_else(|| {
                warn!(config_key = key, raw_value = %raw, "数值配置格式错误，使用默认值");
                default
            }))
    }

    fn get_policy_or(&self, key: &str, default: DuplicatePolicy) -> RepositoryResult<DuplicatePolicy> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };
        Ok(raw.parse::<DuplicatePolicy>().unwrap_or_else(|_| {
            warn!(config_key = key, raw_value = %raw, "重复策略配置错误，使用默认值");
            default
        }))
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
impl ImportConfigReader for ConfigManager {
    fn get_import_config(&self) -> RepositoryResult<ImportConfig> {
        let defaults = ImportConfig::default();

        Ok(ImportConfig {
            prefix_with_key: self
                .get_bool_or(config_keys::PREFIX_WITH_ZEPHYR_KEY, defaults.prefix_with_key)?,
            meta_labels: self.get_bool_or(config_keys::META_LABELS, defaults.meta_labels)?,
            append_issues_to_description: self.get_bool_or(
                config_keys::APPEND_JIRA_ISSUES_TO_DESCRIPTION,
                defaults.append_issues_to_description,
            )?,
            embed_test_data_to_description: self.get_bool_or(
                config_keys::EMBED_TESTDATA_TO_DESCRIPTION,
                defaults.embed_test_data_to_description,
            )?,
            on_duplicate: self.get_policy_or(config_keys::ON_DUPLICATE, defaults.on_duplicate)?,
            max_name_length: self
                .get_usize_or(config_keys::MAX_NAME_LENGTH, defaults.max_name_length)?,
            warning_preview_limit: self.get_usize_or(
                config_keys::WARNING_PREVIEW_LIMIT,
                defaults.warning_preview_limit,
            )?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 映射开关
    pub const PREFIX_WITH_ZEPHYR_KEY: &str = "prefix_with_zephyr_key";
    pub const META_LABELS: &str = "meta_labels";
    pub const APPEND_JIRA_ISSUES_TO_DESCRIPTION: &str = "append_jira_issues_to_description";
    pub const EMBED_TESTDATA_TO_DESCRIPTION: &str = "embed_testdata_to_description";

    // 对账
    pub const ON_DUPLICATE: &str = "on_duplicate";

    // 校验与输出
    pub const MAX_NAME_LENGTH: &str = "max_name_length";
    pub const WARNING_PREVIEW_LIMIT: &str = "warning_preview_limit";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let manager = create_test_manager();
        assert_eq!(manager.get_import_config().unwrap(), ImportConfig::default());
    }

    #[test]
    fn test_overrides() {
        let manager = create_test_manager();
        manager
            .set_global_config_value(config_keys::META_LABELS, "off")
            .unwrap();
        manager
            .set_global_config_value(config_keys::ON_DUPLICATE, "UPSERT")
            .unwrap();
        manager
            .set_global_config_value(config_keys::WARNING_PREVIEW_LIMIT, "10")
            .unwrap();

        let config = manager.get_import_config().unwrap();
        assert!(!config.meta_labels);
        assert_eq!(config.on_duplicate, DuplicatePolicy::Upsert);
        assert_eq!(config.warning_preview_limit, 10);
        assert!(config.prefix_with_key);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let manager = create_test_manager();
        manager
            .set_global_config_value(config_keys::MAX_NAME_LENGTH, "abc")
            .unwrap();
        manager
            .set_global_config_value(config_keys::PREFIX_WITH_ZEPHYR_KEY, "perhaps")
            .unwrap();
        manager
            .set_global_config_value(config_keys::ON_DUPLICATE, "merge")
            .unwrap();

        let config = manager.get_import_config().unwrap();
        assert_eq!(config.max_name_length, 255);
        assert!(config.prefix_with_key);
        assert_eq!(config.on_duplicate, DuplicatePolicy::Skip);
    }

    #[test]
    fn test_snapshot_sorted() {
        let manager = create_test_manager();
        manager.set_global_config_value("b", "2").unwrap();
        manager.set_global_config_value("a", "1").unwrap();
        assert_eq!(manager.get_config_snapshot().unwrap(), r#"{"a":"1","b":"2"}"#);
    }
}
