// ==========================================
// Zephyr 导入工具 - 配置层
// ==========================================
// 职责: 导入选项默认值与覆写管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config;
pub mod import_config_trait;

// 重导出核心配置
pub use config_manager::{config_keys, ConfigManager};
pub use import_config::{parse_bool_text, ImportConfig, DEFAULT_WARNING_PREVIEW_LIMIT};
pub use import_config_trait::ImportConfigReader;
