// ==========================================
// Zephyr 导入工具 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入配置读取接口
// 实现者: ConfigManager（config_kv 表）
// ==========================================

use crate::config::import_config::ImportConfig;
use crate::repository::error::RepositoryResult;

// ==========================================
// ImportConfigReader Trait
// ==========================================
pub trait ImportConfigReader: Send + Sync {
    /// 读取完整导入配置（未覆写的项取默认值）
    ///
    /// # 返回
    /// - Ok(ImportConfig): 合并后的配置
    /// - Err: 存储访问失败
    fn get_import_config(&self) -> RepositoryResult<ImportConfig>;
}
