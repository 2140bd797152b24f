// ==========================================
// Zephyr 导入工具 - 导入配置
// ==========================================
// 职责: 导入选项及默认值（映射开关 / 重复策略 / 校验阈值 / 告警预览上限）
// 存储: 可由 config_kv 表覆写，见 ConfigManager
// ==========================================

use crate::domain::types::DuplicatePolicy;
use crate::importer::field_mapper::MappingOptions;
use crate::importer::validator::DEFAULT_MAX_NAME_LENGTH;
use serde::{Deserialize, Serialize};

/// dry run 返回的告警条数上限
pub const DEFAULT_WARNING_PREVIEW_LIMIT: usize = 50;

// ==========================================
// ImportConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    // ===== 映射开关 =====
    pub prefix_with_key: bool,
    pub meta_labels: bool,
    pub append_issues_to_description: bool,
    pub embed_test_data_to_description: bool,

    // ===== 对账策略 =====
    pub on_duplicate: DuplicatePolicy,

    // ===== 校验与输出 =====
    pub max_name_length: usize,
    pub warning_preview_limit: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            prefix_with_key: true,
            meta_labels: true,
            append_issues_to_description: true,
            embed_test_data_to_description: true,
            on_duplicate: DuplicatePolicy::Skip,
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
            warning_preview_limit: DEFAULT_WARNING_PREVIEW_LIMIT,
        }
    }
}

impl ImportConfig {
    pub fn mapping_options(&self) -> MappingOptions {
        MappingOptions {
            prefix_with_key: self.prefix_with_key,
            meta_labels: self.meta_labels,
            append_issues_to_description: self.append_issues_to_description,
            embed_test_data_to_description: self.embed_test_data_to_description,
        }
    }
}

/// 宽松布尔解析: true/1/yes/y/on 与 false/0/no/n/off（忽略大小写与首尾空白）
pub fn parse_bool_text(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
