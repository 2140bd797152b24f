// ==========================================
// Zephyr 导入工具 - Zephyr 导出领域模型
// ==========================================
// 职责: 解析器输出的格式无关记录（XML / XLSX 共用）
// 约束: 解析完成后只读，不在导入过程中修改
// ==========================================

use crate::domain::types::ScriptKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// ZephyrFolder - 文件夹声明
// ==========================================
// full_path 为唯一键，斜杠分隔层级
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZephyrFolder {
    pub full_path: String,           // 完整路径，例如 "ui/forms"
    pub index: Option<i64>,          // 排序提示
    pub description: Option<String>, // 描述（仅 XLSX 提供）
}

impl ZephyrFolder {
    pub fn new(full_path: impl Into<String>, index: Option<i64>) -> Self {
        Self {
            full_path: full_path.into(),
            index,
            description: None,
        }
    }
}

/// 文件夹注册表（有序，保证预创建顺序确定）
pub type FolderRegistry = BTreeMap<String, ZephyrFolder>;

/// 业务键出现次数（仅统计去空白后的非空键）
pub type KeyCounts = HashMap<String, usize>;

// ==========================================
// ZephyrIssue - 关联的 Jira 问题
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZephyrIssue {
    pub key: String,
    pub summary: Option<String>,
}

// ==========================================
// ZephyrStep - 测试步骤
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZephyrStep {
    pub index: usize, // 0 起始；缺省时取文档顺序
    pub description: Option<String>,
    pub expected_result: Option<String>,
    pub test_data: Option<String>,
}

// ==========================================
// 数据驱动参数表
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDataCell {
    pub index: Option<i64>,
    pub name: Option<String>,
    pub data_type: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestDataRow {
    pub cells: Vec<TestDataCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestDataTable {
    pub rows: Vec<TestDataRow>,
}

impl TestDataTable {
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.cells.is_empty())
    }
}

// ==========================================
// ZephyrTestCase - 测试用例（核心实体）
// ==========================================
// 不变量: 场景来源为 steps 或 script_text 二选一
//         （steps 非空时 script_text 为 None）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZephyrTestCase {
    // ===== 标识 =====
    pub zephyr_id: Option<String>, // Zephyr 内部 ID
    pub key: Option<String>,       // 业务键，例如 "EX-1"
    pub name: Option<String>,

    // ===== 描述信息 =====
    pub folder: Option<String>,
    pub folder_description: Option<String>,
    pub objective: Option<String>,
    pub precondition: Option<String>,

    // ===== 分类 =====
    pub status: Option<String>,
    pub priority: Option<String>,
    pub owner: Option<String>,

    // ===== 审计字段 =====
    pub created_by: Option<String>,
    pub created_on: Option<String>,
    pub updated_by: Option<String>,
    pub updated_on: Option<String>,

    // ===== 参数化 =====
    pub param_type: Option<String>,
    pub parameters: Vec<String>,
    pub test_data: Option<TestDataTable>,

    // ===== 关联列表 =====
    pub labels: Vec<String>,
    pub issues: Vec<ZephyrIssue>,
    pub attachments: Vec<String>,

    // ===== 脚本 =====
    pub script_kind: Option<ScriptKind>,
    pub script_text: Option<String>,
    pub steps: Vec<ZephyrStep>,
}

impl ZephyrTestCase {
    /// 去空白后的业务键（空键返回 None）
    pub fn trimmed_key(&self) -> Option<&str> {
        self.key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// 去空白后的文件夹路径（空路径返回 None）
    pub fn folder_path(&self) -> Option<&str> {
        self.folder
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    /// 是否以步骤作为场景来源
    pub fn is_step_based(&self) -> bool {
        matches!(self.script_kind, Some(ScriptKind::Steps)) || !self.steps.is_empty()
    }

    /// 按 index 排序后的步骤（稳定排序，保留同 index 的文档顺序）
    pub fn ordered_steps(&self) -> Vec<&ZephyrStep> {
        let mut steps: Vec<&ZephyrStep> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.index);
        steps
    }
}

// ==========================================
// 解析结果
// ==========================================

/// 一次性解析结果（测试及小文件使用）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseResult {
    pub folders: FolderRegistry,
    pub test_cases: Vec<ZephyrTestCase>,
}

/// 第一遍扫描结果：文件夹注册表 + 业务键计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportScan {
    pub folders: FolderRegistry,
    pub key_counts: KeyCounts,
}

impl ExportScan {
    /// 登记一个业务键（空白键忽略）
    pub fn record_key(&mut self, key: Option<&str>) {
        if let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) {
            *self.key_counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_key_and_folder() {
        let case = ZephyrTestCase {
            key: Some("  EX-1 ".to_string()),
            folder: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(case.trimmed_key(), Some("EX-1"));
        assert_eq!(case.folder_path(), None);
    }

    #[test]
    fn test_ordered_steps_stable() {
        let case = ZephyrTestCase {
            steps: vec![
                ZephyrStep {
                    index: 1,
                    description: Some("b".to_string()),
                    ..Default::default()
                },
                ZephyrStep {
                    index: 0,
                    description: Some("a".to_string()),
                    ..Default::default()
                },
                ZephyrStep {
                    index: 1,
                    description: Some("c".to_string()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let order: Vec<_> = case
            .ordered_steps()
            .iter()
            .map(|s| s.description.clone().unwrap_or_default())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(case.is_step_based());
    }

    #[test]
    fn test_record_key_skips_blank() {
        let mut scan = ExportScan::default();
        scan.record_key(Some("DUP-1"));
        scan.record_key(Some(" DUP-1 "));
        scan.record_key(Some(" "));
        scan.record_key(None);
        assert_eq!(scan.key_counts.len(), 1);
        assert_eq!(scan.key_counts["DUP-1"], 2);
    }
}
