// ==========================================
// Zephyr 导入工具 - 目标库写入载荷
// ==========================================
// 职责: 映射器输出、目标存储输入
// 约束: scenario 永不为空（目标库约束）
// ==========================================

use crate::domain::zephyr::{TestDataTable, ZephyrIssue};
use serde::{Deserialize, Serialize};

// ==========================================
// CasePayload - 用例载荷
// ==========================================
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CasePayload {
    pub name: String,
    pub setup: String,
    pub scenario: String,
    pub expected: String,
    pub teardown: String,
    pub description: String,
    pub is_steps: bool,
    pub attributes: CaseAttributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    pub steps: Vec<StepPayload>,
}

impl CasePayload {
    /// 写入目标库时使用的载荷：标签通过 set_labels 单独下发
    pub fn for_write(&self) -> CasePayload {
        CasePayload {
            labels: Vec::new(),
            ..self.clone()
        }
    }

    /// 载荷中记录的业务键（用于重复查找）
    pub fn zephyr_key(&self) -> Option<&str> {
        self.attributes
            .zephyr
            .key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

// ==========================================
// StepPayload - 步骤载荷
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPayload {
    pub sort_order: usize,
    pub name: String,     // "Step N"
    pub scenario: String, // 永不为空
    pub expected: String,
}

// ==========================================
// 结构化元数据
// ==========================================

/// 用例附加属性：保留 Zephyr 原始标识与分类信息
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CaseAttributes {
    pub zephyr: ZephyrMetadata,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZephyrMetadata {
    pub id: Option<String>,
    pub key: Option<String>,
    pub folder: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub owner: Option<String>,
    pub created_by: Option<String>,
    pub created_on: Option<String>,
    pub updated_by: Option<String>,
    pub updated_on: Option<String>,
    pub issues: Vec<ZephyrIssue>,
    pub attachments: Vec<String>,
    pub param_type: Option<String>,
    pub parameters: Vec<String>,
    pub test_data_wrapper: Option<TestDataTable>,
}

/// 套件附加属性：记录来源文件夹
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuiteAttributes {
    pub zephyr: SuiteMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteMetadata {
    pub folder_full_path: Option<String>,
    pub folder_index: Option<i64>,
}

impl SuiteAttributes {
    pub fn new(folder_full_path: Option<&str>, folder_index: Option<i64>) -> Self {
        Self {
            zephyr: SuiteMetadata {
                folder_full_path: folder_full_path.map(str::to_string),
                folder_index,
            },
        }
    }
}
