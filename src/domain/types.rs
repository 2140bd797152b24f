// ==========================================
// Zephyr 导入工具 - 领域类型定义
// ==========================================
// 职责: 导入过程中共享的小型枚举
// 序列化格式: lowercase (与报告/接口一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 重复键策略 (Duplicate Policy)
// ==========================================
// 目标库中已存在同一业务键时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Skip,   // 保留已有用例，不做修改
    Upsert, // 整体覆盖已有用例
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicatePolicy::Skip => write!(f, "skip"),
            DuplicatePolicy::Upsert => write!(f, "upsert"),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    /// 大小写不敏感，允许首尾空白
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(DuplicatePolicy::Skip),
            "upsert" => Ok(DuplicatePolicy::Upsert),
            _ => Err("on_duplicate must be 'skip' or 'upsert'".to_string()),
        }
    }
}

// ==========================================
// 单条用例的终态 (Import Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportAction {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl fmt::Display for ImportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportAction::Created => write!(f, "created"),
            ImportAction::Updated => write!(f, "updated"),
            ImportAction::Skipped => write!(f, "skipped"),
            ImportAction::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 导出文件格式 (Export Format)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Xml,
    Xlsx,
}

impl ExportFormat {
    /// 根据文件头判断格式：ZIP 魔数视为 XLSX，其余按 XML 处理
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(b"PK\x03\x04") {
            ExportFormat::Xlsx
        } else {
            ExportFormat::Xml
        }
    }

    /// 根据扩展名判断格式（未知扩展名返回 None）
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_lowercase().as_str() {
            "xml" => Some(ExportFormat::Xml),
            "xlsx" | "xlsm" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Xml => write!(f, "xml"),
            ExportFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

// ==========================================
// 脚本类型 (Script Kind)
// ==========================================
// 来自 <testScript type="..."> 或 XLSX 中被填写的脚本列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Steps,
    PlainText,
    Bdd,
    Other(String),
}

impl ScriptKind {
    /// 解析导出文件中的 type 属性（空值返回 None）
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "" => None,
            "steps" | "step_by_step" | "step-by-step" => Some(ScriptKind::Steps),
            "plain" | "text" | "plain_text" | "plaintext" => Some(ScriptKind::PlainText),
            "bdd" | "cucumber" | "gherkin" => Some(ScriptKind::Bdd),
            _ => Some(ScriptKind::Other(raw.trim().to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ScriptKind::Steps => "steps",
            ScriptKind::PlainText => "plain",
            ScriptKind::Bdd => "bdd",
            ScriptKind::Other(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
