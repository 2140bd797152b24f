// ==========================================
// Zephyr 导入工具 - 导入运行结果模型
// ==========================================
// 职责: 汇总计数、逐行审计记录、运行结果
// 约束: created + reused + updated + failed == cases（skip 必带已有 ID）
// ==========================================

use crate::domain::types::ImportAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportSummary - 汇总计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub folders: usize,     // 注册表中的文件夹数
    pub cases: usize,       // 处理的用例数
    pub steps: usize,       // 步骤载荷总数
    pub labels: usize,      // 标签总数（含元标签）
    pub attachments: usize, // 导出文件中引用的附件数
    pub created: usize,
    pub reused: usize, // skipped 且拿到已有 ID
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportSummary {
    /// 按终态累加计数
    pub fn record_action(&mut self, action: ImportAction, has_case_id: bool) {
        match action {
            ImportAction::Created => self.created += 1,
            ImportAction::Updated => self.updated += 1,
            ImportAction::Skipped => {
                self.skipped += 1;
                if has_case_id {
                    self.reused += 1;
                }
            }
            ImportAction::Failed => self.failed += 1,
        }
    }
}

// ==========================================
// ReportRow - 报告行（每个用例一行，含失败用例）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub zephyr_key: Option<String>,
    pub zephyr_id: Option<String>,
    pub folder_full_path: Option<String>,
    pub suite_id: Option<i64>,
    pub case_id: Option<i64>,
    pub action: ImportAction,
    pub steps_count: usize,
    pub labels_count: usize,
    pub attachments_in_export: usize,
    pub attachments_attached: usize,
    pub attachments_missing: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

// ==========================================
// ImportOutcome - 一次运行的完整结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub run_id: String, // UUID v4
    pub dry_run: bool,
    pub summary: ImportSummary,
    pub rows: Vec<ReportRow>,
    pub report_csv: String,
    pub warnings: Vec<String>, // dry run 截断为预览上限
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_action_counts_reuse() {
        let mut summary = ImportSummary::default();
        summary.record_action(ImportAction::Created, true);
        summary.record_action(ImportAction::Skipped, true);
        summary.record_action(ImportAction::Skipped, false);
        summary.record_action(ImportAction::Failed, false);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.reused, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.reused <= summary.skipped);
    }
}
