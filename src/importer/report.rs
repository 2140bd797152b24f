// ==========================================
// Zephyr 导入工具 - CSV 审计报告
// ==========================================
// 职责: ReportRow 列表 → 固定列顺序的 CSV 文本
// 约束: 行尾统一 "\n"；None 输出空串；告警压缩去重后以 " | " 连接
// ==========================================

use crate::domain::import_run::ReportRow;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::collapse_whitespace;
use std::collections::HashSet;

/// 报告表头（列顺序固定）
pub const REPORT_HEADER: [&str; 13] = [
    "zephyr_key",
    "zephyr_id",
    "folder_full_path",
    "testy_suite_id",
    "testy_case_id",
    "action",
    "steps_count",
    "labels_count",
    "attachments_in_xml",
    "attachments_attached",
    "attachments_missing",
    "warnings",
    "error",
];

/// 压缩空白并按首次出现去重（空串丢弃）
pub fn dedup_warnings<'a, I>(warnings: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for warning in warnings {
        let cleaned = collapse_whitespace(warning);
        if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
            result.push(cleaned);
        }
    }
    result
}

fn opt_text<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

/// 生成 CSV 报告
///
/// # 参数
/// - rows: 每个用例一行，按处理顺序
///
/// # 返回
/// - UTF-8 CSV 文本（含表头）
pub fn build_csv_report(rows: &[ReportRow]) -> ImportResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(REPORT_HEADER)?;
    for row in rows {
        writer.write_record([
            opt_text(&row.zephyr_key),
            opt_text(&row.zephyr_id),
            opt_text(&row.folder_full_path),
            opt_text(&row.suite_id),
            opt_text(&row.case_id),
            row.action.to_string(),
            row.steps_count.to_string(),
            row.labels_count.to_string(),
            row.attachments_in_export.to_string(),
            row.attachments_attached.to_string(),
            row.attachments_missing.to_string(),
            dedup_warnings(&row.warnings).join(" | "),
            opt_text(&row.error),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ImportError::ReportError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ImportError::ReportError(e.to_string()))
}
