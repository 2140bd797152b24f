// ==========================================
// Zephyr 导入工具 - 用例校验器
// ==========================================
// 职责: 从解析记录推导告警（重复键/名称过长/文件夹/空步骤）
// 红线: 只累积告警，不报错，不阻断导入
// 约束: 告警文本逐字节确定（报告黄金对比依赖）
// ==========================================

use crate::domain::zephyr::{FolderRegistry, KeyCounts, ZephyrStep, ZephyrTestCase};
use crate::importer::sanitizer::sanitize_html;

/// 默认名称长度上限（字符数）
pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;

const MISSING_KEY: &str = "(missing key)";

// ==========================================
// CaseValidator
// ==========================================
#[derive(Debug, Clone)]
pub struct CaseValidator {
    max_name_length: usize,
}

impl Default for CaseValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NAME_LENGTH)
    }
}

impl CaseValidator {
    pub fn new(max_name_length: usize) -> Self {
        Self { max_name_length }
    }

    /// 生成单个用例的告警
    ///
    /// # 参数
    /// - case: 解析记录
    /// - mapped_name: 映射后的显示名（含 key 前缀）
    /// - key_counts: 整个导出文件的业务键计数
    /// - folders: 完整的文件夹注册表
    ///
    /// # 返回
    /// - 按规则顺序排列的告警列表（可能为空）
    pub fn warnings(
        &self,
        case: &ZephyrTestCase,
        mapped_name: &str,
        key_counts: &KeyCounts,
        folders: &FolderRegistry,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        let key = case.trimmed_key();
        let key_label = key.unwrap_or(MISSING_KEY);

        // 规则 1: 重复业务键
        if let Some(key) = key {
            if key_counts.get(key).copied().unwrap_or(0) > 1 {
                warnings.push(format!("Duplicate Zephyr key in XML: {}", key));
            }
        }

        // 规则 2: 名称过长（按字符计）
        let name_length = mapped_name.chars().count();
        if name_length > self.max_name_length {
            match key {
                Some(key) => warnings.push(format!(
                    "Test case name too long ({} > {}) for {}",
                    name_length, self.max_name_length, key
                )),
                None => warnings.push(format!(
                    "Test case name too long ({} > {})",
                    name_length, self.max_name_length
                )),
            }
        }

        // 规则 3: 文件夹缺失 / 未声明
        match case.folder_path() {
            None => warnings.push(format!("Missing folder in Zephyr case {}", key_label)),
            Some(path) if !folders.contains_key(path) => warnings.push(format!(
                "Folder not found in Zephyr export: {} for case {}",
                path, key_label
            )),
            Some(_) => {}
        }

        // 规则 4: 空步骤 / 空预期结果
        for step in &case.steps {
            let has_scenario = step_has_scenario(step);
            if !has_scenario {
                warnings.push(format!(
                    "Empty step {} in Zephyr case {}",
                    step.index + 1,
                    key_label
                ));
            } else if sanitize_html(step.expected_result.as_deref()).is_empty() {
                warnings.push(format!(
                    "Empty expected result for step {} in Zephyr case {}",
                    step.index + 1,
                    key_label
                ));
            }
        }

        warnings
    }
}

fn step_has_scenario(step: &ZephyrStep) -> bool {
    !sanitize_html(step.description.as_deref()).is_empty()
        || !sanitize_html(step.test_data.as_deref()).is_empty()
}

/// 统计业务键出现次数（空白键不计）
pub fn build_duplicate_key_counts<'a, I>(cases: I) -> KeyCounts
where
    I: IntoIterator<Item = &'a ZephyrTestCase>,
{
    let mut counts = KeyCounts::new();
    for case in cases {
        if let Some(key) = case.trimmed_key() {
            *counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }
    counts
}
