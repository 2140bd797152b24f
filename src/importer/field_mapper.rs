// ==========================================
// Zephyr 导入工具 - 字段映射器
// ==========================================
// 职责: ZephyrTestCase → CasePayload（名称/场景/步骤/标签/元数据）
// 约束: 纯函数、全函数；场景与步骤场景永不为空
// ==========================================

use crate::domain::payload::{CaseAttributes, CasePayload, StepPayload, ZephyrMetadata};
use crate::domain::zephyr::{TestDataTable, ZephyrIssue, ZephyrStep, ZephyrTestCase};
use crate::importer::sanitizer::sanitize_html;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 名称为空时的占位
pub const UNNAMED_CASE: &str = "(Unnamed test case)";

// ==========================================
// MappingOptions - 映射开关
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingOptions {
    pub prefix_with_key: bool,              // 名称前缀 "[KEY] "
    pub meta_labels: bool,                  // 追加 zephyr:status=... 等标签
    pub append_issues_to_description: bool, // 描述末尾追加 Jira 问题列表
    pub embed_test_data_to_description: bool, // 描述末尾追加参数表
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            prefix_with_key: true,
            meta_labels: true,
            append_issues_to_description: true,
            embed_test_data_to_description: true,
        }
    }
}

// ==========================================
// FieldMapper
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    options: MappingOptions,
}

impl FieldMapper {
    pub fn new(options: MappingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MappingOptions {
        &self.options
    }

    /// 映射单个用例
    ///
    /// # 参数
    /// - case: 解析记录
    ///
    /// # 返回
    /// - CasePayload: 含标签（写库前用 for_write 去掉）
    pub fn map_case(&self, case: &ZephyrTestCase) -> CasePayload {
        let key = case.trimmed_key();

        let base_name = case
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNNAMED_CASE);
        let name = match key {
            Some(key) if self.options.prefix_with_key => format!("[{}] {}", key, base_name),
            _ => base_name.to_string(),
        };

        let is_steps = case.is_step_based();
        let mut scenario = if is_steps {
            flatten_steps(&case.ordered_steps())
        } else {
            sanitize_html(case.script_text.as_deref())
        };
        if scenario.is_empty() {
            scenario = format!(
                "(Imported from Zephyr {}; no scenario content)",
                key.unwrap_or("unknown")
            );
        }

        CasePayload {
            name,
            setup: sanitize_html(case.precondition.as_deref()),
            scenario,
            expected: String::new(),
            teardown: String::new(),
            description: self.build_description(case),
            is_steps,
            attributes: build_attributes(case),
            labels: self.build_labels(case),
            steps: case
                .ordered_steps()
                .into_iter()
                .map(|step| StepPayload {
                    sort_order: step.index,
                    name: format!("Step {}", step.index + 1),
                    scenario: step_scenario(step),
                    expected: sanitize_html(step.expected_result.as_deref()),
                })
                .collect(),
        }
    }

    fn build_description(&self, case: &ZephyrTestCase) -> String {
        let mut blocks = Vec::new();
        let objective = sanitize_html(case.objective.as_deref());
        if !objective.is_empty() {
            blocks.push(objective);
        }
        if self.options.append_issues_to_description {
            if let Some(block) = issues_block(&case.issues) {
                blocks.push(block);
            }
        }
        if self.options.embed_test_data_to_description {
            if let Some(block) = case.test_data.as_ref().and_then(test_data_block) {
                blocks.push(block);
            }
        }
        blocks.join("\n\n")
    }

    fn build_labels(&self, case: &ZephyrTestCase) -> Vec<String> {
        let mut labels = Vec::new();
        let mut seen = HashSet::new();
        for raw in &case.labels {
            push_label(&mut labels, &mut seen, raw);
        }

        if self.options.meta_labels {
            let meta = [
                ("status", case.status.as_deref()),
                ("priority", case.priority.as_deref()),
                ("owner", case.owner.as_deref()),
            ];
            for (field, value) in meta {
                let value = collapse_whitespace(value.unwrap_or_default());
                if !value.is_empty() {
                    push_label(&mut labels, &mut seen, &format!("zephyr:{}={}", field, value));
                }
            }
        }
        labels
    }
}

/// 压缩空白为单个空格
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_label(labels: &mut Vec<String>, seen: &mut HashSet<String>, raw: &str) {
    let cleaned = collapse_whitespace(raw);
    if !cleaned.is_empty() && seen.insert(cleaned.clone()) {
        labels.push(cleaned);
    }
}

/// 单步场景：描述 / 描述+测试数据 / 测试数据 / 占位
pub fn step_scenario(step: &ZephyrStep) -> String {
    let description = sanitize_html(step.description.as_deref());
    let test_data = sanitize_html(step.test_data.as_deref());
    match (description.is_empty(), test_data.is_empty()) {
        (false, false) => format!("{}\n\nTest data:\n{}", description, test_data),
        (false, true) => description,
        (true, false) => format!("Test data:\n{}", test_data),
        (true, true) => format!("Step {} (empty in Zephyr)", step.index + 1),
    }
}

/// 步骤展平为整段场景
pub fn flatten_steps(steps: &[&ZephyrStep]) -> String {
    let blocks: Vec<String> = steps
        .iter()
        .map(|step| {
            let mut chunk = format!("Step {}\n{}", step.index + 1, step_scenario(step));
            let expected = sanitize_html(step.expected_result.as_deref());
            if !expected.is_empty() {
                chunk.push_str("\nExpected:\n");
                chunk.push_str(&expected);
            }
            chunk.trim().to_string()
        })
        .filter(|chunk| !chunk.is_empty())
        .collect();
    blocks.join("\n\n").trim().to_string()
}

fn issues_block(issues: &[ZephyrIssue]) -> Option<String> {
    let lines: Vec<String> = issues
        .iter()
        .filter(|issue| !issue.key.trim().is_empty())
        .map(|issue| {
            let summary = collapse_whitespace(issue.summary.as_deref().unwrap_or_default());
            if summary.is_empty() {
                format!("- {}", issue.key.trim())
            } else {
                format!("- {}: {}", issue.key.trim(), summary)
            }
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("Jira issues:\n{}", lines.join("\n")))
    }
}

fn test_data_block(table: &TestDataTable) -> Option<String> {
    let lines: Vec<String> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| !row.cells.is_empty())
        .map(|(i, row)| {
            let cells: Vec<String> = row
                .cells
                .iter()
                .map(|cell| {
                    let name = cell.name.as_deref().unwrap_or("?");
                    let value = sanitize_html(cell.value.as_deref());
                    format!("{}={}", name, value)
                })
                .collect();
            format!("Row {}: {}", i + 1, cells.join("; "))
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("Test data:\n{}", lines.join("\n")))
    }
}

fn build_attributes(case: &ZephyrTestCase) -> CaseAttributes {
    CaseAttributes {
        zephyr: ZephyrMetadata {
            id: case.zephyr_id.clone(),
            key: case.key.clone(),
            folder: case.folder.clone(),
            status: case.status.clone(),
            priority: case.priority.clone(),
            owner: case.owner.clone(),
            created_by: case.created_by.clone(),
            created_on: case.created_on.clone(),
            updated_by: case.updated_by.clone(),
            updated_on: case.updated_on.clone(),
            issues: case.issues.clone(),
            attachments: case.attachments.clone(),
            param_type: case.param_type.clone(),
            parameters: case.parameters.clone(),
            test_data_wrapper: case.test_data.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ScriptKind;
    use crate::domain::zephyr::{TestDataCell, TestDataRow};

    fn create_step_case() -> ZephyrTestCase {
        ZephyrTestCase {
            key: Some("EX-1".to_string()),
            name: Some("  Login  ".to_string()),
            script_kind: Some(ScriptKind::Steps),
            steps: vec![
                ZephyrStep {
                    index: 1,
                    description: None,
                    expected_result: None,
                    test_data: Some("user=admin".to_string()),
                },
                ZephyrStep {
                    index: 0,
                    description: Some("<p>Open login page</p>".to_string()),
                    expected_result: Some("Page opens".to_string()),
                    test_data: None,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_step_case_scenario() {
        let payload = FieldMapper::default().map_case(&create_step_case());
        assert_eq!(payload.name, "[EX-1] Login");
        assert!(payload.is_steps);
        assert_eq!(
            payload.scenario,
            "Step 1\nOpen login page\nExpected:\nPage opens\n\nStep 2\nTest data:\nuser=admin"
        );
        assert_eq!(payload.steps.len(), 2);
        assert_eq!(payload.steps[0].name, "Step 1");
        assert_eq!(payload.steps[1].scenario, "Test data:\nuser=admin");
        assert_ne!(payload.steps[1].scenario, "Step 2 (empty in Zephyr)");
    }

    #[test]
    fn test_empty_step_placeholder() {
        let step = ZephyrStep {
            index: 2,
            ..Default::default()
        };
        assert_eq!(step_scenario(&step), "Step 3 (empty in Zephyr)");
    }

    #[test]
    fn test_scenario_never_empty() {
        let case = ZephyrTestCase {
            key: Some("EX-9".to_string()),
            script_kind: Some(ScriptKind::PlainText),
            script_text: Some("<p></p>".to_string()),
            ..Default::default()
        };
        let payload = FieldMapper::default().map_case(&case);
        assert_eq!(
            payload.scenario,
            "(Imported from Zephyr EX-9; no scenario content)"
        );
        assert_eq!(payload.name, "[EX-9] (Unnamed test case)");

        let keyless = FieldMapper::default().map_case(&ZephyrTestCase::default());
        assert_eq!(
            keyless.scenario,
            "(Imported from Zephyr unknown; no scenario content)"
        );
        assert_eq!(keyless.name, UNNAMED_CASE);
    }

    #[test]
    fn test_labels_and_meta_labels() {
        let case = ZephyrTestCase {
            labels: vec![
                "smoke".to_string(),
                " smoke ".to_string(),
                "Smoke".to_string(),
                "ui   tests".to_string(),
                "  ".to_string(),
            ],
            status: Some("  In   Review ".to_string()),
            priority: Some(" ".to_string()),
            owner: Some("alice".to_string()),
            ..Default::default()
        };
        let payload = FieldMapper::default().map_case(&case);
        assert_eq!(
            payload.labels,
            vec![
                "smoke",
                "Smoke",
                "ui tests",
                "zephyr:status=In Review",
                "zephyr:owner=alice"
            ]
        );

        let plain = FieldMapper::new(MappingOptions {
            meta_labels: false,
            prefix_with_key: false,
            ..Default::default()
        })
        .map_case(&case);
        assert_eq!(plain.labels, vec!["smoke", "Smoke", "ui tests"]);
    }

    #[test]
    fn test_description_blocks() {
        let case = ZephyrTestCase {
            objective: Some("<p>Goal</p>".to_string()),
            issues: vec![
                ZephyrIssue {
                    key: "JIRA-1".to_string(),
                    summary: Some("Login bug".to_string()),
                },
                ZephyrIssue {
                    key: "JIRA-2".to_string(),
                    summary: None,
                },
            ],
            test_data: Some(TestDataTable {
                rows: vec![TestDataRow {
                    cells: vec![TestDataCell {
                        name: Some("user".to_string()),
                        value: Some("admin".to_string()),
                        ..Default::default()
                    }],
                }],
            }),
            ..Default::default()
        };
        let payload = FieldMapper::default().map_case(&case);
        assert_eq!(
            payload.description,
            "Goal\n\nJira issues:\n- JIRA-1: Login bug\n- JIRA-2\n\nTest data:\nRow 1: user=admin"
        );

        let bare = FieldMapper::new(MappingOptions {
            append_issues_to_description: false,
            embed_test_data_to_description: false,
            ..Default::default()
        })
        .map_case(&case);
        assert_eq!(bare.description, "Goal");
        assert_eq!(bare.attributes.zephyr.issues.len(), 2);
    }
}
