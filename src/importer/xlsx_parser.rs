// ==========================================
// Zephyr 导入工具 - XLSX 导出解析器
// ==========================================
// 职责: 表格导出 → 与 XML 相同的用例序列
// 规则: 表头关键字识别列角色；空 key 行并入上一用例（追加步骤）
// 说明: calamine 一次加载整张工作表，本格式不做流式处理
// ==========================================

use crate::domain::types::ScriptKind;
use crate::domain::zephyr::{FolderRegistry, ZephyrFolder, ZephyrIssue, ZephyrStep, ZephyrTestCase};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{Data, Reader, Xlsx};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, warn};

// ==========================================
// ColumnRole - 列角色
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ColumnRole {
    Key,
    Name,
    Status,
    Precondition,
    Objective,
    Folder,
    FolderDescription,
    Priority,
    Labels,
    Owner,
    Issues,
    Step,
    StepTestData,
    StepExpected,
    PlainText,
    Bdd,
}

/// 表头规范化：小写并去掉非字母数字
fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// 根据规范化表头识别列角色
fn header_role(normalized: &str) -> Option<ColumnRole> {
    let role = match normalized {
        "key" => ColumnRole::Key,
        "name" => ColumnRole::Name,
        "status" => ColumnRole::Status,
        "precondition" => ColumnRole::Precondition,
        "objective" => ColumnRole::Objective,
        "folder" => ColumnRole::Folder,
        "folderdescription" => ColumnRole::FolderDescription,
        "priority" => ColumnRole::Priority,
        "labels" | "label" => ColumnRole::Labels,
        "owner" => ColumnRole::Owner,
        "issues" => ColumnRole::Issues,
        n if n.contains("coverageissue") => ColumnRole::Issues,
        n if n.contains("testscript") && n.contains("stepbystep") => {
            if n.ends_with("step") {
                ColumnRole::Step
            } else if n.contains("testdata") {
                ColumnRole::StepTestData
            } else if n.contains("expected") {
                ColumnRole::StepExpected
            } else {
                return None;
            }
        }
        n if n.contains("testscript") && n.contains("plain") => ColumnRole::PlainText,
        n if n.contains("testscript") && n.contains("bdd") => ColumnRole::Bdd,
        _ => return None,
    };
    Some(role)
}

// ==========================================
// HeaderIndex - 列角色 → 列号（同角色取首列）
// ==========================================
#[derive(Debug, Default)]
struct HeaderIndex {
    columns: HashMap<ColumnRole, usize>,
}

impl HeaderIndex {
    fn from_row(row: &[Data]) -> Self {
        let mut columns = HashMap::new();
        for (idx, cell) in row.iter().enumerate() {
            let normalized = normalize_header(&cell.to_string());
            if normalized.is_empty() {
                continue;
            }
            if let Some(role) = header_role(&normalized) {
                columns.entry(role).or_insert(idx);
            }
        }
        Self { columns }
    }

    /// 取单元格文本（去空白，空值返回 None）
    fn text(&self, row: &[Data], role: ColumnRole) -> Option<String> {
        let idx = *self.columns.get(&role)?;
        row.get(idx).and_then(cell_text)
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        other => {
            let text = other.to_string();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
    }
}

fn row_has_any_value(row: &[Data]) -> bool {
    row.iter().any(|cell| cell_text(cell).is_some())
}

/// 拆分列表字段：逗号/分号/换行分隔，压缩空白，保序去重
pub fn split_tokens(value: Option<&str>) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let Some(value) = value else {
        return tokens;
    };
    for raw in value.split(&[',', ';', '\n', '\r'][..]) {
        let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if !compact.is_empty() && !tokens.contains(&compact) {
            tokens.push(compact);
        }
    }
    tokens
}

fn issues_from(value: Option<&str>) -> Vec<ZephyrIssue> {
    split_tokens(value)
        .into_iter()
        .map(|key| ZephyrIssue { key, summary: None })
        .collect()
}

// ==========================================
// XlsxCaseBuilder - 多行合并为一个用例
// ==========================================
struct XlsxCaseBuilder {
    case: ZephyrTestCase,
    script_kind: Option<ScriptKind>,
    script_text: Option<String>,
}

impl XlsxCaseBuilder {
    /// 首行：携带 key 与全部标量字段
    fn start(key: String, row: &[Data], header: &HeaderIndex) -> Self {
        let case = ZephyrTestCase {
            key: Some(key),
            name: header.text(row, ColumnRole::Name),
            status: header.text(row, ColumnRole::Status),
            precondition: header.text(row, ColumnRole::Precondition),
            objective: header.text(row, ColumnRole::Objective),
            folder: header.text(row, ColumnRole::Folder),
            folder_description: header.text(row, ColumnRole::FolderDescription),
            priority: header.text(row, ColumnRole::Priority),
            owner: header.text(row, ColumnRole::Owner),
            labels: split_tokens(header.text(row, ColumnRole::Labels).as_deref()),
            issues: issues_from(header.text(row, ColumnRole::Issues).as_deref()),
            ..Default::default()
        };
        let mut builder = Self {
            case,
            script_kind: None,
            script_text: None,
        };
        builder.set_script_text(row, header);
        builder.add_step(row, header);
        builder
    }

    /// 续行：只补齐仍为空的字段
    fn continue_with(&mut self, row: &[Data], header: &HeaderIndex) {
        let case = &mut self.case;
        if case.labels.is_empty() {
            case.labels = split_tokens(header.text(row, ColumnRole::Labels).as_deref());
        }
        if case.issues.is_empty() {
            case.issues = issues_from(header.text(row, ColumnRole::Issues).as_deref());
        }
        if case.folder.is_none() {
            case.folder = header.text(row, ColumnRole::Folder);
        }
        if case.folder_description.is_none() {
            case.folder_description = header.text(row, ColumnRole::FolderDescription);
        }
        if self.script_text.is_none() {
            self.set_script_text(row, header);
        }
        self.add_step(row, header);
    }

    fn set_script_text(&mut self, row: &[Data], header: &HeaderIndex) {
        if let Some(plain) = header.text(row, ColumnRole::PlainText) {
            self.script_text = Some(plain);
            self.script_kind = Some(ScriptKind::PlainText);
        } else if let Some(bdd) = header.text(row, ColumnRole::Bdd) {
            self.script_text = Some(bdd);
            self.script_kind = Some(ScriptKind::Bdd);
        }
    }

    fn add_step(&mut self, row: &[Data], header: &HeaderIndex) {
        let description = header.text(row, ColumnRole::Step);
        let test_data = header.text(row, ColumnRole::StepTestData);
        let expected_result = header.text(row, ColumnRole::StepExpected);
        if description.is_none() && test_data.is_none() && expected_result.is_none() {
            return;
        }
        let index = self.case.steps.len();
        self.case.steps.push(ZephyrStep {
            index,
            description,
            expected_result,
            test_data,
        });
    }

    fn finish(self) -> ZephyrTestCase {
        let mut case = self.case;
        if case.steps.is_empty() {
            case.script_kind = self.script_kind;
            case.script_text = self.script_text;
        } else {
            case.script_kind = Some(ScriptKind::Steps);
            case.script_text = None;
        }
        case
    }
}

// ==========================================
// 对外接口
// ==========================================

/// 解析第一张工作表中的全部用例
///
/// # 参数
/// - reader: 可 seek 的 XLSX 字节流
///
/// # 返回
/// - Ok(Vec<ZephyrTestCase>): 按行顺序的用例
/// - Err: 文件不是有效 XLSX / 没有工作表
pub fn parse_cases<RS: Read + Seek>(reader: RS) -> ImportResult<Vec<ZephyrTestCase>> {
    let mut workbook: Xlsx<RS> = Xlsx::new(reader)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ImportError::ExcelParseError("工作簿中没有工作表".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header_row) => HeaderIndex::from_row(header_row),
        None => {
            warn!(sheet = %sheet_name, "工作表为空");
            return Ok(Vec::new());
        }
    };
    if !header.columns.contains_key(&ColumnRole::Key) {
        warn!(sheet = %sheet_name, "未识别到 Key 列，所有行将被忽略");
    }

    let mut cases = Vec::new();
    let mut current: Option<XlsxCaseBuilder> = None;

    for row in rows {
        if !row_has_any_value(row) {
            continue;
        }
        match header.text(row, ColumnRole::Key) {
            Some(key) => {
                if let Some(done) = current.take() {
                    cases.push(done.finish());
                }
                current = Some(XlsxCaseBuilder::start(key, row, &header));
            }
            None => {
                if let Some(builder) = current.as_mut() {
                    builder.continue_with(row, &header);
                }
            }
        }
    }
    if let Some(done) = current {
        cases.push(done.finish());
    }

    debug!(sheet = %sheet_name, cases = cases.len(), "XLSX 解析完成");
    Ok(cases)
}

/// 从用例推导文件夹注册表（首个非空描述生效，无排序提示）
pub fn folders_from_cases(cases: &[ZephyrTestCase]) -> FolderRegistry {
    let mut folders = FolderRegistry::new();
    for case in cases {
        let Some(path) = case.folder_path() else {
            continue;
        };
        let description = case
            .folder_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let folder = folders
            .entry(path.to_string())
            .or_insert_with(|| ZephyrFolder::new(path, None));
        if folder.description.is_none() {
            folder.description = description;
        }
    }
    folders
}
