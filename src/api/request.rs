// ==========================================
// Zephyr 导入工具 - 导入请求校验
// ==========================================
// 职责: 松散字段表 → 强类型 ImportRequest
// 约束: 全部字段校验完后一次性返回 字段 → 错误信息 映射；校验失败不做任何处理
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{parse_bool_text, ImportConfig};
use crate::domain::types::{DuplicatePolicy, ExportFormat};
use crate::importer::attachment_matcher::AttachmentArchive;
use crate::importer::error::ImportResult;
use crate::importer::file_parser::detect_format;
use crate::importer::source::ExportSource;
use std::collections::BTreeMap;
use std::path::PathBuf;

// ==========================================
// RequestValue - 松散字段值
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum RequestValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Path(PathBuf),
    List(Vec<RequestValue>), // 多值表单字段，取第一个
}

impl RequestValue {
    /// 列表取第一个元素；空列表视为缺失
    fn unwrap_first(&self) -> Option<&RequestValue> {
        match self {
            RequestValue::List(values) => values.first().and_then(RequestValue::unwrap_first),
            RequestValue::Null => None,
            other => Some(other),
        }
    }
}

impl From<&str> for RequestValue {
    fn from(value: &str) -> Self {
        RequestValue::Text(value.to_string())
    }
}

impl From<bool> for RequestValue {
    fn from(value: bool) -> Self {
        RequestValue::Bool(value)
    }
}

impl From<i64> for RequestValue {
    fn from(value: i64) -> Self {
        RequestValue::Int(value)
    }
}

impl From<Vec<u8>> for RequestValue {
    fn from(value: Vec<u8>) -> Self {
        RequestValue::Bytes(value)
    }
}

/// 请求字段表
pub type RequestFields = BTreeMap<String, RequestValue>;

// ==========================================
// FileInput - 文件来源
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum FileInput {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl FileInput {
    fn from_value(value: &RequestValue) -> Option<Self> {
        match value {
            RequestValue::Bytes(bytes) => Some(FileInput::Bytes(bytes.clone())),
            RequestValue::Path(path) => Some(FileInput::Path(path.clone())),
            RequestValue::Text(text) if !text.trim().is_empty() => {
                Some(FileInput::Path(PathBuf::from(text.trim())))
            }
            _ => None,
        }
    }

    /// 打开为可回绕的导出数据源
    pub fn open_source(&self) -> ImportResult<ExportSource> {
        match self {
            FileInput::Bytes(bytes) => Ok(ExportSource::from_bytes(bytes.clone())),
            FileInput::Path(path) => ExportSource::from_path(path),
        }
    }

    /// 打开为附件压缩包
    pub fn open_archive(&self) -> ImportResult<AttachmentArchive> {
        match self {
            FileInput::Bytes(bytes) => AttachmentArchive::from_bytes(bytes.clone()),
            FileInput::Path(path) => AttachmentArchive::from_path(path),
        }
    }

    /// 判断导出格式：优先扩展名，其次文件头
    pub fn detect_format(&self, source: &mut ExportSource) -> ImportResult<ExportFormat> {
        if let FileInput::Path(path) = self {
            if let Some(format) = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ExportFormat::from_extension)
            {
                return Ok(format);
            }
        }
        detect_format(source)
    }
}

// ==========================================
// ImportRequest - 校验后的请求
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub project_id: i64,
    pub export_file: FileInput,
    pub attachments_zip: Option<FileInput>,
    pub dry_run: bool,
    pub prefix_with_key: bool,
    pub meta_labels: bool,
    pub append_issues_to_description: bool,
    pub embed_test_data_to_description: bool,
    pub on_duplicate: DuplicatePolicy,
}

impl ImportRequest {
    /// 以请求中的开关覆盖基础配置（阈值类配置保持不变）
    pub fn apply_to(&self, base: &ImportConfig) -> ImportConfig {
        ImportConfig {
            prefix_with_key: self.prefix_with_key,
            meta_labels: self.meta_labels,
            append_issues_to_description: self.append_issues_to_description,
            embed_test_data_to_description: self.embed_test_data_to_description,
            on_duplicate: self.on_duplicate,
            ..base.clone()
        }
    }
}

fn field<'a>(fields: &'a RequestFields, name: &str) -> Option<&'a RequestValue> {
    fields.get(name).and_then(RequestValue::unwrap_first)
}

fn coerce_bool(
    fields: &RequestFields,
    name: &str,
    default: bool,
    errors: &mut BTreeMap<String, String>,
) -> bool {
    let parsed = match field(fields, name) {
        None => return default,
        Some(RequestValue::Bool(value)) => Some(*value),
        Some(RequestValue::Int(0)) => Some(false),
        Some(RequestValue::Int(1)) => Some(true),
        Some(RequestValue::Text(text)) => parse_bool_text(text),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| {
        errors.insert(name.to_string(), "must be a boolean".to_string());
        default
    })
}

fn parse_project_id(fields: &RequestFields, errors: &mut BTreeMap<String, String>) -> i64 {
    let project_id = match field(fields, "project_id") {
        None => {
            errors.insert("project_id".into(), "project_id is required".into());
            return 0;
        }
        Some(RequestValue::Int(value)) => Some(*value),
        Some(RequestValue::Text(text))
            if !text.trim().is_empty() && text.trim().chars().all(|c| c.is_ascii_digit()) =>
        {
            text.trim().parse::<i64>().ok()
        }
        Some(_) => None,
    };

    match project_id {
        None => {
            errors.insert("project_id".into(), "project_id must be an integer".into());
            0
        }
        Some(id) if id <= 0 => {
            errors.insert("project_id".into(), "project_id must be positive".into());
            0
        }
        Some(id) => id,
    }
}

/// 校验导入请求
///
/// # 参数
/// - fields: 松散字段表（表单 / JSON / CLI 组装）
///
/// # 返回
/// - Ok(ImportRequest): 全部字段合法
/// - Err(ApiError::Validation): 字段 → 错误信息
pub fn validate_import_request(fields: &RequestFields) -> ApiResult<ImportRequest> {
    let mut errors = BTreeMap::new();

    let project_id = parse_project_id(fields, &mut errors);

    let export_file = field(fields, "export_file")
        .or_else(|| field(fields, "xml_file"))
        .and_then(FileInput::from_value);
    if export_file.is_none() {
        errors.insert("xml_file".into(), "xml_file is required".into());
    }

    let attachments_zip = match field(fields, "attachments_zip") {
        None => None,
        Some(value) => {
            let input = FileInput::from_value(value);
            if input.is_none() {
                errors.insert(
                    "attachments_zip".into(),
                    "attachments_zip must be a file".into(),
                );
            }
            input
        }
    };

    let dry_run = coerce_bool(fields, "dry_run", false, &mut errors);
    let prefix_with_key = coerce_bool(fields, "prefix_with_zephyr_key", true, &mut errors);
    let meta_labels = coerce_bool(fields, "meta_labels", true, &mut errors);
    let append_issues_to_description =
        coerce_bool(fields, "append_jira_issues_to_description", true, &mut errors);
    let embed_test_data_to_description =
        coerce_bool(fields, "embed_testdata_to_description", true, &mut errors);

    let on_duplicate = match field(fields, "on_duplicate") {
        None => DuplicatePolicy::Skip,
        Some(RequestValue::Text(text)) => text.parse().unwrap_or_else(|message: String| {
            errors.insert("on_duplicate".into(), message);
            DuplicatePolicy::Skip
        }),
        Some(_) => {
            errors.insert(
                "on_duplicate".into(),
                "on_duplicate must be 'skip' or 'upsert'".into(),
            );
            DuplicatePolicy::Skip
        }
    };

    match export_file {
        Some(export_file) if errors.is_empty() => Ok(ImportRequest {
            project_id,
            export_file,
            attachments_zip,
            dry_run,
            prefix_with_key,
            meta_labels,
            append_issues_to_description,
            embed_test_data_to_description,
            on_duplicate,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

/// 宽松读取 dry_run（错误响应回显用，不报错）
pub fn lenient_dry_run(fields: &RequestFields) -> bool {
    match field(fields, "dry_run") {
        Some(RequestValue::Bool(value)) => *value,
        Some(RequestValue::Int(value)) => *value == 1,
        Some(RequestValue::Text(text)) => parse_bool_text(text).unwrap_or(false),
        _ => false,
    }
}
