// ==========================================
// Zephyr 导入工具 - 导入API
// ==========================================
// 职责: 请求校验 → 预演/导入 → 可序列化响应
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::api::request::{lenient_dry_run, validate_import_request, ImportRequest, RequestFields};
use crate::config::ImportConfig;
use crate::domain::import_run::ImportSummary;
use crate::importer::ZephyrImporter;
use crate::repository::TargetStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 导入成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    /// 固定为 "success"
    pub status: String,
    pub dry_run: bool,
    /// 本次运行 ID
    pub run_id: String,
    pub summary: ImportSummary,
    /// CSV 审计报告
    pub report_csv: String,
    /// 去重后的告警（dry run 截断为预览上限）
    pub warnings: Vec<String>,
    /// 耗时（毫秒）
    pub elapsed_ms: i64,
}

/// 失败响应中的错误信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseErrors {
    /// 字段校验错误
    Fields(BTreeMap<String, String>),
    /// 运行级错误
    Messages(Vec<String>),
}

/// 导入失败响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFailureResponse {
    /// 固定为 "failed"
    pub status: String,
    pub errors: ResponseErrors,
    pub dry_run: bool,
}

/// 统一响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportResponse {
    Success(ImportApiResponse),
    Failed(ImportFailureResponse),
}

impl ImportResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportResponse::Success(_))
    }
}

/// 健康检查响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub plugin: String,
    pub version: String,
}

/// 导入API
pub struct ImportApi {
    store: Arc<dyn TargetStore>,
    base_config: ImportConfig,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    ///
    /// # 参数
    /// - store: 目标库
    /// - base_config: 基础配置（请求中的开关会覆盖其中的映射选项与重复策略）
    pub fn new(store: Arc<dyn TargetStore>, base_config: ImportConfig) -> Self {
        Self { store, base_config }
    }

    /// 执行已校验的请求
    ///
    /// # 返回
    /// - Ok(ImportApiResponse): 导入结果
    /// - Err(ApiError): 运行级错误
    pub fn run(&self, request: &ImportRequest) -> ApiResult<ImportApiResponse> {
        let importer = ZephyrImporter::new(request.apply_to(&self.base_config));

        let mut source = request.export_file.open_source()?;
        let format = request.export_file.detect_format(&mut source)?;
        let mut archive = match &request.attachments_zip {
            Some(input) => Some(input.open_archive()?),
            None => None,
        };

        let outcome = if request.dry_run {
            importer.dry_run(&mut source, format, archive.as_ref())?
        } else {
            importer.import_into(
                self.store.as_ref(),
                request.project_id,
                &mut source,
                format,
                archive.as_mut(),
            )?
        };

        Ok(ImportApiResponse {
            status: "success".to_string(),
            dry_run: outcome.dry_run,
            run_id: outcome.run_id,
            summary: outcome.summary,
            report_csv: outcome.report_csv,
            warnings: outcome.warnings,
            elapsed_ms: outcome.elapsed_ms,
        })
    }

    /// 处理松散字段请求（校验 + 执行）
    pub fn handle(&self, fields: &RequestFields) -> ImportResponse {
        let dry_run = lenient_dry_run(fields);

        let request = match validate_import_request(fields) {
            Ok(request) => request,
            Err(ApiError::Validation(errors)) => {
                warn!(fields = ?errors.keys().collect::<Vec<_>>(), "导入请求校验失败");
                return failure(ResponseErrors::Fields(errors), dry_run);
            }
            Err(other) => {
                let mut errors = BTreeMap::new();
                errors.insert("detail".to_string(), other.to_string());
                return failure(ResponseErrors::Fields(errors), dry_run);
            }
        };

        match self.run(&request) {
            Ok(response) => {
                info!(
                    run_id = %response.run_id,
                    dry_run = response.dry_run,
                    cases = response.summary.cases,
                    "导入请求处理完成"
                );
                ImportResponse::Success(response)
            }
            Err(e) => {
                error!(error = %e, "导入请求处理失败");
                failure(ResponseErrors::Messages(vec![e.to_string()]), request.dry_run)
            }
        }
    }

    /// 健康检查
    pub fn health() -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
            plugin: crate::APP_NAME.to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

fn failure(errors: ResponseErrors, dry_run: bool) -> ImportResponse {
    ImportResponse::Failed(ImportFailureResponse {
        status: "failed".to_string(),
        errors,
        dry_run,
    })
}
