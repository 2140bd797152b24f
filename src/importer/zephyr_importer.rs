// ==========================================
// Zephyr 导入工具 - 导入器（编排）
// ==========================================
// 职责: 整合导入流程，从导出文件到目标库
// 流程: 扫描(文件夹/业务键) → 预创建套件 → 逐条 映射 → 校验 → 附件匹配 → 对账 → 报告
// 红线: 单条用例的失败不跨越用例边界，只体现在报告行与计数上
// 约束: 顺序单线程处理，按源顺序逐条写入
// ==========================================

use crate::config::{ImportConfig, ImportConfigReader};
use crate::domain::import_run::{ImportOutcome, ImportSummary, ReportRow};
use crate::domain::payload::CasePayload;
use crate::domain::types::{DuplicatePolicy, ExportFormat, ImportAction};
use crate::domain::zephyr::{ExportScan, ZephyrTestCase};
use crate::importer::attachment_matcher::{
    basename, match_attachments, AttachmentArchive, AttachmentIndex, AttachmentMatch,
};
use crate::importer::error::ImportResult;
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::parser_for;
use crate::importer::report::{build_csv_report, dedup_warnings};
use crate::importer::source::ExportSource;
use crate::importer::suite_resolver::SuiteResolver;
use crate::importer::validator::CaseValidator;
use crate::repository::error::RepositoryResult;
use crate::repository::target_store::TargetStore;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// upsert 回退时的告警
pub const UPSERT_UNSUPPORTED_WARNING: &str =
    "Upsert requested but adapter does not support updates";

// ==========================================
// PreparedCase - 单条用例的映射/校验结果
// ==========================================
struct PreparedCase {
    payload: CasePayload,
    warnings: Vec<String>,
    attachments: AttachmentMatch,
}

// ==========================================
// ZephyrImporter - 导入器
// ==========================================
#[derive(Debug, Clone)]
pub struct ZephyrImporter {
    config: ImportConfig,
    mapper: FieldMapper,
    validator: CaseValidator,
}

impl Default for ZephyrImporter {
    fn default() -> Self {
        Self::new(ImportConfig::default())
    }
}

impl ZephyrImporter {
    /// 创建导入器
    ///
    /// # 参数
    /// - config: 导入配置（映射开关 / 重复策略 / 阈值）
    pub fn new(config: ImportConfig) -> Self {
        Self {
            mapper: FieldMapper::new(config.mapping_options()),
            validator: CaseValidator::new(config.max_name_length),
            config,
        }
    }

    /// 从配置读取器创建导入器
    pub fn from_config_reader<C: ImportConfigReader>(reader: &C) -> ImportResult<Self> {
        Ok(Self::new(reader.get_import_config()?))
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    // ==========================================
    // dry run
    // ==========================================

    /// 预演导入：不访问目标库，所有用例报告为 created
    ///
    /// # 参数
    /// - source: 可回绕的导出数据源
    /// - format: 导出格式
    /// - archive: 附件压缩包（可选，仅用于匹配统计）
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 告警截断为预览上限
    /// - Err: 运行级错误（结构损坏等）
    #[instrument(skip(self, source, archive), fields(run_id))]
    pub fn dry_run(
        &self,
        source: &mut ExportSource,
        format: ExportFormat,
        archive: Option<&AttachmentArchive>,
    ) -> ImportResult<ImportOutcome> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        info!(run_id = %run_id, format = %format, "开始预演导入");

        let parser = parser_for(format);

        // === 步骤 1: 扫描文件夹与业务键 ===
        debug!("步骤 1: 扫描导出文件");
        let scan = parser.scan(source).map_err(|e| {
            error!(error = %e, "导出文件扫描失败");
            e
        })?;
        info!(folders = scan.folders.len(), keys = scan.key_counts.len(), "扫描完成");

        let index = archive.map(AttachmentArchive::index);
        let mut summary = ImportSummary {
            folders: scan.folders.len(),
            ..Default::default()
        };
        let mut rows = Vec::new();
        let mut warnings = WarningCollector::default();

        // === 步骤 2: 逐条映射与校验 ===
        debug!("步骤 2: 逐条映射与校验");
        for case in parser.cases(source)? {
            let case = case?;
            let prepared = self.prepare_case(&case, &scan, index);

            let mut row = base_row(&case, &prepared);
            row.action = ImportAction::Created;
            row.attachments_attached = prepared.attachments.attached;
            row.warnings = prepared.warnings;

            accumulate(&mut summary, &row);
            summary.record_action(ImportAction::Created, false);
            warnings.extend(&row.warnings);
            rows.push(row);
        }

        // === 步骤 3: 生成报告 ===
        debug!("步骤 3: 生成报告");
        let report_csv = build_csv_report(&rows)?;
        let mut preview = warnings.into_vec();
        preview.truncate(self.config.warning_preview_limit);

        let elapsed_ms = (Utc::now() - started_at).num_milliseconds();
        info!(
            run_id = %run_id,
            cases = summary.cases,
            warnings = preview.len(),
            elapsed_ms,
            "预演导入完成"
        );

        Ok(ImportOutcome {
            run_id,
            dry_run: true,
            summary,
            rows,
            report_csv,
            warnings: preview,
            started_at,
            elapsed_ms,
        })
    }

    // ==========================================
    // 实际导入
    // ==========================================

    /// 导入到目标库（按业务键幂等）
    ///
    /// # 参数
    /// - store: 目标库
    /// - project_id: 目标项目
    /// - source: 可回绕的导出数据源
    /// - format: 导出格式
    /// - archive: 附件压缩包（可选）
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 含完整去重告警
    /// - Err: 运行级错误（结构损坏 / 套件预创建失败）
    #[instrument(skip(self, store, source, archive), fields(run_id))]
    pub fn import_into(
        &self,
        store: &dyn TargetStore,
        project_id: i64,
        source: &mut ExportSource,
        format: ExportFormat,
        mut archive: Option<&mut AttachmentArchive>,
    ) -> ImportResult<ImportOutcome> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("run_id", run_id.as_str());
        info!(
            run_id = %run_id,
            project_id,
            format = %format,
            on_duplicate = %self.config.on_duplicate,
            "开始导入"
        );

        let parser = parser_for(format);

        // === 步骤 1: 扫描文件夹与业务键 ===
        debug!("步骤 1: 扫描导出文件");
        let scan = parser.scan(source).map_err(|e| {
            error!(error = %e, "导出文件扫描失败");
            e
        })?;
        info!(folders = scan.folders.len(), keys = scan.key_counts.len(), "扫描完成");

        // === 步骤 2: 预创建套件 ===
        debug!("步骤 2: 预创建套件");
        let mut resolver = SuiteResolver::new(store, project_id, &scan.folders);
        let suites = resolver.precreate_all().map_err(|e| {
            error!(error = %e, "套件预创建失败");
            e
        })?;
        info!(suites, "套件预创建完成");

        let index = archive.as_deref().map(|a| a.index().clone());
        let mut summary = ImportSummary {
            folders: scan.folders.len(),
            ..Default::default()
        };
        let mut rows = Vec::new();
        let mut warnings = WarningCollector::default();

        // === 步骤 3: 逐条对账 ===
        debug!("步骤 3: 逐条对账");
        for case in parser.cases(source)? {
            let case = case?;
            let prepared = self.prepare_case(&case, &scan, index.as_ref());

            let mut row = base_row(&case, &prepared);
            row.warnings = prepared.warnings.clone();

            if let Err(e) = self.reconcile_case(
                store,
                project_id,
                &mut resolver,
                &case,
                &prepared,
                archive.as_deref_mut(),
                &mut row,
            ) {
                warn!(zephyr_key = ?case.trimmed_key(), error = %e, "用例导入失败");
                row.action = ImportAction::Failed;
                row.case_id = None;
                row.error = Some(e.to_string());
            }

            accumulate(&mut summary, &row);
            summary.record_action(row.action, row.case_id.is_some());
            warnings.extend(&row.warnings);
            rows.push(row);
        }

        // === 步骤 4: 生成报告 ===
        debug!("步骤 4: 生成报告");
        let report_csv = build_csv_report(&rows)?;

        let elapsed_ms = (Utc::now() - started_at).num_milliseconds();
        info!(
            run_id = %run_id,
            cases = summary.cases,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_ms,
            "导入完成"
        );

        Ok(ImportOutcome {
            run_id,
            dry_run: false,
            summary,
            rows,
            report_csv,
            warnings: warnings.into_vec(),
            started_at,
            elapsed_ms,
        })
    }

    /// 映射 + 校验 + 附件匹配（纯计算，不访问目标库）
    fn prepare_case(
        &self,
        case: &ZephyrTestCase,
        scan: &ExportScan,
        index: Option<&AttachmentIndex>,
    ) -> PreparedCase {
        let payload = self.mapper.map_case(case);
        let attachments = match_attachments(&case.attachments, index);

        let mut warnings =
            self.validator
                .warnings(case, &payload.name, &scan.key_counts, &scan.folders);
        warnings.extend(attachments.warnings.iter().cloned());

        PreparedCase {
            payload,
            warnings,
            attachments,
        }
    }

    /// 单条用例对账；返回 Err 时由调用方记为 failed
    ///
    /// 标签与附件失败只追加告警，不影响终态
    #[allow(clippy::too_many_arguments)]
    fn reconcile_case(
        &self,
        store: &dyn TargetStore,
        project_id: i64,
        resolver: &mut SuiteResolver<'_>,
        case: &ZephyrTestCase,
        prepared: &PreparedCase,
        archive: Option<&mut AttachmentArchive>,
        row: &mut ReportRow,
    ) -> RepositoryResult<()> {
        let existing_id = match case.trimmed_key() {
            Some(key) => store.find_case_id_by_key(project_id, key)?,
            None => None,
        };

        if let (Some(existing), DuplicatePolicy::Skip) = (existing_id, self.config.on_duplicate) {
            row.action = ImportAction::Skipped;
            row.case_id = Some(existing);
            return Ok(());
        }

        let suite_id = resolver.suite_for_folder(case.folder.as_deref())?;
        row.suite_id = Some(suite_id);

        let payload = prepared.payload.for_write();
        let case_id = match existing_id {
            Some(existing) => {
                match store.update_case_with_steps(project_id, existing, suite_id, &payload) {
                    Ok(()) => row.action = ImportAction::Updated,
                    Err(e) if e.is_unsupported() => {
                        row.action = ImportAction::Skipped;
                        row.warnings.push(UPSERT_UNSUPPORTED_WARNING.to_string());
                    }
                    Err(e) => return Err(e),
                }
                existing
            }
            None => {
                let created = store.create_case_with_steps(project_id, suite_id, &payload)?;
                row.action = ImportAction::Created;
                created
            }
        };
        row.case_id = Some(case_id);

        // 标签单独下发
        if let Err(e) = store.set_labels(case_id, &prepared.payload.labels) {
            row.warnings.push(format!("Failed to set labels: {}", e));
        }

        // 附件逐个上传
        if let Some(archive) = archive {
            for path in &prepared.attachments.matched {
                let uploaded = archive.read(path).map_err(|e| e.to_string()).and_then(|data| {
                    let name = basename(path);
                    let filename = if name.is_empty() { path.as_str() } else { name.as_str() };
                    store
                        .attach_file(project_id, case_id, filename, &data)
                        .map_err(|e| e.to_string())
                });
                match uploaded {
                    Ok(()) => row.attachments_attached += 1,
                    Err(message) => row
                        .warnings
                        .push(format!("Failed to attach '{}': {}", path, message)),
                }
            }
        }

        Ok(())
    }
}

/// 报告行公共字段
fn base_row(case: &ZephyrTestCase, prepared: &PreparedCase) -> ReportRow {
    ReportRow {
        zephyr_key: case.key.clone(),
        zephyr_id: case.zephyr_id.clone(),
        folder_full_path: case.folder.clone(),
        suite_id: None,
        case_id: None,
        action: ImportAction::Created,
        steps_count: prepared.payload.steps.len(),
        labels_count: prepared.payload.labels.len(),
        attachments_in_export: prepared.attachments.in_export,
        attachments_attached: 0,
        attachments_missing: prepared.attachments.missing,
        warnings: Vec::new(),
        error: None,
    }
}

/// 累加体量计数（终态计数由 record_action 负责）
fn accumulate(summary: &mut ImportSummary, row: &ReportRow) {
    summary.cases += 1;
    summary.steps += row.steps_count;
    summary.labels += row.labels_count;
    summary.attachments += row.attachments_in_export;
}

// ==========================================
// WarningCollector - 运行级告警（去重保序）
// ==========================================
#[derive(Debug, Default)]
struct WarningCollector {
    seen: std::collections::HashSet<String>,
    items: Vec<String>,
}

impl WarningCollector {
    fn extend(&mut self, warnings: &[String]) {
        for warning in dedup_warnings(warnings) {
            if self.seen.insert(warning.clone()) {
                self.items.push(warning);
            }
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::memory_store::InMemoryTargetStore;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project>
  <folders>
    <folder fullPath="ui" index="1"/>
    <folder fullPath="ui/forms" index="2"/>
  </folders>
  <testCases>
    <testCase id="10" key="EX-1">
      <name>Login</name>
      <folder>ui/forms</folder>
      <labels><label>smoke</label></labels>
      <testScript type="steps">
        <steps>
          <step index="0"><description>Open login page</description><expectedResult>Shown</expectedResult></step>
          <step index="1"><testData>user=admin</testData></step>
        </steps>
      </testScript>
    </testCase>
    <testCase id="11" key="EX-2">
      <name>Logout</name>
      <testScript type="plain"><text>Click logout</text></testScript>
    </testCase>
  </testCases>
</project>"#;

    fn create_source() -> ExportSource {
        ExportSource::from_bytes(EXPORT.as_bytes().to_vec())
    }

    #[test]
    fn test_dry_run_reports_created() {
        let importer = ZephyrImporter::default();
        let outcome = importer
            .dry_run(&mut create_source(), ExportFormat::Xml, None)
            .unwrap();

        assert!(outcome.dry_run);
        assert_eq!(outcome.summary.cases, 2);
        assert_eq!(outcome.summary.created, 2);
        assert_eq!(outcome.summary.folders, 2);
        assert_eq!(outcome.summary.steps, 2);
        assert!(outcome.rows.iter().all(|r| r.case_id.is_none() && r.suite_id.is_none()));
        assert!(outcome
            .warnings
            .contains(&"Missing folder in Zephyr case EX-2".to_string()));
    }

    #[test]
    fn test_import_then_skip() {
        let store = InMemoryTargetStore::new();
        let importer = ZephyrImporter::default();

        let first = importer
            .import_into(&store, 1, &mut create_source(), ExportFormat::Xml, None)
            .unwrap();
        assert_eq!(first.summary.created, 2);
        assert_eq!(store.cases().unwrap().len(), 2);
        // ui, forms, (No folder)
        assert_eq!(store.suites().unwrap().len(), 3);

        let second = importer
            .import_into(&store, 1, &mut create_source(), ExportFormat::Xml, None)
            .unwrap();
        assert_eq!(second.summary.skipped, 2);
        assert_eq!(second.summary.reused, 2);
        assert_eq!(second.summary.created, 0);
        assert_eq!(store.cases().unwrap().len(), 2);
        assert_eq!(
            second.rows[0].case_id,
            first.rows[0].case_id
        );
    }

    #[test]
    fn test_upsert_unsupported_falls_back_to_skip() {
        let store = InMemoryTargetStore::without_update_support();
        let importer = ZephyrImporter::new(ImportConfig {
            on_duplicate: DuplicatePolicy::Upsert,
            ..Default::default()
        });
        importer
            .import_into(&store, 1, &mut create_source(), ExportFormat::Xml, None)
            .unwrap();
        let again = importer
            .import_into(&store, 1, &mut create_source(), ExportFormat::Xml, None)
            .unwrap();

        assert_eq!(again.summary.skipped, 2);
        assert_eq!(again.summary.reused, 2);
        assert!(again.rows[0]
            .warnings
            .contains(&UPSERT_UNSUPPORTED_WARNING.to_string()));
        assert!(again.rows[0].suite_id.is_some());
    }

    #[test]
    fn test_labels_written_separately() {
        let store = InMemoryTargetStore::new();
        let outcome = ZephyrImporter::default()
            .import_into(&store, 1, &mut create_source(), ExportFormat::Xml, None)
            .unwrap();
        let case_id = outcome.rows[0].case_id.unwrap();
        let stored = store.case(case_id).unwrap().unwrap();
        assert!(stored.payload.labels.is_empty());
        assert_eq!(stored.labels, vec!["smoke"]);
        assert_eq!(outcome.rows[0].labels_count, 1);
    }
}
