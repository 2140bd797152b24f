// ==========================================
// ZephyrImporter 集成测试
// ==========================================
// 测试目标: 验证完整的导入流程（扫描 → 预创建套件 → 对账 → 报告）
// ==========================================


use std::collections::HashSet;
use std::io::Read;
use zephyr_import::domain::payload::{CasePayload, SuiteAttributes};
use zephyr_import::importer::AttachmentArchive;
use zephyr_import::logging;
use zephyr_import::repository::{RepositoryError, RepositoryResult};
use zephyr_import::{
    DuplicatePolicy, ExportFormat, ExportSource, ImportAction, ImportConfig, ImportError,
    ImportOutcome, InMemoryTargetStore, TargetStore, ZephyrImporter,
};
use test_helpers::{generate_xml_export, parse_report, sample_zip, SAMPLE_XML};

const PROJECT_ID: i64 = 7;

fn run_import(
    importer: &ZephyrImporter,
    store: &dyn TargetStore,
    xml: &str,
    archive: Option<&mut AttachmentArchive>,
) -> ImportOutcome {
    let mut source = ExportSource::from_bytes(xml.as_bytes().to_vec());
    importer
        .import_into(store, PROJECT_ID, &mut source, ExportFormat::Xml, archive)
        .expect("导入失败")
}

fn upsert_importer() -> ZephyrImporter {
    ZephyrImporter::new(ImportConfig {
        on_duplicate: DuplicatePolicy::Upsert,
        ..Default::default()
    })
}

fn assert_counter_identity(outcome: &ImportOutcome) {
    let s = &outcome.summary;
    assert_eq!(s.created + s.reused + s.updated + s.failed, s.cases);
    assert_eq!(s.cases, outcome.rows.len());
    assert!(s.reused <= s.skipped);
}

// ==========================================
// FlakyStore - 按规则注入失败的目标库
// ==========================================
struct FlakyStore {
    inner: InMemoryTargetStore,
    fail_create_keys: HashSet<String>,
    fail_labels: bool,
    fail_attach_names: HashSet<String>,
}

impl FlakyStore {
    fn new(inner: InMemoryTargetStore) -> Self {
        Self {
            inner,
            fail_create_keys: HashSet::new(),
            fail_labels: false,
            fail_attach_names: HashSet::new(),
        }
    }
}

impl TargetStore for FlakyStore {
    fn find_case_id_by_key(&self, project_id: i64, key: &str) -> RepositoryResult<Option<i64>> {
        self.inner.find_case_id_by_key(project_id, key)
    }

    fn get_suite_id(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Option<i64>> {
        self.inner.get_suite_id(project_id, parent_id, name)
    }

    fn create_suite(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
        attributes: &SuiteAttributes,
    ) -> RepositoryResult<i64> {
        self.inner.create_suite(project_id, parent_id, name, attributes)
    }

    fn create_case_with_steps(
        &self,
        project_id: i64,
        suite_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<i64> {
        if let Some(key) = payload.zephyr_key() {
            if self.fail_create_keys.contains(key) {
                return Err(RepositoryError::InternalError(format!("boom {}", key)));
            }
        }
        self.inner.create_case_with_steps(project_id, suite_id, payload)
    }

    fn set_labels(&self, case_id: i64, labels: &[String]) -> RepositoryResult<()> {
        if self.fail_labels {
            return Err(RepositoryError::InternalError("labels offline".to_string()));
        }
        self.inner.set_labels(case_id, labels)
    }

    fn attach_file(
        &self,
        project_id: i64,
        case_id: i64,
        filename: &str,
        content: &[u8],
    ) -> RepositoryResult<()> {
        if self.fail_attach_names.contains(filename) {
            return Err(RepositoryError::InternalError("upload rejected".to_string()));
        }
        self.inner.attach_file(project_id, case_id, filename, content)
    }
}

// ==========================================
// 基本流程
// ==========================================

#[test]
fn test_import_sample_creates_cases_and_suites() {
    logging::init_test();
    let store = InMemoryTargetStore::new();
    let outcome = run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, None);

    assert!(!outcome.dry_run);
    assert_eq!(outcome.summary.folders, 3);
    assert_eq!(outcome.summary.cases, 3);
    assert_eq!(outcome.summary.created, 3);
    assert_eq!(outcome.summary.steps, 2);
    assert_eq!(outcome.summary.labels, 6);
    assert_eq!(outcome.summary.attachments, 3);
    assert_counter_identity(&outcome);

    // ui, forms, api, auth + (No folder)
    let suites = store.suites().unwrap();
    assert_eq!(suites.len(), 5);
    assert!(suites.iter().any(|s| s.name == "(No folder)"));

    let cases = store.cases().unwrap();
    assert_eq!(cases.len(), 3);
    let login = &cases[0];
    assert_eq!(login.payload.name, "[EX-1] Login works");
    assert!(login.payload.is_steps);
    assert_eq!(login.payload.steps.len(), 2);
    assert_eq!(login.payload.steps[1].name, "Step 2");
    assert!(login.payload.labels.is_empty());
    assert_eq!(
        login.labels,
        vec![
            "smoke",
            "ui, forms",
            "zephyr:status=Approved",
            "zephyr:priority=High",
            "zephyr:owner=alice"
        ]
    );

    let orphan = &cases[2];
    assert_eq!(orphan.payload.name, "[EX-3] Orphan case");
    assert!(!orphan.payload.scenario.is_empty());
}

#[test]
fn test_precreates_every_registered_folder() {
    logging::init_test();
    let xml = r#"<project>
  <folders>
    <folder fullPath="ui" index="1"/>
    <folder fullPath="ui/forms" index="2"/>
    <folder fullPath="api/auth" index="3"/>
  </folders>
  <testCases>
    <testCase id="1" key="PC-1"><name>Only ui</name><folder>ui</folder></testCase>
  </testCases>
</project>"#;
    let store = InMemoryTargetStore::new();
    run_import(&ZephyrImporter::default(), &store, xml, None);

    let suites = store.suites().unwrap();
    let mut names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["api", "auth", "forms", "ui"]);

    let auth = suites.iter().find(|s| s.name == "auth").unwrap();
    let api = suites.iter().find(|s| s.name == "api").unwrap();
    assert_eq!(auth.parent_id, Some(api.id));
    assert_eq!(auth.attributes.zephyr.folder_full_path.as_deref(), Some("api/auth"));
}

#[test]
fn test_skip_policy_is_idempotent() {
    logging::init_test();
    let store = InMemoryTargetStore::new();
    let importer = ZephyrImporter::default();

    let first = run_import(&importer, &store, SAMPLE_XML, None);
    let first_ids: Vec<Option<i64>> = first.rows.iter().map(|r| r.case_id).collect();

    let second = run_import(&importer, &store, SAMPLE_XML, None);
    assert_eq!(second.summary.created, 0);
    assert_eq!(second.summary.skipped, 3);
    assert_eq!(second.summary.reused, 3);
    assert_counter_identity(&second);

    let second_ids: Vec<Option<i64>> = second.rows.iter().map(|r| r.case_id).collect();
    assert_eq!(first_ids, second_ids);
    assert!(second.rows.iter().all(|r| r.action == ImportAction::Skipped));
    assert_eq!(store.cases().unwrap().len(), 3);
    assert_eq!(store.suites().unwrap().len(), 5);
}

#[test]
fn test_upsert_updates_existing_case() {
    logging::init_test();
    let store = InMemoryTargetStore::new();
    run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, None);

    let renamed = SAMPLE_XML.replace("Login works", "Login still works");
    let outcome = run_import(&upsert_importer(), &store, &renamed, None);

    assert_eq!(outcome.summary.updated, 3);
    assert_eq!(outcome.summary.created, 0);
    assert_counter_identity(&outcome);

    let case_id = outcome.rows[0].case_id.unwrap();
    let stored = store.case(case_id).unwrap().unwrap();
    assert_eq!(stored.payload.name, "[EX-1] Login still works");
    assert_eq!(stored.labels.len(), 5);
    assert_eq!(store.cases().unwrap().len(), 3);
}

#[test]
fn test_upsert_without_adapter_support_falls_back_to_skip() {
    logging::init_test();
    let store = InMemoryTargetStore::without_update_support();
    run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, None);

    let outcome = run_import(&upsert_importer(), &store, SAMPLE_XML, None);
    assert_eq!(outcome.summary.skipped, 3);
    assert_eq!(outcome.summary.reused, 3);
    assert_eq!(outcome.summary.updated, 0);
    assert!(outcome
        .warnings
        .contains(&"Upsert requested but adapter does not support updates".to_string()));
    assert!(outcome.rows.iter().all(|r| r.case_id.is_some()));
    assert_counter_identity(&outcome);
}

// ==========================================
// 告警
// ==========================================

#[test]
fn test_dry_run_truncates_warning_preview() {
    logging::init_test();
    let xml = generate_xml_export(52);
    let importer = ZephyrImporter::default();

    let mut source = ExportSource::from_bytes(xml.as_bytes().to_vec());
    let preview = importer.dry_run(&mut source, ExportFormat::Xml, None).unwrap();
    assert!(preview.dry_run);
    assert_eq!(preview.summary.cases, 52);
    assert_eq!(preview.summary.created, 52);
    assert_eq!(preview.warnings.len(), 50);
    assert!(preview.rows.iter().all(|r| r.case_id.is_none() && r.suite_id.is_none()));

    let store = InMemoryTargetStore::new();
    let outcome = run_import(&importer, &store, &xml, None);
    assert_eq!(outcome.warnings.len(), 52);
    assert_eq!(
        outcome.warnings[0],
        "Folder not found in Zephyr export: area-1 for case GEN-1"
    );
}

#[test]
fn test_duplicate_key_warned_on_every_row() {
    logging::init_test();
    let xml = r#"<project>
  <folders><folder fullPath="ui" index="1"/></folders>
  <testCases>
    <testCase id="1" key="DUP-1"><name>First</name><folder>ui</folder></testCase>
    <testCase id="2" key=" DUP-1 "><name>Second</name><folder>ui</folder></testCase>
  </testCases>
</project>"#;
    let store = InMemoryTargetStore::new();
    let outcome = run_import(&ZephyrImporter::default(), &store, xml, None);

    let expected = "Duplicate Zephyr key in XML: DUP-1".to_string();
    assert!(outcome.rows.iter().all(|r| r.warnings.contains(&expected)));
    // 运行级告警去重
    assert_eq!(outcome.warnings.iter().filter(|w| **w == expected).count(), 1);

    // 第二条在第一条写入后命中已有用例
    assert_eq!(outcome.rows[0].action, ImportAction::Created);
    assert_eq!(outcome.rows[1].action, ImportAction::Skipped);
    assert_eq!(outcome.rows[1].case_id, outcome.rows[0].case_id);
    assert_counter_identity(&outcome);
}

// ==========================================
// 附件
// ==========================================

#[test]
fn test_attachments_uploaded_from_zip() {
    logging::init_test();
    let mut archive = AttachmentArchive::from_bytes(sample_zip().unwrap()).unwrap();
    let store = InMemoryTargetStore::new();
    let outcome = run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, Some(&mut archive));

    let login = &outcome.rows[0];
    assert_eq!(login.attachments_in_export, 2);
    assert_eq!(login.attachments_attached, 1);
    assert_eq!(login.attachments_missing, 1);
    assert!(login
        .warnings
        .contains(&"Attachment missing in ZIP: missing.txt".to_string()));

    let token = &outcome.rows[1];
    assert_eq!(token.attachments_attached, 1);
    assert_eq!(token.attachments_missing, 0);

    let stored = store.case(token.case_id.unwrap()).unwrap().unwrap();
    assert_eq!(stored.attachments.len(), 1);
    assert_eq!(stored.attachments[0].0, "spec.pdf");
    assert_eq!(stored.attachments[0].1, b"%PDF-1.4".to_vec());
}

#[test]
fn test_without_zip_every_attachment_is_missing() {
    logging::init_test();
    let store = InMemoryTargetStore::new();
    let outcome = run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, None);

    let missing: usize = outcome.rows.iter().map(|r| r.attachments_missing).sum();
    assert_eq!(missing, 3);
    assert!(outcome
        .warnings
        .contains(&"Attachment missing in ZIP: docs/spec.pdf".to_string()));
    assert!(store
        .cases()
        .unwrap()
        .iter()
        .all(|c| c.attachments.is_empty()));
}

#[test]
fn test_label_and_upload_failures_are_warnings() {
    logging::init_test();
    let mut store = FlakyStore::new(InMemoryTargetStore::new());
    store.fail_labels = true;
    store.fail_attach_names.insert("login.png".to_string());

    let mut archive = AttachmentArchive::from_bytes(sample_zip().unwrap()).unwrap();
    let outcome = run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, Some(&mut archive));

    assert_eq!(outcome.summary.created, 3);
    assert_eq!(outcome.summary.failed, 0);

    let login = &outcome.rows[0];
    assert_eq!(login.action, ImportAction::Created);
    assert_eq!(login.attachments_attached, 0);
    assert!(login
        .warnings
        .iter()
        .any(|w| w.starts_with("Failed to set labels:") && w.contains("labels offline")));
    assert!(login.warnings.iter().any(|w| {
        w.starts_with("Failed to attach 'attachments/login.png':") && w.contains("upload rejected")
    }));
    assert_eq!(outcome.rows[1].attachments_attached, 1);
}

// ==========================================
// 失败隔离
// ==========================================

#[test]
fn test_adapter_failure_becomes_failed_row() {
    logging::init_test();
    let mut store = FlakyStore::new(InMemoryTargetStore::new());
    store.fail_create_keys.insert("EX-2".to_string());

    let outcome = run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, None);
    assert_eq!(outcome.summary.created, 2);
    assert_eq!(outcome.summary.failed, 1);
    assert_counter_identity(&outcome);

    let failed = &outcome.rows[1];
    assert_eq!(failed.action, ImportAction::Failed);
    assert!(failed.case_id.is_none());
    assert!(failed.suite_id.is_some());
    assert!(failed.error.as_deref().unwrap_or_default().contains("boom EX-2"));

    let report = parse_report(&outcome.report_csv).unwrap();
    assert_eq!(report.len(), 3);
    assert_eq!(report[1]["action"], "failed");
    assert_eq!(report[1]["testy_case_id"], "");
    assert_eq!(report[2]["action"], "created");
}

#[test]
fn test_malformed_xml_is_run_error() {
    logging::init_test();
    let store = InMemoryTargetStore::new();
    let mut source = ExportSource::from_bytes(
        b"<project><testCases><testCase key=\"X-1\"><name>x</testCase>".to_vec(),
    );
    let result = ZephyrImporter::default().import_into(
        &store,
        PROJECT_ID,
        &mut source,
        ExportFormat::Xml,
        None,
    );
    assert!(matches!(result, Err(ImportError::XmlParseError { .. })));
    assert!(store.cases().unwrap().is_empty());
}

// ==========================================
// 报告 / 数据源
// ==========================================

#[test]
fn test_report_rows_follow_source_order() {
    logging::init_test();
    let store = InMemoryTargetStore::new();
    let outcome = run_import(&ZephyrImporter::default(), &store, SAMPLE_XML, None);

    assert!(outcome.report_csv.starts_with(
        "zephyr_key,zephyr_id,folder_full_path,testy_suite_id,testy_case_id,action,"
    ));
    let report = parse_report(&outcome.report_csv).unwrap();
    let keys: Vec<&str> = report.iter().map(|r| r["zephyr_key"].as_str()).collect();
    assert_eq!(keys, vec!["EX-1", "EX-2", "EX-3"]);
    assert_eq!(report[0]["folder_full_path"], "ui/forms");
    assert_eq!(report[0]["steps_count"], "2");
    assert_eq!(report[0]["labels_count"], "5");
    assert_eq!(report[2]["folder_full_path"], "");
    assert_eq!(report[2]["warnings"], "Missing folder in Zephyr case EX-3");
}

/// 只能顺序读取一次的输入
struct OneShotReader<R: Read>(R);

impl<R: Read> Read for OneShotReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

#[test]
fn test_non_seekable_reader_is_spooled() {
    logging::init_test();
    let reader = OneShotReader(SAMPLE_XML.as_bytes());
    let mut source = ExportSource::from_reader(reader).unwrap();
    assert!(source.is_spooled());

    let store = InMemoryTargetStore::new();
    let outcome = ZephyrImporter::default()
        .import_into(&store, PROJECT_ID, &mut source, ExportFormat::Xml, None)
        .unwrap();
    assert_eq!(outcome.summary.folders, 3);
    assert_eq!(outcome.summary.created, 3);
}
