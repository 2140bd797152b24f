// ==========================================
// SQLite 目标库集成测试
// ==========================================
// 测试目标: 验证 SqliteTargetStore 与内存目标库行为一致，以及配置覆盖
// ==========================================


use zephyr_import::config::{config_keys, ConfigManager};
use zephyr_import::logging;
use zephyr_import::{
    AttachmentArchive, DuplicatePolicy, ExportFormat, ExportSource, ImportAction,
    ImportOutcome, InMemoryTargetStore, SqliteTargetStore, TargetStore, ZephyrImporter,
};
use test_helpers::{create_test_db, sample_zip, SAMPLE_XML};

const PROJECT_ID: i64 = 3;

fn import_sample(importer: &ZephyrImporter, store: &dyn TargetStore, xml: &str) -> ImportOutcome {
    let mut source = ExportSource::from_bytes(xml.as_bytes().to_vec());
    let mut archive = AttachmentArchive::from_bytes(sample_zip().unwrap()).unwrap();
    importer
        .import_into(store, PROJECT_ID, &mut source, ExportFormat::Xml, Some(&mut archive))
        .unwrap()
}

#[test]
fn test_sqlite_matches_memory_store() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let sqlite = SqliteTargetStore::new(&db_path).unwrap();
    let memory = InMemoryTargetStore::new();
    let importer = ZephyrImporter::default();

    let from_sqlite = import_sample(&importer, &sqlite, SAMPLE_XML);
    let from_memory = import_sample(&importer, &memory, SAMPLE_XML);

    assert_eq!(from_sqlite.summary, from_memory.summary);
    let actions = |o: &ImportOutcome| o.rows.iter().map(|r| r.action).collect::<Vec<_>>();
    assert_eq!(actions(&from_sqlite), actions(&from_memory));
    let warnings = |o: &ImportOutcome| o.rows.iter().map(|r| r.warnings.clone()).collect::<Vec<_>>();
    assert_eq!(warnings(&from_sqlite), warnings(&from_memory));

    assert_eq!(sqlite.count_cases(PROJECT_ID).unwrap(), 3);
    assert_eq!(
        sqlite.count_suites(PROJECT_ID).unwrap(),
        memory.suites().unwrap().len() as i64
    );

    let login_id = from_sqlite.rows[0].case_id.unwrap();
    assert_eq!(
        sqlite.labels(login_id).unwrap(),
        memory.cases().unwrap()[0].labels
    );
    assert_eq!(sqlite.step_names(login_id).unwrap(), vec!["Step 1", "Step 2"]);
    assert_eq!(sqlite.attachment_names(login_id).unwrap(), vec!["login.png"]);

    let (name, scenario) = sqlite.case_text(login_id).unwrap().unwrap();
    assert_eq!(name, "[EX-1] Login works");
    assert!(scenario.starts_with("Step 1\nOpen login page\nExpected:\nPage opens"));
}

#[test]
fn test_sqlite_skip_then_upsert() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = SqliteTargetStore::new(&db_path).unwrap();

    let first = import_sample(&ZephyrImporter::default(), &store, SAMPLE_XML);
    assert_eq!(first.summary.created, 3);

    let second = import_sample(&ZephyrImporter::default(), &store, SAMPLE_XML);
    assert_eq!(second.summary.reused, 3);
    assert_eq!(store.count_cases(PROJECT_ID).unwrap(), 3);
    // skip 不重复上传附件
    let login_id = first.rows[0].case_id.unwrap();
    assert_eq!(store.attachment_names(login_id).unwrap().len(), 1);

    let upsert = ZephyrImporter::new(zephyr_import::ImportConfig {
        on_duplicate: DuplicatePolicy::Upsert,
        meta_labels: false,
        ..Default::default()
    });
    let changed = SAMPLE_XML.replace("Open login page", "Open the login page");
    let third = import_sample(&upsert, &store, &changed);
    assert!(third.rows.iter().all(|r| r.action == ImportAction::Updated));
    assert_eq!(third.rows[0].case_id, Some(login_id));
    assert_eq!(store.count_cases(PROJECT_ID).unwrap(), 3);
    assert_eq!(store.labels(login_id).unwrap(), vec!["smoke", "ui, forms"]);
    assert_eq!(store.step_names(login_id).unwrap().len(), 2);

    let (_, scenario) = store.case_text(login_id).unwrap().unwrap();
    assert!(scenario.contains("Open the login page"));
}

#[test]
fn test_config_overrides_drive_importer() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let config = ConfigManager::new(&db_path).unwrap();
    config
        .set_global_config_value(config_keys::PREFIX_WITH_ZEPHYR_KEY, "false")
        .unwrap();
    config
        .set_global_config_value(config_keys::ON_DUPLICATE, "upsert")
        .unwrap();
    config
        .set_global_config_value(config_keys::MAX_NAME_LENGTH, "5")
        .unwrap();

    let importer = ZephyrImporter::from_config_reader(&config).unwrap();
    assert_eq!(importer.config().on_duplicate, DuplicatePolicy::Upsert);
    assert!(!importer.config().prefix_with_key);

    let store = SqliteTargetStore::new(&db_path).unwrap();
    let outcome = import_sample(&importer, &store, SAMPLE_XML);

    let login_id = outcome.rows[0].case_id.unwrap();
    let (name, _) = store.case_text(login_id).unwrap().unwrap();
    assert_eq!(name, "Login works");
    assert!(outcome.rows[0]
        .warnings
        .contains(&"Test case name too long (11 > 5) for EX-1".to_string()));
}

#[test]
fn test_invalid_config_value_falls_back_to_default() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let config = ConfigManager::new(&db_path).unwrap();
    config
        .set_global_config_value(config_keys::WARNING_PREVIEW_LIMIT, "lots")
        .unwrap();
    config
        .set_global_config_value(config_keys::ON_DUPLICATE, "merge")
        .unwrap();

    let importer = ZephyrImporter::from_config_reader(&config).unwrap();
    assert_eq!(importer.config().warning_preview_limit, 50);
    assert_eq!(importer.config().on_duplicate, DuplicatePolicy::Skip);
}
