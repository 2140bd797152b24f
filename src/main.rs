// ==========================================
// Zephyr 导入工具 - 命令行入口
// ==========================================
// 职责: 组装请求 → ImportApi → 输出摘要 JSON / 写出 CSV 报告
// 目标库: 本地 SQLite（默认位于系统数据目录）
// ==========================================

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use zephyr_import::api::{ImportApi, ImportResponse, RequestFields, RequestValue};
use zephyr_import::config::{ConfigManager, ImportConfigReader};
use zephyr_import::{logging, SqliteTargetStore, APP_NAME, VERSION};

#[derive(Debug, Parser)]
#[command(name = "zephyr-import", version, about = "Zephyr Scale 导出文件导入工具")]
struct Cli {
    /// 导出文件（.xml / .xlsx）
    export: PathBuf,

    /// 附件压缩包（.zip）
    #[arg(long)]
    attachments: Option<PathBuf>,

    /// 只预演，不写目标库
    #[arg(long)]
    dry_run: bool,

    /// 目标库路径（默认: 系统数据目录下的 zephyr-import/target.db）
    #[arg(long)]
    db: Option<PathBuf>,

    /// 目标项目 ID
    #[arg(long, default_value_t = 1)]
    project_id: i64,

    /// 重复键策略: skip | upsert（默认取配置）
    #[arg(long)]
    on_duplicate: Option<String>,

    /// 名称不加 "[KEY] " 前缀
    #[arg(long)]
    no_key_prefix: bool,

    /// 不生成 zephyr:status=... 等元标签
    #[arg(long)]
    no_meta_labels: bool,

    /// CSV 报告输出路径
    #[arg(long)]
    report: Option<PathBuf>,

    /// JSON 格式日志
    #[arg(long)]
    log_json: bool,
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir().context("无法确定系统数据目录")?;
    let dir = base.join(APP_NAME);
    std::fs::create_dir_all(&dir).with_context(|| format!("无法创建目录: {}", dir.display()))?;
    Ok(dir.join("target.db"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logging::init_json();
    } else {
        logging::init();
    }
    tracing::info!(version = VERSION, "Zephyr 导入工具启动");

    // === 打开目标库与配置 ===
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };
    let db_path_str = db_path.to_string_lossy().to_string();
    tracing::info!(db = %db_path_str, "使用目标库");

    let store = SqliteTargetStore::new(&db_path_str).context("目标库初始化失败")?;
    let base_config = ConfigManager::new(&db_path_str)
        .and_then(|manager| manager.get_import_config())
        .context("读取导入配置失败")?;

    // === 组装请求字段（未指定的开关沿用配置）===
    let mut fields = RequestFields::new();
    fields.insert("project_id".into(), RequestValue::Int(cli.project_id));
    fields.insert("export_file".into(), RequestValue::Path(cli.export.clone()));
    if let Some(zip) = &cli.attachments {
        fields.insert("attachments_zip".into(), RequestValue::Path(zip.clone()));
    }
    fields.insert("dry_run".into(), RequestValue::Bool(cli.dry_run));
    fields.insert(
        "prefix_with_zephyr_key".into(),
        RequestValue::Bool(base_config.prefix_with_key && !cli.no_key_prefix),
    );
    fields.insert(
        "meta_labels".into(),
        RequestValue::Bool(base_config.meta_labels && !cli.no_meta_labels),
    );
    fields.insert(
        "append_jira_issues_to_description".into(),
        RequestValue::Bool(base_config.append_issues_to_description),
    );
    fields.insert(
        "embed_testdata_to_description".into(),
        RequestValue::Bool(base_config.embed_test_data_to_description),
    );
    let on_duplicate = cli
        .on_duplicate
        .clone()
        .unwrap_or_else(|| base_config.on_duplicate.to_string());
    fields.insert("on_duplicate".into(), RequestValue::Text(on_duplicate));

    // === 执行 ===
    let api = ImportApi::new(Arc::new(store), base_config);
    let response = api.handle(&fields);

    if let (ImportResponse::Success(success), Some(report_path)) = (&response, &cli.report) {
        std::fs::write(report_path, &success.report_csv)
            .with_context(|| format!("写入报告失败: {}", report_path.display()))?;
        tracing::info!(report = %report_path.display(), "报告已写出");
    }

    // 指定 --report 时 JSON 不再携带 report_csv
    let mut output = serde_json::to_value(&response)?;
    if cli.report.is_some() {
        if let Some(obj) = output.as_object_mut() {
            obj.remove("report_csv");
        }
    }
    println!("{}", serde_json::to_string_pretty(&output)?);

    if !response.is_success() {
        bail!("导入失败");
    }
    Ok(())
}
