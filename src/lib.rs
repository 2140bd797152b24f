// ==========================================
// Zephyr 导入工具 - 核心库
// ==========================================
// 职责: Zephyr Scale 导出 (XML/XLSX) → 目标用例库的幂等导入
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录与类型
pub mod domain;

// 目标库层 - 数据访问
pub mod repository;

// 导入层 - 解析/映射/对账
pub mod importer;

// 配置层 - 导入选项
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 请求校验与响应
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DuplicatePolicy, ExportFormat, ImportAction, ScriptKind};

// 领域实体
pub use domain::{
    CasePayload, FolderRegistry, ImportOutcome, ImportSummary, ReportRow, ZephyrFolder,
    ZephyrStep, ZephyrTestCase,
};

// 导入
pub use importer::{AttachmentArchive, ExportSource, ImportError, ImportResult, ZephyrImporter};

// 目标库
pub use repository::{InMemoryTargetStore, SqliteTargetStore, TargetStore};

// 配置
pub use config::{ConfigManager, ImportConfig};

// API
pub use api::{ImportApi, ImportResponse};

// ==========================================
// 常量定义
// ==========================================

// 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 名称
pub const APP_NAME: &str = "zephyr-import";
