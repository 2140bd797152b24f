// ==========================================
// Zephyr 导入工具 - 领域模型层
// ==========================================
// 职责: 定义解析记录、写入载荷、运行结果与共享枚举
// 红线: 不含数据访问逻辑，不含解析逻辑
// ==========================================

pub mod import_run;
pub mod payload;
pub mod types;
pub mod zephyr;

// 重导出核心类型
pub use import_run::{ImportOutcome, ImportSummary, ReportRow};
pub use payload::{
    CaseAttributes, CasePayload, StepPayload, SuiteAttributes, SuiteMetadata, ZephyrMetadata,
};
pub use types::{DuplicatePolicy, ExportFormat, ImportAction, ScriptKind};
pub use zephyr::{
    ExportScan, FolderRegistry, KeyCounts, ParseResult, TestDataCell, TestDataRow,
    TestDataTable, ZephyrFolder, ZephyrIssue, ZephyrStep, ZephyrTestCase,
};
