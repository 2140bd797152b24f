// ==========================================
// Zephyr 导入工具 - 导入层
// ==========================================
// 职责: Zephyr Scale 导出文件 → 目标用例库
// 支持: XML（流式）, XLSX
// 流程: 解析 → 校验 → 附件匹配 → 映射 → 对账 → 报告
// ==========================================

// 模块声明
pub mod attachment_matcher;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod importer_trait;
pub mod report;
pub mod sanitizer;
pub mod source;
pub mod suite_resolver;
pub mod validator;
pub mod xlsx_parser;
pub mod xml_parser;
pub mod zephyr_importer;

// 重导出核心类型
pub use attachment_matcher::{match_attachments, AttachmentArchive, AttachmentIndex, AttachmentMatch};
pub use error::{ImportError, ImportResult};
pub use field_mapper::{FieldMapper, MappingOptions};
pub use file_parser::{detect_format, parser_for, XlsxExportParser, XmlExportParser};
pub use report::{build_csv_report, REPORT_HEADER};
pub use sanitizer::sanitize_html;
pub use source::ExportSource;
pub use suite_resolver::{SuiteResolver, NO_FOLDER_SUITE_NAME};
pub use validator::{build_duplicate_key_counts, CaseValidator};
pub use xml_parser::{parse_export, TestCaseIter};
pub use zephyr_importer::ZephyrImporter;

// 重导出 Trait 接口
pub use importer_trait::{CaseStream, ExportParser};
