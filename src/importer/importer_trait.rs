// ==========================================
// Zephyr 导入工具 - 导入组件 Trait
// ==========================================
// 职责: 定义导出解析接口（不包含实现）
// 实现者: XmlExportParser, XlsxExportParser
// ==========================================

use crate::domain::zephyr::{ExportScan, ZephyrTestCase};
use crate::importer::error::ImportResult;
use crate::importer::source::ExportSource;

/// 惰性用例序列
pub type CaseStream<'a> = Box<dyn Iterator<Item = ImportResult<ZephyrTestCase>> + 'a>;

// ==========================================
// ExportParser Trait
// ==========================================
// 用途: 两遍读取同一数据源（先文件夹/业务键，再用例）
pub trait ExportParser: Send + Sync {
    /// 第一遍：文件夹注册表 + 业务键计数
    ///
    /// # 参数
    /// - source: 可回绕的数据源（调用前后位置不作保证）
    ///
    /// # 返回
    /// - Ok(ExportScan): 完整的文件夹注册表与业务键出现次数
    /// - Err: 结构错误（整次导入失败）
    fn scan(&self, source: &mut ExportSource) -> ImportResult<ExportScan>;

    /// 第二遍：用例序列
    ///
    /// # 参数
    /// - source: 可回绕的数据源，序列存活期间被独占借用
    ///
    /// # 返回
    /// - Ok(CaseStream): 按源顺序产出用例；遇到结构错误时产出一次 Err 后结束
    fn cases<'a>(&self, source: &'a mut ExportSource) -> ImportResult<CaseStream<'a>>;

    /// 格式名称（日志用）
    fn format_name(&self) -> &'static str;
}
