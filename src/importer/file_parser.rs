// ==========================================
// Zephyr 导入工具 - 导出解析器实现
// ==========================================
// 支持: Zephyr Scale XML (.xml) / XLSX (.xlsx)
// ==========================================

use crate::domain::types::ExportFormat;
use crate::domain::zephyr::ExportScan;
use crate::importer::error::ImportResult;
use crate::importer::importer_trait::{CaseStream, ExportParser};
use crate::importer::source::ExportSource;
use crate::importer::{xlsx_parser, xml_parser};

// ==========================================
// XML Parser 实现
// ==========================================
pub struct XmlExportParser;

impl ExportParser for XmlExportParser {
    fn scan(&self, source: &mut ExportSource) -> ImportResult<ExportScan> {
        xml_parser::scan_export(source.open_pass()?)
    }

    fn cases<'a>(&self, source: &'a mut ExportSource) -> ImportResult<CaseStream<'a>> {
        Ok(Box::new(xml_parser::TestCaseIter::new(source.open_pass()?)))
    }

    fn format_name(&self) -> &'static str {
        "xml"
    }
}

// ==========================================
// XLSX Parser 实现
// ==========================================
// 两遍都会重新加载工作表；文件夹来自用例上的 folder 列
pub struct XlsxExportParser;

impl ExportParser for XlsxExportParser {
    fn scan(&self, source: &mut ExportSource) -> ImportResult<ExportScan> {
        let cases = xlsx_parser::parse_cases(source.open_random_access()?)?;
        let mut scan = ExportScan {
            folders: xlsx_parser::folders_from_cases(&cases),
            ..Default::default()
        };
        for case in &cases {
            scan.record_key(case.key.as_deref());
        }
        Ok(scan)
    }

    fn cases<'a>(&self, source: &'a mut ExportSource) -> ImportResult<CaseStream<'a>> {
        let cases = xlsx_parser::parse_cases(source.open_random_access()?)?;
        Ok(Box::new(cases.into_iter().map(Ok)))
    }

    fn format_name(&self) -> &'static str {
        "xlsx"
    }
}

/// 按格式选择解析器
pub fn parser_for(format: ExportFormat) -> Box<dyn ExportParser> {
    match format {
        ExportFormat::Xml => Box::new(XmlExportParser),
        ExportFormat::Xlsx => Box::new(XlsxExportParser),
    }
}

/// 判断数据源格式（读取文件头后回到开头）
pub fn detect_format(source: &mut ExportSource) -> ImportResult<ExportFormat> {
    let head = source.peek_head(4)?;
    Ok(ExportFormat::sniff(&head))
}
