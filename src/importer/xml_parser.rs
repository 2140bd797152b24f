// ==========================================
// Zephyr 导入工具 - XML 流式解析器
// ==========================================
// 职责: Zephyr Scale XML 导出 → 文件夹注册表 + 惰性用例序列
// 约束: 不构建整棵文档树，一次只物化一个 <testCase>
// 约束: 标签不匹配/文档截断视为运行级错误
// ==========================================

use crate::domain::types::ScriptKind;
use crate::domain::zephyr::{
    ExportScan, FolderRegistry, ParseResult, TestDataCell, TestDataRow, TestDataTable,
    ZephyrFolder, ZephyrIssue, ZephyrStep, ZephyrTestCase,
};
use crate::importer::error::{ImportError, ImportResult};
use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use tracing::debug;

// ==========================================
// XmlNode - 拥有所有权的事件
// ==========================================
// 事件先转成自有数据再分发，避免借用读缓冲区
#[derive(Debug)]
enum XmlNode {
    Start(XmlElement),
    Empty(XmlElement),
    End(String),
    Text(String),
    Eof,
}

#[derive(Debug)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
}

impl XmlElement {
    fn from_bytes(e: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let attrs = e
            .attributes()
            .with_checks(false)
            .filter_map(Result::ok)
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let value = match attr.unescape_value() {
                    Ok(value) => value.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                };
                (key, value)
            })
            .collect();
        Self { name, attrs }
    }

    /// 读取属性（去空白，空值返回 None）
    fn attr(&self, key: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// 读取数值属性（非数值视为缺省）
    fn attr_i64(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(|v| v.parse::<i64>().ok())
    }

    /// 把元素还原成标签文本（富文本字段未包在 CDATA 中时使用）
    fn markup(&self, empty: bool) -> String {
        let mut out = format!("<{}", self.name);
        for (k, v) in &self.attrs {
            out.push_str(&format!(" {}=\"{}\"", k, v));
        }
        out.push_str(if empty { "/>" } else { ">" });
        out
    }
}

// ==========================================
// XmlCursor - 事件游标
// ==========================================
struct XmlCursor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize, // 当前打开的元素层数
}

impl<R: BufRead> XmlCursor<R> {
    fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::with_capacity(4096),
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ImportError {
        ImportError::XmlParseError {
            position: self.reader.buffer_position() as u64,
            message: message.into(),
        }
    }

    /// 读取下一个有意义的事件
    fn next_node(&mut self) -> ImportResult<XmlNode> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(e) => return Err(self.error(e.to_string())),
            };
            let node = match event {
                Event::Start(ref e) => {
                    self.depth += 1;
                    XmlNode::Start(XmlElement::from_bytes(e))
                }
                Event::Empty(ref e) => XmlNode::Empty(XmlElement::from_bytes(e)),
                Event::End(ref e) => {
                    self.depth = self.depth.saturating_sub(1);
                    XmlNode::End(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
                }
                Event::Text(ref t) => {
                    let text = match t.unescape_with(resolve_html5_entity) {
                        Ok(text) => text.into_owned(),
                        Err(_) => String::from_utf8_lossy(&**t).into_owned(),
                    };
                    XmlNode::Text(text)
                }
                Event::CData(ref c) => XmlNode::Text(String::from_utf8_lossy(&**c).into_owned()),
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(self.error(format!(
                            "文档意外结束，仍有 {} 个元素未闭合",
                            self.depth
                        )));
                    }
                    XmlNode::Eof
                }
                // 声明、注释、处理指令、DOCTYPE
                _ => continue,
            };
            return Ok(node);
        }
    }

    /// 跳过当前元素（Start 已读取）
    fn skip_element(&mut self) -> ImportResult<()> {
        let mut depth = 0usize;
        loop {
            match self.next_node()? {
                XmlNode::Start(_) => depth += 1,
                XmlNode::End(_) if depth == 0 => return Ok(()),
                XmlNode::End(_) => depth -= 1,
                XmlNode::Eof => return Err(self.error("元素未闭合")),
                _ => {}
            }
        }
    }

    /// 读取当前元素的全部文本（Start 已读取）；嵌套标签还原为标记文本
    fn read_text(&mut self) -> ImportResult<String> {
        let mut out = String::new();
        let mut depth = 0usize;
        loop {
            match self.next_node()? {
                XmlNode::Text(text) => out.push_str(&text),
                XmlNode::Start(el) => {
                    depth += 1;
                    out.push_str(&el.markup(false));
                }
                XmlNode::Empty(el) => out.push_str(&el.markup(true)),
                XmlNode::End(_) if depth == 0 => return Ok(out),
                XmlNode::End(name) => {
                    depth -= 1;
                    out.push_str(&format!("</{}>", name));
                }
                XmlNode::Eof => return Err(self.error("元素未闭合")),
            }
        }
    }

    /// 读取标量文本：去空白，空串返回 None
    fn read_scalar(&mut self) -> ImportResult<Option<String>> {
        Ok(non_blank(self.read_text()?))
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 按 (显式 index 或文档位置, 文档位置) 排序
fn order_by_index<T>(items: Vec<(Option<i64>, T)>) -> Vec<(i64, T)> {
    let mut keyed: Vec<(i64, usize, T)> = items
        .into_iter()
        .enumerate()
        .map(|(pos, (index, item))| (index.unwrap_or(pos as i64), pos, item))
        .collect();
    keyed.sort_by_key(|(index, pos, _)| (*index, *pos));
    keyed.into_iter().map(|(index, _, item)| (index, item)).collect()
}

fn ordered_values<T>(items: Vec<(Option<i64>, T)>) -> Vec<T> {
    order_by_index(items).into_iter().map(|(_, item)| item).collect()
}

fn folder_from_element(el: &XmlElement) -> Option<ZephyrFolder> {
    let full_path = el.attr("fullPath")?;
    let mut folder = ZephyrFolder::new(full_path, el.attr_i64("index"));
    folder.description = el.attr("description");
    Some(folder)
}

// ==========================================
// 第一遍: 文件夹 / 业务键
// ==========================================

/// 仅解析文件夹注册表
pub fn parse_folders<R: BufRead>(source: R) -> ImportResult<FolderRegistry> {
    Ok(scan_export(source)?.folders)
}

/// 解析文件夹注册表并统计业务键出现次数（不构建用例）
pub fn scan_export<R: BufRead>(source: R) -> ImportResult<ExportScan> {
    let mut cursor = XmlCursor::new(source);
    let mut scan = ExportScan::default();

    loop {
        match cursor.next_node()? {
            XmlNode::Start(el) | XmlNode::Empty(el) if el.name == "folder" => {
                if let Some(folder) = folder_from_element(&el) {
                    scan.folders.insert(folder.full_path.clone(), folder);
                }
            }
            XmlNode::Start(el) if el.name == "testCase" => {
                scan.record_key(el.attr("key").as_deref());
                cursor.skip_element()?;
            }
            XmlNode::Empty(el) if el.name == "testCase" => {
                scan.record_key(el.attr("key").as_deref());
            }
            XmlNode::Eof => break,
            _ => {}
        }
    }

    debug!(
        folders = scan.folders.len(),
        distinct_keys = scan.key_counts.len(),
        "XML 第一遍扫描完成"
    );
    Ok(scan)
}

// ==========================================
// 第二遍: 惰性用例序列
// ==========================================

/// 逐个产出 <testCase>；出错后不再继续
pub struct TestCaseIter<R: BufRead> {
    cursor: XmlCursor<R>,
    finished: bool,
}

impl<R: BufRead> TestCaseIter<R> {
    pub fn new(source: R) -> Self {
        Self {
            cursor: XmlCursor::new(source),
            finished: false,
        }
    }

    fn next_case(&mut self) -> ImportResult<Option<ZephyrTestCase>> {
        loop {
            match self.cursor.next_node()? {
                XmlNode::Start(el) if el.name == "testCase" => {
                    let case = CaseBuilder::new(&el).read_body(&mut self.cursor)?;
                    return Ok(Some(case));
                }
                XmlNode::Empty(el) if el.name == "testCase" => {
                    return Ok(Some(CaseBuilder::new(&el).finish()));
                }
                XmlNode::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for TestCaseIter<R> {
    type Item = ImportResult<ZephyrTestCase>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_case() {
            Ok(Some(case)) => Some(Ok(case)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// 一次性解析（测试与小文件）
pub fn parse_export(bytes: &[u8]) -> ImportResult<ParseResult> {
    let folders = parse_folders(bytes)?;
    let test_cases = TestCaseIter::new(bytes).collect::<ImportResult<Vec<_>>>()?;
    Ok(ParseResult {
        folders,
        test_cases,
    })
}

// ==========================================
// CaseBuilder - 单个用例的组装
// ==========================================
struct CaseBuilder {
    case: ZephyrTestCase,
    script_type: Option<String>,
    script_text: String,
    steps: Vec<(Option<i64>, ZephyrStep)>,
    saw_steps: bool,
}

impl CaseBuilder {
    fn new(el: &XmlElement) -> Self {
        Self {
            case: ZephyrTestCase {
                zephyr_id: el.attr("id"),
                key: el.attr("key"),
                param_type: el.attr("paramType"),
                ..Default::default()
            },
            script_type: None,
            script_text: String::new(),
            steps: Vec::new(),
            saw_steps: false,
        }
    }

    /// 读取 <testCase> 的子元素直到对应的结束标签
    fn read_body<R: BufRead>(mut self, cursor: &mut XmlCursor<R>) -> ImportResult<ZephyrTestCase> {
        loop {
            match cursor.next_node()? {
                XmlNode::Start(el) => self.read_child(cursor, &el)?,
                XmlNode::Empty(el) => {
                    if el.name == "testScript" {
                        self.script_type = el.attr("type");
                    }
                }
                XmlNode::End(_) => return Ok(self.finish()),
                XmlNode::Text(_) => {}
                XmlNode::Eof => return Err(cursor.error("testCase 未闭合")),
            }
        }
    }

    fn read_child<R: BufRead>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        el: &XmlElement,
    ) -> ImportResult<()> {
        let case = &mut self.case;
        match el.name.as_str() {
            "name" => case.name = cursor.read_scalar()?,
            "folder" => case.folder = cursor.read_scalar()?,
            "objective" => case.objective = cursor.read_scalar()?,
            "precondition" => case.precondition = cursor.read_scalar()?,
            "status" => case.status = cursor.read_scalar()?,
            "priority" => case.priority = cursor.read_scalar()?,
            "owner" => case.owner = cursor.read_scalar()?,
            "createdBy" => case.created_by = cursor.read_scalar()?,
            "createdOn" => case.created_on = cursor.read_scalar()?,
            "updatedBy" => case.updated_by = cursor.read_scalar()?,
            "updatedOn" => case.updated_on = cursor.read_scalar()?,
            "labels" => case.labels = read_labels(cursor)?,
            "issues" => case.issues = read_issues(cursor)?,
            "attachments" => case.attachments = read_attachments(cursor)?,
            "parameters" => case.parameters = read_parameters(cursor)?,
            "testDataWrapper" => case.test_data = read_test_data(cursor)?,
            "testScript" => {
                self.script_type = el.attr("type");
                self.read_script(cursor)?;
            }
            _ => cursor.skip_element()?,
        }
        Ok(())
    }

    /// <testScript>: 嵌套 <steps> 或纯文本
    fn read_script<R: BufRead>(&mut self, cursor: &mut XmlCursor<R>) -> ImportResult<()> {
        loop {
            match cursor.next_node()? {
                XmlNode::Start(el) if el.name == "steps" => {
                    self.saw_steps = true;
                    self.steps.extend(read_steps(cursor)?);
                }
                XmlNode::Start(el) if el.name == "text" => {
                    self.script_text.push_str(&cursor.read_text()?);
                }
                XmlNode::Start(_) => cursor.skip_element()?,
                XmlNode::Empty(el) if el.name == "steps" => self.saw_steps = true,
                XmlNode::Text(text) => self.script_text.push_str(&text),
                XmlNode::End(_) => return Ok(()),
                XmlNode::Empty(_) => {}
                XmlNode::Eof => return Err(cursor.error("testScript 未闭合")),
            }
        }
    }

    fn finish(self) -> ZephyrTestCase {
        let mut case = self.case;
        let declared = self.script_type.as_deref().and_then(ScriptKind::parse);

        let steps: Vec<ZephyrStep> = order_by_index(self.steps)
            .into_iter()
            .map(|(index, mut step)| {
                step.index = usize::try_from(index).unwrap_or(0);
                step
            })
            .collect();

        if !steps.is_empty() {
            // 嵌套步骤优先于声明的类型
            case.script_kind = Some(ScriptKind::Steps);
            case.script_text = None;
            case.steps = steps;
        } else if self.saw_steps || declared == Some(ScriptKind::Steps) {
            case.script_kind = Some(ScriptKind::Steps);
            case.script_text = None;
        } else {
            case.script_kind = declared;
            case.script_text = non_blank(self.script_text);
        }
        case
    }
}

// ==========================================
// 嵌套列表解析
// ==========================================

/// 读取容器元素下的同名子元素，交给 item 回调处理
fn read_items<R, T, F>(
    cursor: &mut XmlCursor<R>,
    item_name: &str,
    mut item: F,
) -> ImportResult<Vec<(Option<i64>, T)>>
where
    R: BufRead,
    F: FnMut(&mut XmlCursor<R>, &XmlElement, bool) -> ImportResult<Option<T>>,
{
    let mut items = Vec::new();
    loop {
        match cursor.next_node()? {
            XmlNode::Start(el) if el.name == item_name => {
                let index = el.attr_i64("index");
                if let Some(value) = item(cursor, &el, false)? {
                    items.push((index, value));
                }
            }
            XmlNode::Empty(el) if el.name == item_name => {
                let index = el.attr_i64("index");
                if let Some(value) = item(cursor, &el, true)? {
                    items.push((index, value));
                }
            }
            XmlNode::Start(_) => cursor.skip_element()?,
            XmlNode::End(_) => return Ok(items),
            XmlNode::Eof => return Err(cursor.error("列表元素未闭合")),
            _ => {}
        }
    }
}

fn read_labels<R: BufRead>(cursor: &mut XmlCursor<R>) -> ImportResult<Vec<String>> {
    let items = read_items(cursor, "label", |cursor, _el, empty| {
        if empty {
            return Ok(None);
        }
        cursor.read_scalar()
    })?;
    Ok(ordered_values(items))
}

fn read_parameters<R: BufRead>(cursor: &mut XmlCursor<R>) -> ImportResult<Vec<String>> {
    let items = read_items(cursor, "parameter", |cursor, el, empty| {
        let from_attr = el.attr("name");
        if empty {
            return Ok(from_attr);
        }
        let mut name = None;
        let mut text = String::new();
        loop {
            match cursor.next_node()? {
                XmlNode::Start(child) if child.name == "name" => name = cursor.read_scalar()?,
                XmlNode::Start(_) => cursor.skip_element()?,
                XmlNode::Text(t) => text.push_str(&t),
                XmlNode::End(_) => break,
                XmlNode::Eof => return Err(cursor.error("parameter 未闭合")),
                XmlNode::Empty(_) => {}
            }
        }
        Ok(from_attr.or(name).or_else(|| non_blank(text)))
    })?;
    Ok(ordered_values(items))
}

fn read_attachments<R: BufRead>(cursor: &mut XmlCursor<R>) -> ImportResult<Vec<String>> {
    let items = read_items(cursor, "attachment", |cursor, el, empty| {
        let from_attr = el.attr("name").or_else(|| el.attr("fileName"));
        if empty {
            return Ok(from_attr);
        }
        let mut name = None;
        let mut text = String::new();
        loop {
            match cursor.next_node()? {
                XmlNode::Start(child) if child.name == "name" || child.name == "fileName" => {
                    name = cursor.read_scalar()?
                }
                XmlNode::Start(_) => cursor.skip_element()?,
                XmlNode::Text(t) => text.push_str(&t),
                XmlNode::End(_) => break,
                XmlNode::Eof => return Err(cursor.error("attachment 未闭合")),
                XmlNode::Empty(_) => {}
            }
        }
        Ok(from_attr.or(name).or_else(|| non_blank(text)))
    })?;
    Ok(ordered_values(items))
}

fn read_issues<R: BufRead>(cursor: &mut XmlCursor<R>) -> ImportResult<Vec<ZephyrIssue>> {
    let items = read_items(cursor, "issue", |cursor, el, empty| {
        let mut key = el.attr("key");
        let mut summary = el.attr("summary");
        if !empty {
            let mut text = String::new();
            loop {
                match cursor.next_node()? {
                    XmlNode::Start(child) if child.name == "key" => key = cursor.read_scalar()?,
                    XmlNode::Start(child) if child.name == "summary" => {
                        summary = cursor.read_scalar()?
                    }
                    XmlNode::Start(_) => cursor.skip_element()?,
                    XmlNode::Text(t) => text.push_str(&t),
                    XmlNode::End(_) => break,
                    XmlNode::Eof => return Err(cursor.error("issue 未闭合")),
                    XmlNode::Empty(_) => {}
                }
            }
            if key.is_none() {
                key = non_blank(text);
            }
        }
        Ok(key.map(|key| ZephyrIssue { key, summary }))
    })?;
    Ok(ordered_values(items))
}

fn read_steps<R: BufRead>(cursor: &mut XmlCursor<R>) -> ImportResult<Vec<(Option<i64>, ZephyrStep)>> {
    read_items(cursor, "step", |cursor, _el, empty| {
        let mut step = ZephyrStep::default();
        if empty {
            return Ok(Some(step));
        }
        loop {
            match cursor.next_node()? {
                XmlNode::Start(child) => match child.name.as_str() {
                    "description" => step.description = cursor.read_scalar()?,
                    "expectedResult" => step.expected_result = cursor.read_scalar()?,
                    "testData" => step.test_data = cursor.read_scalar()?,
                    _ => cursor.skip_element()?,
                },
                XmlNode::End(_) => return Ok(Some(step)),
                XmlNode::Eof => return Err(cursor.error("step 未闭合")),
                _ => {}
            }
        }
    })
    .map(|items| {
        // 负数 index 视为缺省
        items
            .into_iter()
            .map(|(index, step)| (index.filter(|i| *i >= 0), step))
            .collect()
    })
}

/// <testDataWrapper>: 任意层级下的 <row>/<cell>
fn read_test_data<R: BufRead>(cursor: &mut XmlCursor<R>) -> ImportResult<Option<TestDataTable>> {
    let mut rows: Vec<(Option<i64>, TestDataRow)> = Vec::new();
    let mut depth = 0usize;
    loop {
        match cursor.next_node()? {
            XmlNode::Start(el) if el.name == "row" => {
                let index = el.attr_i64("index");
                let cells = read_items(cursor, "cell", |cursor, cell_el, empty| {
                    let mut cell = TestDataCell {
                        index: cell_el.attr_i64("index"),
                        name: cell_el.attr("name"),
                        data_type: cell_el.attr("dataType"),
                        value: cell_el.attr("value"),
                    };
                    if empty {
                        return Ok(Some(cell));
                    }
                    let mut text = String::new();
                    loop {
                        match cursor.next_node()? {
                            XmlNode::Start(child) => match child.name.as_str() {
                                "value" => cell.value = cursor.read_scalar()?,
                                "name" => cell.name = cursor.read_scalar()?,
                                "dataType" => cell.data_type = cursor.read_scalar()?,
                                _ => cursor.skip_element()?,
                            },
                            XmlNode::Text(t) => text.push_str(&t),
                            XmlNode::End(_) => break,
                            XmlNode::Eof => return Err(cursor.error("cell 未闭合")),
                            XmlNode::Empty(_) => {}
                        }
                    }
                    if cell.value.is_none() {
                        cell.value = non_blank(text);
                    }
                    Ok(Some(cell))
                })?;
                rows.push((
                    index,
                    TestDataRow {
                        cells: ordered_values(cells),
                    },
                ));
            }
            XmlNode::Empty(el) if el.name == "row" => {
                rows.push((el.attr_i64("index"), TestDataRow::default()));
            }
            XmlNode::Start(_) => depth += 1,
            XmlNode::End(_) if depth == 0 => break,
            XmlNode::End(_) => depth -= 1,
            XmlNode::Eof => return Err(cursor.error("testDataWrapper 未闭合")),
            _ => {}
        }
    }

    let table = TestDataTable {
        rows: ordered_values(rows),
    };
    Ok(if table.rows.is_empty() { None } else { Some(table) })
}
