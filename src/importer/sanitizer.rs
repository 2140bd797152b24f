// ==========================================
// Zephyr 导入工具 - 富文本清洗
// ==========================================
// 职责: Zephyr HTML/CDATA 片段 → 确定性纯文本
// 约束: 纯函数、全函数（畸形标记不报错）
// ==========================================

use once_cell::sync::Lazy;
use quick_xml::escape::resolve_html5_entity;
use regex::{Captures, Regex};

static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</\s*(p|div)\s*>").unwrap());
static LI_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<\s*li(\s[^>]*)?>").unwrap());
static LI_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</\s*li\s*>").unwrap());
static TR_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</\s*tr\s*>").unwrap());
static CELL_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</\s*(td|th)\s*>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([A-Za-z][A-Za-z0-9]{0,31}));").unwrap()
});
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// 零宽/不可见字符
const INVISIBLE_CHARS: [char; 5] = ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'];

/// 将 HTML 片段转换为纯文本
///
/// # 参数
/// - fragment: 原始片段（None 或空串返回空串）
///
/// # 返回
/// - 清洗后的文本；输出中不再含标签或实体，因此再次清洗结果不变
pub fn sanitize_html(fragment: Option<&str>) -> String {
    let raw = match fragment {
        Some(raw) if !raw.is_empty() => raw,
        _ => return String::new(),
    };

    // 结构性标签 → 换行/制表
    let s = BR_RE.replace_all(raw, "\n");
    let s = BLOCK_CLOSE_RE.replace_all(&s, "\n");
    let s = LI_OPEN_RE.replace_all(&s, "- ");
    let s = LI_CLOSE_RE.replace_all(&s, "\n");
    let s = TR_CLOSE_RE.replace_all(&s, "\n");
    let s = CELL_CLOSE_RE.replace_all(&s, "\t");

    // 其余标签直接移除
    let s = TAG_RE.replace_all(&s, "");

    let s = decode_entities(&s);

    let s: String = s
        .chars()
        .filter(|c| !INVISIBLE_CHARS.contains(c))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect();

    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = BLANK_LINES_RE.replace_all(&s, "\n\n");

    s.trim().to_string()
}

/// 解码 HTML 实体；无法识别的引用原样保留
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            if let Some(dec) = caps.get(1) {
                return numeric_char(dec.as_str().parse::<u32>().ok());
            }
            if let Some(hex) = caps.get(2) {
                return numeric_char(u32::from_str_radix(hex.as_str(), 16).ok());
            }
            let name = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            match resolve_html5_entity(name) {
                Some(resolved) => resolved.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// 数值引用：无效码点替换为 U+FFFD
fn numeric_char(code: Option<u32>) -> String {
    code.filter(|&c| c != 0)
        .and_then(char::from_u32)
        .unwrap_or('\u{FFFD}')
        .to_string()
}
