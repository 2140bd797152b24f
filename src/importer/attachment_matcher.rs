// ==========================================
// Zephyr 导入工具 - 附件匹配
// ==========================================
// 职责: 用例引用的附件名 ↔ 附件压缩包中的文件（按文件名匹配）
// 规则: 同名多路径时取字典序第一个，并对该文件名告警一次
// ==========================================

use crate::importer::error::ImportResult;
use crate::importer::source::ReadSeek;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// 取路径最后一段（兼容反斜杠）
pub fn basename(raw: &str) -> String {
    let cleaned = raw.trim();
    if cleaned.is_empty() {
        return String::new();
    }
    let normalized = cleaned.replace('\\', "/");
    normalized
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

// ==========================================
// AttachmentIndex - 文件名索引
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentIndex {
    by_basename: BTreeMap<String, Vec<String>>, // 文件名 → 排序后的完整路径
    duplicates: BTreeSet<String>,               // 对应多个路径的文件名
}

impl AttachmentIndex {
    /// 从压缩包文件列表构建（目录与空文件名已由调用方剔除或在此忽略）
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_basename: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in paths {
            let path = path.as_ref();
            if path.ends_with('/') {
                continue;
            }
            let name = basename(path);
            if name.is_empty() {
                continue;
            }
            by_basename.entry(name).or_default().push(path.to_string());
        }

        let mut duplicates = BTreeSet::new();
        for (name, paths) in by_basename.iter_mut() {
            paths.sort();
            if paths.len() > 1 {
                duplicates.insert(name.clone());
            }
        }

        Self {
            by_basename,
            duplicates,
        }
    }

    pub fn candidates(&self, basename: &str) -> Option<&[String]> {
        self.by_basename.get(basename).map(Vec::as_slice)
    }

    pub fn is_ambiguous(&self, basename: &str) -> bool {
        self.duplicates.contains(basename)
    }

    pub fn len(&self) -> usize {
        self.by_basename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_basename.is_empty()
    }
}

// ==========================================
// AttachmentArchive - 附件压缩包
// ==========================================
pub struct AttachmentArchive {
    archive: ZipArchive<Box<dyn ReadSeek>>,
    index: AttachmentIndex,
}

impl AttachmentArchive {
    /// 打开压缩包并建立文件名索引
    pub fn open<R: Read + Seek + 'static>(reader: R) -> ImportResult<Self> {
        let boxed: Box<dyn ReadSeek> = Box::new(reader);
        let mut archive = ZipArchive::new(boxed)?;

        let mut paths = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            paths.push(entry.name().to_string());
        }
        let index = AttachmentIndex::from_paths(&paths);
        debug!(entries = paths.len(), basenames = index.len(), "附件压缩包索引完成");

        Ok(Self { archive, index })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> ImportResult<Self> {
        Self::open(Cursor::new(bytes))
    }

    pub fn from_path(path: impl AsRef<Path>) -> ImportResult<Self> {
        Self::open(std::fs::File::open(path)?)
    }

    pub fn index(&self) -> &AttachmentIndex {
        &self.index
    }

    /// 读取压缩包内文件的全部内容
    pub fn read(&mut self, path: &str) -> ImportResult<Vec<u8>> {
        let mut entry = self.archive.by_name(path)?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl std::fmt::Debug for AttachmentArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentArchive")
            .field("index", &self.index)
            .finish()
    }
}

// ==========================================
// AttachmentMatch - 匹配结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentMatch {
    pub in_export: usize,           // 导出文件中的附件数（去空白）
    pub attached: usize,            // 找到的数量
    pub missing: usize,             // 缺失的数量
    pub matched: Vec<String>,       // 选中的压缩包内路径
    pub missing_names: Vec<String>, // 缺失的附件名
    pub warnings: Vec<String>,
}

/// 匹配用例附件
///
/// # 参数
/// - names: 用例引用的附件名
/// - index: 压缩包索引（未提供压缩包时为 None，全部视为缺失）
pub fn match_attachments(names: &[String], index: Option<&AttachmentIndex>) -> AttachmentMatch {
    let cleaned: Vec<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();

    let mut result = AttachmentMatch {
        in_export: cleaned.len(),
        ..Default::default()
    };
    let mut missing_warned: HashSet<&str> = HashSet::new();
    let mut duplicate_warned: HashSet<String> = HashSet::new();

    for name in cleaned {
        let selected = index.and_then(|index| {
            let base = basename(name);
            if base.is_empty() {
                return None;
            }
            let first = index.candidates(&base)?.first()?.clone();
            Some((base, first))
        });

        match selected {
            Some((base, path)) => {
                if let Some(index) = index {
                    if index.is_ambiguous(&base) && duplicate_warned.insert(base.clone()) {
                        result.warnings.push(format!(
                            "Duplicate attachment basename '{}' in ZIP; using '{}'.",
                            base, path
                        ));
                    }
                }
                result.matched.push(path);
            }
            None => {
                result.missing_names.push(name.to_string());
                if missing_warned.insert(name) {
                    result
                        .warnings
                        .push(format!("Attachment missing in ZIP: {}", name));
                }
            }
        }
    }

    result.attached = result.matched.len();
    result.missing = result.missing_names.len();
    result
}
