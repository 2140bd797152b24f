// ==========================================
// Zephyr 导入工具 - 可回绕的导出数据源
// ==========================================
// 职责: 两遍扫描（文件夹 → 用例）需要回到开头重读
// 约束: 不可 seek 的输入一次性落盘到匿名临时文件
// ==========================================

use crate::importer::error::ImportResult;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// 可读且可 seek 的字节流
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

// ==========================================
// ExportSource - 导出数据源
// ==========================================
pub struct ExportSource {
    inner: Box<dyn ReadSeek>,
    spooled: bool, // 是否经过临时文件落盘
}

impl ExportSource {
    /// 内存字节
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Box::new(Cursor::new(bytes.into())),
            spooled: false,
        }
    }

    /// 本地文件（文件本身可 seek，无需落盘）
    pub fn from_path(path: impl AsRef<Path>) -> ImportResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            inner: Box::new(file),
            spooled: false,
        })
    }

    /// 任意可 seek 的流
    pub fn from_seekable<R: Read + Seek + 'static>(reader: R) -> Self {
        Self {
            inner: Box::new(reader),
            spooled: false,
        }
    }

    /// 不可 seek 的流：复制到临时文件后再使用
    pub fn from_reader<R: Read>(mut reader: R) -> ImportResult<Self> {
        let mut spool = tempfile::tempfile()?;
        let copied = io::copy(&mut reader, &mut spool)?;
        spool.seek(SeekFrom::Start(0))?;
        debug!(bytes = copied, "导出数据已落盘到临时文件");
        Ok(Self {
            inner: Box::new(spool),
            spooled: true,
        })
    }

    pub fn is_spooled(&self) -> bool {
        self.spooled
    }

    /// 回到开头
    pub fn rewind(&mut self) -> ImportResult<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// 读取开头若干字节用于格式判断，读取后回到开头
    pub fn peek_head(&mut self, len: usize) -> ImportResult<Vec<u8>> {
        self.rewind()?;
        let mut head = Vec::with_capacity(len);
        (&mut self.inner).take(len as u64).read_to_end(&mut head)?;
        self.rewind()?;
        Ok(head)
    }

    /// 从开头开始的一遍带缓冲读取
    pub fn open_pass(&mut self) -> ImportResult<BufReader<&mut dyn ReadSeek>> {
        self.rewind()?;
        Ok(BufReader::new(self.inner.as_mut()))
    }

    /// 从开头开始的随机访问（XLSX 需要）
    pub fn open_random_access(&mut self) -> ImportResult<&mut dyn ReadSeek> {
        self.rewind()?;
        Ok(self.inner.as_mut())
    }
}

impl std::fmt::Debug for ExportSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSource")
            .field("spooled", &self.spooled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    /// 模拟网络流：只能顺序读取
    struct OneShot(Cursor<Vec<u8>>);

    impl Read for OneShot {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    #[test]
    fn test_spooled_source_can_be_read_twice() {
        let reader = OneShot(Cursor::new(b"line one\nline two\n".to_vec()));
        let mut source = ExportSource::from_reader(reader).unwrap();
        assert!(source.is_spooled());

        let first: Vec<String> = source.open_pass().unwrap().lines().map(|l| l.unwrap()).collect();
        let second: Vec<String> = source.open_pass().unwrap().lines().map(|l| l.unwrap()).collect();
        assert_eq!(first, vec!["line one", "line two"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_peek_head_rewinds() {
        let mut source = ExportSource::from_bytes(b"PK\x03\x04payload".to_vec());
        assert_eq!(source.peek_head(4).unwrap(), b"PK\x03\x04".to_vec());
        let mut all = String::new();
        source.open_pass().unwrap().read_to_string(&mut all).unwrap();
        assert!(all.ends_with("payload"));
    }
}
