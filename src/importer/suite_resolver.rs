// ==========================================
// Zephyr 导入工具 - 套件层级解析
// ==========================================
// 职责: 文件夹路径 → 目标库套件树（按段逐级查找或创建）
// 约束: (父节点, 名称) 缓存仅在单次导入内有效，顺序单线程使用
// ==========================================

use crate::domain::payload::SuiteAttributes;
use crate::domain::zephyr::FolderRegistry;
use crate::repository::error::RepositoryResult;
use crate::repository::target_store::TargetStore;
use std::collections::HashMap;
use tracing::debug;

/// 无文件夹用例的归属套件
pub const NO_FOLDER_SUITE_NAME: &str = "(No folder)";

// ==========================================
// SuiteResolver
// ==========================================
pub struct SuiteResolver<'a> {
    store: &'a dyn TargetStore,
    project_id: i64,
    folders: &'a FolderRegistry,
    cache: HashMap<(Option<i64>, String), i64>,
}

impl<'a> SuiteResolver<'a> {
    pub fn new(store: &'a dyn TargetStore, project_id: i64, folders: &'a FolderRegistry) -> Self {
        Self {
            store,
            project_id,
            folders,
            cache: HashMap::new(),
        }
    }

    /// 查找或创建单个套件（命中缓存时不访问目标库）
    fn ensure_suite(
        &mut self,
        parent_id: Option<i64>,
        name: &str,
        folder_path: Option<&str>,
    ) -> RepositoryResult<i64> {
        let cache_key = (parent_id, name.to_string());
        if let Some(id) = self.cache.get(&cache_key) {
            return Ok(*id);
        }

        let id = match self.store.get_suite_id(self.project_id, parent_id, name)? {
            Some(existing) => existing,
            None => {
                let folder_index = folder_path
                    .and_then(|path| self.folders.get(path))
                    .and_then(|folder| folder.index);
                let attributes = SuiteAttributes::new(folder_path, folder_index);
                let created = self
                    .store
                    .create_suite(self.project_id, parent_id, name, &attributes)?;
                debug!(suite_id = created, name = %name, "新建套件");
                created
            }
        };

        self.cache.insert(cache_key, id);
        Ok(id)
    }

    /// 解析文件夹路径对应的叶子套件
    ///
    /// # 参数
    /// - folder: 原始路径（空白或 None 归入 "(No folder)"）
    ///
    /// # 返回
    /// - 叶子套件 ID
    pub fn suite_for_folder(&mut self, folder: Option<&str>) -> RepositoryResult<i64> {
        let path = folder.map(str::trim).unwrap_or_default();
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return self.ensure_suite(None, NO_FOLDER_SUITE_NAME, None);
        }

        let mut parent_id = None;
        let mut leaf_id = 0;
        for (depth, segment) in segments.iter().enumerate() {
            let prefix = segments[..=depth].join("/");
            leaf_id = self.ensure_suite(parent_id, segment, Some(&prefix))?;
            parent_id = Some(leaf_id);
        }
        Ok(leaf_id)
    }

    /// 按注册表顺序预创建全部文件夹
    pub fn precreate_all(&mut self) -> RepositoryResult<usize> {
        let paths: Vec<String> = self.folders.keys().cloned().collect();
        for path in &paths {
            self.suite_for_folder(Some(path))?;
        }
        Ok(self.cache.len())
    }

    /// 已解析的套件数
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
