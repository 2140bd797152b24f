// ==========================================
// Zephyr 导入工具 - 内存目标库
// ==========================================
// 职责: 进程内 TargetStore 实现（dry run 对照 / 测试替身）
// 约束: 用例按 attributes.zephyr.key（去空白）建索引
// ==========================================

use crate::domain::payload::{CasePayload, SuiteAttributes};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::target_store::TargetStore;
use std::collections::HashMap;
use std::sync::Mutex;

// ==========================================
// 存储记录
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSuite {
    pub id: i64,
    pub project_id: i64,
    pub parent_id: Option<i64>,
    pub name: String,
    pub attributes: SuiteAttributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCase {
    pub id: i64,
    pub project_id: i64,
    pub suite_id: i64,
    pub payload: CasePayload,
    pub labels: Vec<String>,
    pub attachments: Vec<(String, Vec<u8>)>, // (文件名, 内容)
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    suites: Vec<StoredSuite>,
    suite_index: HashMap<(i64, Option<i64>, String), i64>,
    cases: HashMap<i64, StoredCase>,
    case_index: HashMap<(i64, String), i64>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

// ==========================================
// InMemoryTargetStore
// ==========================================
#[derive(Debug)]
pub struct InMemoryTargetStore {
    state: Mutex<MemoryState>,
    supports_update: bool,
}

impl Default for InMemoryTargetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTargetStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            supports_update: true,
        }
    }

    /// 不支持更新的实例（upsert 回退路径）
    pub fn without_update_support() -> Self {
        Self {
            supports_update: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 查询辅助（测试 / CLI 输出用）=====

    pub fn suites(&self) -> RepositoryResult<Vec<StoredSuite>> {
        Ok(self.lock()?.suites.clone())
    }

    pub fn cases(&self) -> RepositoryResult<Vec<StoredCase>> {
        let state = self.lock()?;
        let mut cases: Vec<StoredCase> = state.cases.values().cloned().collect();
        cases.sort_by_key(|c| c.id);
        Ok(cases)
    }

    pub fn case(&self, case_id: i64) -> RepositoryResult<Option<StoredCase>> {
        Ok(self.lock()?.cases.get(&case_id).cloned())
    }
}

impl TargetStore for InMemoryTargetStore {
    fn find_case_id_by_key(&self, project_id: i64, key: &str) -> RepositoryResult<Option<i64>> {
        let state = self.lock()?;
        Ok(state
            .case_index
            .get(&(project_id, key.trim().to_string()))
            .copied())
    }

    fn get_suite_id(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Option<i64>> {
        let state = self.lock()?;
        Ok(state
            .suite_index
            .get(&(project_id, parent_id, name.to_string()))
            .copied())
    }

    fn create_suite(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
        attributes: &SuiteAttributes,
    ) -> RepositoryResult<i64> {
        let mut state = self.lock()?;
        let index_key = (project_id, parent_id, name.to_string());
        if state.suite_index.contains_key(&index_key) {
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "suite '{}' already exists under parent {:?}",
                name, parent_id
            )));
        }
        let id = state.allocate_id();
        state.suites.push(StoredSuite {
            id,
            project_id,
            parent_id,
            name: name.to_string(),
            attributes: attributes.clone(),
        });
        state.suite_index.insert(index_key, id);
        Ok(id)
    }

    fn create_case_with_steps(
        &self,
        project_id: i64,
        suite_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<i64> {
        let mut state = self.lock()?;
        let id = state.allocate_id();
        if let Some(key) = payload.zephyr_key() {
            state.case_index.insert((project_id, key.to_string()), id);
        }
        state.cases.insert(
            id,
            StoredCase {
                id,
                project_id,
                suite_id,
                payload: payload.clone(),
                labels: Vec::new(),
                attachments: Vec::new(),
            },
        );
        Ok(id)
    }

    fn update_case_with_steps(
        &self,
        _project_id: i64,
        case_id: i64,
        suite_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<()> {
        if !self.supports_update {
            return Err(RepositoryError::Unsupported(
                "update_case_with_steps".to_string(),
            ));
        }
        let mut state = self.lock()?;
        let case = state
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| RepositoryError::not_found("test_case", case_id))?;
        case.suite_id = suite_id;
        case.payload = payload.clone();
        Ok(())
    }

    fn set_labels(&self, case_id: i64, labels: &[String]) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        let case = state
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| RepositoryError::not_found("test_case", case_id))?;
        case.labels = labels.to_vec();
        Ok(())
    }

    fn attach_file(
        &self,
        _project_id: i64,
        case_id: i64,
        filename: &str,
        content: &[u8],
    ) -> RepositoryResult<()> {
        let mut state = self.lock()?;
        let case = state
            .cases
            .get_mut(&case_id)
            .ok_or_else(|| RepositoryError::not_found("test_case", case_id))?;
        case.attachments.push((filename.to_string(), content.to_vec()));
        Ok(())
    }
}
