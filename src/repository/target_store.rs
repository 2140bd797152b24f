// ==========================================
// Zephyr 导入工具 - 目标库 Trait
// ==========================================
// 职责: 定义导入器依赖的目标库能力集（不包含实现）
// 实现者: InMemoryTargetStore（测试替身）, SqliteTargetStore（rusqlite）
// 红线: 目标库不含导入规则，只做数据 CRUD
// ==========================================

use crate::domain::payload::{CasePayload, SuiteAttributes};
use crate::repository::error::{RepositoryError, RepositoryResult};

// ==========================================
// TargetStore Trait
// ==========================================
// 约束: 单写者顺序调用；实现方无需支持并发写入
pub trait TargetStore: Send + Sync {
    // ===== 查询 =====

    /// 按 Zephyr 业务键查找已有用例
    ///
    /// # 参数
    /// - project_id: 目标项目
    /// - key: 已去空白的业务键
    ///
    /// # 返回
    /// - Ok(Some(id)): 用例已存在
    /// - Ok(None): 不存在
    fn find_case_id_by_key(&self, project_id: i64, key: &str) -> RepositoryResult<Option<i64>>;

    /// 按 (父节点, 名称) 查找套件
    fn get_suite_id(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Option<i64>>;

    // ===== 写入 =====

    /// 创建套件
    fn create_suite(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
        attributes: &SuiteAttributes,
    ) -> RepositoryResult<i64>;

    /// 创建用例及其步骤
    ///
    /// # 参数
    /// - payload: 写库载荷（labels 已清空，标签单独写入）
    fn create_case_with_steps(
        &self,
        project_id: i64,
        suite_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<i64>;

    /// 更新已有用例（替换步骤）
    ///
    /// 默认实现返回 Unsupported，导入器据此回退为 skipped
    fn update_case_with_steps(
        &self,
        _project_id: i64,
        _case_id: i64,
        _suite_id: i64,
        _payload: &CasePayload,
    ) -> RepositoryResult<()> {
        Err(RepositoryError::Unsupported(
            "update_case_with_steps".to_string(),
        ))
    }

    /// 覆盖写入用例标签
    fn set_labels(&self, case_id: i64, labels: &[String]) -> RepositoryResult<()>;

    /// 上传附件
    fn attach_file(
        &self,
        project_id: i64,
        case_id: i64,
        filename: &str,
        content: &[u8],
    ) -> RepositoryResult<()>;
}
