// ==========================================
// Zephyr 导入工具 - SQLite 目标库
// ==========================================
// 职责: 使用 rusqlite 实现 TargetStore（本地目标用例库）
// 红线: 不含导入规则，只做数据 CRUD
// 约束: 用例与步骤在同一事务中写入
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::payload::{CasePayload, SuiteAttributes};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::target_store::TargetStore;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

// ==========================================
// SqliteTargetStore
// ==========================================
pub struct SqliteTargetStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTargetStore {
    /// 打开（或新建）目标库并建表
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（会再次应用统一 PRAGMA 并建表，幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在事务中写入步骤（先清空旧步骤）
    fn replace_steps_tx(
        tx: &Transaction,
        case_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<usize> {
        tx.execute("DELETE FROM test_case_step WHERE case_id = ?1", params![case_id])?;

        let mut stmt = tx.prepare(
            r#"
            INSERT INTO test_case_step (case_id, sort_order, name, scenario, expected)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        let mut count = 0;
        for step in &payload.steps {
            stmt.execute(params![
                case_id,
                step.sort_order as i64,
                step.name,
                step.scenario,
                step.expected,
            ])?;
            count += 1;
        }
        Ok(count)
    }

    fn ensure_case_exists(conn: &Connection, case_id: i64) -> RepositoryResult<()> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM test_case WHERE id = ?1",
                params![case_id],
                |_row| Ok(()),
            )
            .optional()?;
        exists.ok_or_else(|| RepositoryError::not_found("test_case", case_id))
    }

    // ===== 查询辅助（测试 / CLI 输出用）=====

    /// 用例总数
    pub fn count_cases(&self, project_id: i64) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM test_case WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 套件总数
    pub fn count_suites(&self, project_id: i64) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM test_suite WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 用例标签（按写入顺序）
    pub fn labels(&self, case_id: i64) -> RepositoryResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT label FROM test_case_label WHERE case_id = ?1 ORDER BY position")?;
        let labels = stmt
            .query_map(params![case_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(labels)
    }

    /// 用例步骤名称（按 sort_order）
    pub fn step_names(&self, case_id: i64) -> RepositoryResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM test_case_step WHERE case_id = ?1 ORDER BY sort_order, id",
        )?;
        let names = stmt
            .query_map(params![case_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// 附件文件名
    pub fn attachment_names(&self, case_id: i64) -> RepositoryResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT filename FROM test_case_attachment WHERE case_id = ?1 ORDER BY id")?;
        let names = stmt
            .query_map(params![case_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// 用例名称与场景
    pub fn case_text(&self, case_id: i64) -> RepositoryResult<Option<(String, String)>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT name, scenario FROM test_case WHERE id = ?1",
                params![case_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }
}

impl TargetStore for SqliteTargetStore {
    fn find_case_id_by_key(&self, project_id: i64, key: &str) -> RepositoryResult<Option<i64>> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                r#"
                SELECT id FROM test_case
                WHERE project_id = ?1 AND zephyr_key = ?2
                ORDER BY id
                LIMIT 1
                "#,
                params![project_id, key.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn get_suite_id(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
    ) -> RepositoryResult<Option<i64>> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                r#"
                SELECT id FROM test_suite
                WHERE project_id = ?1 AND parent_id IS ?2 AND name = ?3
                ORDER BY id
                LIMIT 1
                "#,
                params![project_id, parent_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn create_suite(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
        name: &str,
        attributes: &SuiteAttributes,
    ) -> RepositoryResult<i64> {
        let conn = self.lock()?;
        let attributes_json = serde_json::to_string(attributes)?;
        conn.execute(
            r#"
            INSERT INTO test_suite (project_id, parent_id, name, attributes_json)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![project_id, parent_id, name, attributes_json],
        )?;
        let id = conn.last_insert_rowid();
        debug!(suite_id = id, parent_id = ?parent_id, name = %name, "创建套件");
        Ok(id)
    }

    fn create_case_with_steps(
        &self,
        project_id: i64,
        suite_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<i64> {
        let mut conn = self.lock()?;
        let attributes_json = serde_json::to_string(&payload.attributes)?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO test_case (
                project_id, suite_id, zephyr_key, name, setup, scenario,
                expected, teardown, description, is_steps, attributes_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                project_id,
                suite_id,
                payload.zephyr_key(),
                payload.name,
                payload.setup,
                payload.scenario,
                payload.expected,
                payload.teardown,
                payload.description,
                payload.is_steps,
                attributes_json,
            ],
        )?;
        let case_id = tx.last_insert_rowid();
        let steps = Self::replace_steps_tx(&tx, case_id, payload)?;
        tx.commit()?;

        debug!(case_id, suite_id, steps, "创建用例");
        Ok(case_id)
    }

    fn update_case_with_steps(
        &self,
        project_id: i64,
        case_id: i64,
        suite_id: i64,
        payload: &CasePayload,
    ) -> RepositoryResult<()> {
        let mut conn = self.lock()?;
        let attributes_json = serde_json::to_string(&payload.attributes)?;
        let tx = conn.transaction()?;

        let affected = tx.execute(
            r#"
            UPDATE test_case SET
                suite_id = ?1, zephyr_key = ?2, name = ?3, setup = ?4, scenario = ?5,
                expected = ?6, teardown = ?7, description = ?8, is_steps = ?9,
                attributes_json = ?10, updated_at = datetime('now')
            WHERE id = ?11 AND project_id = ?12
            "#,
            params![
                suite_id,
                payload.zephyr_key(),
                payload.name,
                payload.setup,
                payload.scenario,
                payload.expected,
                payload.teardown,
                payload.description,
                payload.is_steps,
                attributes_json,
                case_id,
                project_id,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("test_case", case_id));
        }
        Self::replace_steps_tx(&tx, case_id, payload)?;
        tx.commit()?;
        Ok(())
    }

    fn set_labels(&self, case_id: i64, labels: &[String]) -> RepositoryResult<()> {
        let mut conn = self.lock()?;
        Self::ensure_case_exists(&conn, case_id)?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM test_case_label WHERE case_id = ?1", params![case_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO test_case_label (case_id, position, label) VALUES (?1, ?2, ?3)",
            )?;
            for (position, label) in labels.iter().enumerate() {
                stmt.execute(params![case_id, position as i64, label])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn attach_file(
        &self,
        _project_id: i64,
        case_id: i64,
        filename: &str,
        content: &[u8],
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        Self::ensure_case_exists(&conn, case_id)?;
        conn.execute(
            r#"
            INSERT INTO test_case_attachment (case_id, filename, size_bytes, content)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![case_id, filename, content.len() as i64, content],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::{CaseAttributes, StepPayload, ZephyrMetadata};

    fn create_test_store() -> SqliteTargetStore {
        let conn = Connection::open_in_memory().unwrap();
        SqliteTargetStore::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    fn create_test_payload(key: &str, steps: usize) -> CasePayload {
        CasePayload {
            name: format!("[{}] Case", key),
            scenario: "Do it".to_string(),
            is_steps: steps > 0,
            attributes: CaseAttributes {
                zephyr: ZephyrMetadata {
                    key: Some(key.to_string()),
                    ..Default::default()
                },
            },
            steps: (0..steps)
                .map(|i| StepPayload {
                    sort_order: i,
                    name: format!("Step {}", i + 1),
                    scenario: "s".to_string(),
                    expected: String::new(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_suite_lookup_with_null_parent() {
        let store = create_test_store();
        let attrs = SuiteAttributes::new(Some("ui"), None);
        let root = store.create_suite(1, None, "ui", &attrs).unwrap();
        let child = store.create_suite(1, Some(root), "ui", &attrs).unwrap();

        assert_eq!(store.get_suite_id(1, None, "ui").unwrap(), Some(root));
        assert_eq!(store.get_suite_id(1, Some(root), "ui").unwrap(), Some(child));
        assert_eq!(store.get_suite_id(1, Some(child), "ui").unwrap(), None);
    }

    #[test]
    fn test_create_update_case() {
        let store = create_test_store();
        let suite = store
            .create_suite(1, None, "ui", &SuiteAttributes::default())
            .unwrap();
        let id = store
            .create_case_with_steps(1, suite, &create_test_payload("EX-1", 3))
            .unwrap();
        assert_eq!(store.find_case_id_by_key(1, " EX-1 ").unwrap(), Some(id));
        assert_eq!(store.step_names(id).unwrap().len(), 3);

        store
            .update_case_with_steps(1, id, suite, &create_test_payload("EX-1", 1))
            .unwrap();
        assert_eq!(store.step_names(id).unwrap(), vec!["Step 1"]);
        assert_eq!(store.count_cases(1).unwrap(), 1);

        let missing = store.update_case_with_steps(1, 999, suite, &create_test_payload("X", 0));
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }

    #[test]
    fn test_labels_and_attachments() {
        let store = create_test_store();
        let suite = store
            .create_suite(1, None, "ui", &SuiteAttributes::default())
            .unwrap();
        let id = store
            .create_case_with_steps(1, suite, &create_test_payload("EX-1", 0))
            .unwrap();

        store
            .set_labels(id, &["b".to_string(), "a".to_string()])
            .unwrap();
        store.set_labels(id, &["z".to_string(), "b".to_string()]).unwrap();
        assert_eq!(store.labels(id).unwrap(), vec!["z", "b"]);

        store.attach_file(1, id, "log.txt", b"hello").unwrap();
        assert_eq!(store.attachment_names(id).unwrap(), vec!["log.txt"]);
        assert!(store.attach_file(1, 404, "x.txt", b"").is_err());
        assert!(store.set_labels(404, &[]).is_err());
    }
}
