// ==========================================
// CSV 导入引擎 - 字段映射仓储
// ==========================================
// 存储: external_mapping 表（按名称共享，mapping_json 为映射行）
// ==========================================

use crate::domain::mapping::FieldMapping;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct MappingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl MappingRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或覆盖映射
    pub fn upsert(&self, mapping: &FieldMapping) -> RepositoryResult<()> {
        if mapping.name.trim().is_empty() {
            return Err(RepositoryError::ValidationError(
                "映射名不能为空".to_string(),
            ));
        }
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO external_mapping (name, model, mapping_json, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(name) DO UPDATE SET
                model = excluded.model,
                mapping_json = excluded.mapping_json,
                updated_at = excluded.updated_at
            "#,
            params![mapping.name, mapping.model, serde_json::to_string(mapping)?],
        )?;
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> RepositoryResult<Option<FieldMapping>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT mapping_json FROM external_mapping WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|json| serde_json::from_str(&json).map_err(RepositoryError::from))
            .transpose()
    }

    /// 列出全部映射（按名称排序）
    pub fn list_all(&self) -> RepositoryResult<Vec<FieldMapping>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT mapping_json FROM external_mapping ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(RepositoryError::from))
            .collect()
    }

    pub fn delete(&self, name: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM external_mapping WHERE name = ?1", params![name])?;
        Ok(rows)
    }
}
