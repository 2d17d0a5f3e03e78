// ==========================================
// CSV 导入引擎 - SQLite 记录存储实现
// ==========================================
// 职责: 以 record(model, values_json) + record_link 表实现 RecordStore
// 查询: json_extract 等值匹配
// ==========================================

use crate::domain::record::{FieldValues, RecordRef};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{RecordStore, SearchDomain};
use chrono::Local;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    // 模型 → 必填字段（模拟存储侧的非空约束）
    required_fields: HashMap<String, Vec<String>>,
}

impl SqliteRecordStore {
    /// 创建新的记录存储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            required_fields: HashMap::new(),
        }
    }

    /// 声明模型的必填字段（create 时缺失或为空即失败）
    pub fn with_required(mut self, model: &str, fields: &[&str]) -> Self {
        self.required_fields.insert(
            model.to_string(),
            fields.iter().map(|f| f.to_string()).collect(),
        );
        self
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 统计模型记录数
    pub fn count(&self, model: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM record WHERE model = ?1",
            params![model],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// 列出模型全部记录（按 id 升序）
    pub fn list(&self, model: &str) -> RepositoryResult<Vec<(RecordRef, FieldValues)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, values_json FROM record WHERE model = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![model], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, raw)| {
                let values: FieldValues = serde_json::from_str(&raw)?;
                Ok((RecordRef::new(model, id), values))
            })
            .collect()
    }

    fn check_required(&self, model: &str, values: &FieldValues) -> RepositoryResult<()> {
        let Some(fields) = self.required_fields.get(model) else {
            return Ok(());
        };
        for field in fields {
            let missing = match values.get(field) {
                None | Some(JsonValue::Null) => true,
                Some(JsonValue::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                return Err(RepositoryError::NotNullViolation(format!(
                    "{}.{} 不能为空",
                    model, field
                )));
            }
        }
        Ok(())
    }
}

/// JSON 路径（字段名中的引号被剔除）
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', ""))
}

/// JSON 值 → json_extract 的比较值
fn to_sql_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// 保存点名称只允许标识符字符
fn check_savepoint_name(name: &str) -> RepositoryResult<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::ValidationError(format!(
            "非法保存点名称: {}",
            name
        )))
    }
}

impl RecordStore for SqliteRecordStore {
    fn search(&self, model: &str, domain: &SearchDomain<'_>) -> RepositoryResult<Vec<RecordRef>> {
        let mut sql = String::from("SELECT id FROM record WHERE model = ?");
        let mut bind: Vec<SqlValue> = vec![SqlValue::Text(model.to_string())];

        for (field, value) in domain {
            if value.is_null() {
                sql.push_str(" AND json_extract(values_json, ?) IS NULL");
                bind.push(SqlValue::Text(json_path(field)));
            } else {
                sql.push_str(" AND json_extract(values_json, ?) = ?");
                bind.push(SqlValue::Text(json_path(field)));
                bind.push(to_sql_value(value));
            }
        }
        sql.push_str(" ORDER BY id");

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(bind.iter()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ids.into_iter().map(|id| RecordRef::new(model, id)).collect())
    }

    fn create(&self, model: &str, values: &FieldValues) -> RepositoryResult<RecordRef> {
        self.check_required(model, values)?;

        let now = Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string();
        let values_json = serde_json::to_string(values)?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO record (model, values_json, create_date, write_date)
            VALUES (?1, ?2, ?3, ?3)
            "#,
            params![model, values_json, now],
        )?;

        Ok(RecordRef::new(model, conn.last_insert_rowid()))
    }

    fn write(&self, record: &RecordRef, values: &FieldValues) -> RepositoryResult<()> {
        let mut merged = self.read(record)?;
        for (k, v) in values {
            merged.insert(k.clone(), v.clone());
        }
        self.check_required(&record.model, &merged)?;

        let now = Local::now().naive_local().format("%Y-%m-%d %H:%M:%S").to_string();
        let values_json = serde_json::to_string(&merged)?;

        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE record SET values_json = ?1, write_date = ?2 WHERE id = ?3 AND model = ?4",
            params![values_json, now, record.id, record.model],
        )?;
        Ok(())
    }

    fn read(&self, record: &RecordRef) -> RepositoryResult<FieldValues> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            "SELECT values_json FROM record WHERE id = ?1 AND model = ?2",
            params![record.id, record.model],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                entity: record.model.clone(),
                id: record.id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn attach(&self, parent: &RecordRef, field: &str, child: &RecordRef) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO record_link (parent_id, field, child_id) VALUES (?1, ?2, ?3)",
            params![parent.id, field, child.id],
        )?;
        Ok(())
    }

    fn linked(&self, parent: &RecordRef, field: &str) -> RepositoryResult<Vec<RecordRef>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT r.id, r.model
            FROM record_link l
            JOIN record r ON r.id = l.child_id
            WHERE l.parent_id = ?1 AND l.field = ?2
            ORDER BY r.id
            "#,
        )?;
        let refs = stmt
            .query_map(params![parent.id, field], |row| {
                Ok(RecordRef::new(row.get::<_, String>(1)?, row.get::<_, i64>(0)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    fn savepoint(&self, name: &str) -> RepositoryResult<()> {
        check_savepoint_name(name)?;
        let conn = self.get_conn()?;
        conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        Ok(())
    }

    fn release(&self, name: &str) -> RepositoryResult<()> {
        check_savepoint_name(name)?;
        let conn = self.get_conn()?;
        conn.execute_batch(&format!("RELEASE SAVEPOINT {}", name))?;
        Ok(())
    }

    fn rollback_to(&self, name: &str) -> RepositoryResult<()> {
        check_savepoint_name(name)?;
        let conn = self.get_conn()?;
        conn.execute_batch(&format!(
            "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
            name
        ))?;
        Ok(())
    }
}
