// ==========================================
// CSV 导入引擎 - 档案与导入日志仓储
// ==========================================
// 职责: csv_archive / csv_import_log 表的数据访问
// 红线: Repository 不做业务逻辑,只做数据映射（状态转换合法性除外）
// ==========================================

use crate::domain::archive::CsvArchive;
use crate::domain::import_log::{ImportLogEntry, LogKind};
use crate::domain::record::RecordRef;
use crate::domain::types::{ArchiveState, LogStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// ArchiveRepository - 档案仓储
// ==========================================
pub struct ArchiveRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ArchiveRepository {
    /// 创建新的档案仓储
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 档案写入
    // ==========================================

    /// 插入档案（初始状态 DRAFT）
    ///
    /// # 返回
    /// - `Ok(id)`: 新档案 id
    pub fn insert(
        &self,
        profile_id: i64,
        archive_name: &str,
        date_archive: NaiveDateTime,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO csv_archive (profile_id, archive_name, date_archive, state, log)
            VALUES (?1, ?2, ?3, ?4, '')
            "#,
            params![
                profile_id,
                archive_name,
                date_archive.format(DATETIME_FMT).to_string(),
                ArchiveState::Draft.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 更新档案状态（校验状态转换）
    pub fn update_state(&self, id: i64, target: ArchiveState) -> RepositoryResult<()> {
        let current = self
            .find_by_id(id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "CsvArchive".to_string(),
                id: id.to_string(),
            })?;

        if !current.state.can_transition_to(target) {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.state.to_string(),
                to: target.to_string(),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE csv_archive SET state = ?1 WHERE id = ?2",
            params![target.as_str(), id],
        )?;
        Ok(())
    }

    /// 追加日志文本（每行一条）
    pub fn append_log(&self, id: i64, lines: &[String]) -> RepositoryResult<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let text = lines.join("\n");
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE csv_archive
            SET log = CASE WHEN log = '' THEN ?1 ELSE log || char(10) || ?1 END
            WHERE id = ?2
            "#,
            params![text, id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "CsvArchive".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// 删除档案（导入日志级联删除）
    pub fn delete(&self, id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM csv_archive WHERE id = ?1", params![id])?;
        Ok(rows)
    }

    // ==========================================
    // 档案查询
    // ==========================================

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<CsvArchive>> {
        let conn = self.get_conn()?;
        let archive = conn
            .query_row(
                r#"
                SELECT id, profile_id, archive_name, date_archive, state, log
                FROM csv_archive WHERE id = ?1
                "#,
                params![id],
                map_archive_row,
            )
            .optional()?;
        Ok(archive)
    }

    /// 列出全部 DRAFT 档案（按 id 升序）
    pub fn list_drafts(&self) -> RepositoryResult<Vec<CsvArchive>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, profile_id, archive_name, date_archive, state, log
            FROM csv_archive WHERE state = ?1 ORDER BY id
            "#,
        )?;
        let archives = stmt
            .query_map(params![ArchiveState::Draft.as_str()], map_archive_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(archives)
    }

    /// 列出以指定前缀开头的档案名（用于同日序号计算）
    pub fn list_names_with_prefix(&self, prefix: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT archive_name FROM csv_archive WHERE substr(archive_name, 1, ?1) = ?2 ORDER BY id",
        )?;
        let names = stmt
            .query_map(params![prefix.chars().count() as i64, prefix], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    // ==========================================
    // 导入日志
    // ==========================================

    /// 批量写入导入日志条目
    ///
    /// # 参数
    /// - `archive_id`: 所属档案
    /// - `import_id`: 本次导入批次标识
    /// - `entries`: 日志条目（按产生顺序）
    pub fn insert_log_entries(
        &self,
        archive_id: i64,
        import_id: &str,
        entries: &[ImportLogEntry],
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let sp = conn.savepoint()?;

        let mut count = 0;
        for entry in entries {
            sp.execute(
                r#"
                INSERT INTO csv_import_log (
                    archive_id, import_id, create_date, record, status, kind, line, comment
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    archive_id,
                    import_id,
                    entry.create_date.format(DATETIME_FMT).to_string(),
                    entry.record.as_ref().map(|r| r.to_string()),
                    entry.status.as_str(),
                    entry.kind.key(),
                    entry.line.map(|l| l as i64),
                    entry.comment,
                ],
            )?;
            count += 1;
        }

        sp.commit()?;
        Ok(count)
    }

    /// 查询档案的导入日志（按写入顺序）
    pub fn find_log_entries(&self, archive_id: i64) -> RepositoryResult<Vec<ImportLogEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT create_date, record, status, kind, line, comment
            FROM csv_import_log WHERE archive_id = ?1 ORDER BY id
            "#,
        )?;
        let entries = stmt
            .query_map(params![archive_id], map_log_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ==========================================
// 行映射
// ==========================================

fn parse_datetime(raw: &str, col: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn text_conversion_error(col: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn map_archive_row(row: &Row) -> rusqlite::Result<CsvArchive> {
    let date_raw: String = row.get(3)?;
    let state_raw: String = row.get(4)?;
    Ok(CsvArchive {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        archive_name: row.get(2)?,
        date_archive: parse_datetime(&date_raw, 3)?,
        state: state_raw
            .parse::<ArchiveState>()
            .map_err(|e| text_conversion_error(4, e))?,
        log: row.get(5)?,
    })
}

fn map_log_row(row: &Row) -> rusqlite::Result<ImportLogEntry> {
    let date_raw: String = row.get(0)?;
    let record_raw: Option<String> = row.get(1)?;
    let status_raw: String = row.get(2)?;
    let kind_raw: String = row.get(3)?;
    let line: Option<i64> = row.get(4)?;
    Ok(ImportLogEntry {
        create_date: parse_datetime(&date_raw, 0)?,
        record: record_raw.as_deref().and_then(RecordRef::parse),
        status: status_raw
            .parse::<LogStatus>()
            .map_err(|e| text_conversion_error(2, e))?,
        kind: kind_raw
            .parse::<LogKind>()
            .map_err(|e| text_conversion_error(3, e))?,
        line: line.map(|l| l as usize),
        comment: row.get(5)?,
    })
}
