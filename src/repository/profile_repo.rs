// ==========================================
// CSV 导入引擎 - Profile 仓储
// ==========================================
// 存储: csv_profile 表（profile_json 为完整配置的 JSON）
// 红线: 写入前执行 CsvProfile::validate
// ==========================================

use crate::domain::profile::CsvProfile;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct ProfileRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProfileRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入 Profile，返回新 id（忽略入参中的 id）
    pub fn insert(&self, profile: &CsvProfile) -> RepositoryResult<i64> {
        profile.validate().map_err(RepositoryError::ValidationError)?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO csv_profile (name, model, active, profile_json) VALUES (?1, ?2, ?3, '{}')",
            params![profile.name, profile.model, profile.active],
        )?;
        let id = conn.last_insert_rowid();

        let mut stored = profile.clone();
        stored.id = id;
        conn.execute(
            "UPDATE csv_profile SET profile_json = ?1 WHERE id = ?2",
            params![serde_json::to_string(&stored)?, id],
        )?;
        Ok(id)
    }

    /// 更新 Profile
    pub fn update(&self, profile: &CsvProfile) -> RepositoryResult<()> {
        profile.validate().map_err(RepositoryError::ValidationError)?;

        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE csv_profile
            SET name = ?1, model = ?2, active = ?3, profile_json = ?4
            WHERE id = ?5
            "#,
            params![
                profile.name,
                profile.model,
                profile.active,
                serde_json::to_string(profile)?,
                profile.id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "CsvProfile".to_string(),
                id: profile.id.to_string(),
            });
        }
        Ok(())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<CsvProfile>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT profile_json FROM csv_profile WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => {
                let mut profile: CsvProfile = serde_json::from_str(&json)?;
                profile.id = id;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// 列出启用的 Profile（按 id 升序）
    pub fn list_active(&self) -> RepositoryResult<Vec<CsvProfile>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, profile_json FROM csv_profile WHERE active = 1 ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, json)| {
                let mut profile: CsvProfile = serde_json::from_str(&json)?;
                profile.id = id;
                Ok(profile)
            })
            .collect()
    }

    /// 默认 Profile：仅当恰好存在一个启用的 Profile 时返回
    pub fn default_profile(&self) -> RepositoryResult<Option<CsvProfile>> {
        let mut profiles = self.list_active()?;
        if profiles.len() == 1 {
            Ok(profiles.pop())
        } else {
            Ok(None)
        }
    }

    /// 删除 Profile（其档案级联删除）
    pub fn delete(&self, id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute("DELETE FROM csv_profile WHERE id = ?1", params![id])?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::profile::ProfileMapping;
    use crate::domain::types::CsvSeparator;

    fn setup() -> ProfileRepository {
        let conn = crate::db::open_in_memory().unwrap();
        ProfileRepository::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_insert_find_update() {
        let repo = setup();
        let mut profile = CsvProfile::new("Parties", "party.party");
        profile.separator = CsvSeparator::Semicolon;
        profile.mappings = vec![ProfileMapping::base("party")];

        let id = repo.insert(&profile).unwrap();
        let mut loaded = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.separator, CsvSeparator::Semicolon);
        assert_eq!(loaded.mappings, profile.mappings);

        loaded.has_header = true;
        repo.update(&loaded).unwrap();
        assert!(repo.find_by_id(id).unwrap().unwrap().has_header);
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let repo = setup();
        let mut profile = CsvProfile::new("Parties", "party.party");
        profile.update_record = true;

        let err = repo.insert(&profile).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_default_profile_only_when_single() {
        let repo = setup();
        assert!(repo.default_profile().unwrap().is_none());

        repo.insert(&CsvProfile::new("Parties", "party.party")).unwrap();
        assert_eq!(repo.default_profile().unwrap().unwrap().name, "Parties");

        repo.insert(&CsvProfile::new("Sales", "sale.sale")).unwrap();
        assert!(repo.default_profile().unwrap().is_none());
    }
}
