// ==========================================
// CSV 导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// 数据目录环境变量
pub const DATA_PATH_ENV: &str = "CSV_IMPORT_DATA_PATH";

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "CSV_IMPORT_DB_PATH";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }
}

impl ImportConfigReader for ConfigManager {
    fn get_data_path(&self) -> Result<PathBuf, Box<dyn Error>> {
        if let Ok(path) = std::env::var(DATA_PATH_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        if let Some(value) = self.get_config_value(config_keys::DATA_PATH)? {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        Ok(default_data_path())
    }

    fn get_locale(&self) -> Result<String, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::LOCALE, "en")?;
        Ok(value.trim().to_string())
    }
}

/// 默认数据目录: dirs::data_dir()/csv-import（不可用时回退到 ./csv-import-data）
pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("csv-import"))
        .unwrap_or_else(|| PathBuf::from("./csv-import-data"))
}

/// 默认数据库路径
///
/// # 优先级
/// 1. 环境变量 CSV_IMPORT_DB_PATH
/// 2. 默认数据目录下的 csv_import.db
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let dir = default_data_path();
    // 确保目录存在
    std::fs::create_dir_all(&dir).ok();
    dir.join("csv_import.db").to_string_lossy().to_string()
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 存储
    pub const DATA_PATH: &str = "csv_import/data_path";

    // 日志消息语言
    pub const LOCALE: &str = "csv_import/locale";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> ConfigManager {
        let conn = crate::db::open_in_memory().unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_locale_default_and_override() {
        let config = setup();
        assert_eq!(config.get_locale().unwrap(), "en");

        config.set_global_config_value(config_keys::LOCALE, "zh-CN").unwrap();
        assert_eq!(config.get_locale().unwrap(), "zh-CN");
    }

    #[test]
    fn test_archive_dir_from_config() {
        // 环境变量优先级更高，设置时跳过
        if std::env::var(DATA_PATH_ENV).is_ok() {
            return;
        }
        let config = setup();
        config
            .set_global_config_value(config_keys::DATA_PATH, "/srv/import")
            .unwrap();

        assert_eq!(config.get_data_path().unwrap(), PathBuf::from("/srv/import"));
        assert_eq!(
            config.get_archive_dir().unwrap(),
            PathBuf::from("/srv/import/csv_import")
        );
    }
}
