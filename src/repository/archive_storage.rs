// ==========================================
// CSV 导入引擎 - 档案载荷存储
// ==========================================
// 位置: <data_path>/csv_import/<档案名，空格替换为下划线>
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::archive::CsvArchive;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArchiveStorage {
    root: PathBuf,
}

impl ArchiveStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 从配置读取载荷目录
    pub fn from_config(config: &dyn ImportConfigReader) -> RepositoryResult<Self> {
        let root = config
            .get_archive_dir()
            .map_err(|e| RepositoryError::InternalError(format!("读取档案目录配置失败: {}", e)))?;
        Ok(Self::new(root))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 档案载荷路径
    pub fn path_for(&self, archive: &CsvArchive) -> PathBuf {
        self.root.join(archive.storage_name())
    }

    /// 写入载荷（目录不存在时创建）
    pub fn write(&self, archive: &CsvArchive, payload: &[u8]) -> RepositoryResult<PathBuf> {
        fs::create_dir_all(&self.root).map_err(|e| {
            RepositoryError::InternalError(format!("创建目录 {} 失败: {}", self.root.display(), e))
        })?;
        let path = self.path_for(archive);
        fs::write(&path, payload).map_err(|e| {
            RepositoryError::InternalError(format!("写入档案 {} 失败: {}", path.display(), e))
        })?;
        Ok(path)
    }

    /// 读取载荷
    pub fn read(&self, archive: &CsvArchive) -> RepositoryResult<Vec<u8>> {
        let path = self.path_for(archive);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RepositoryError::NotFound {
                entity: "ArchivePayload".to_string(),
                id: path.display().to_string(),
            },
            _ => RepositoryError::InternalError(format!("读取档案 {} 失败: {}", path.display(), e)),
        })
    }

    /// 删除载荷（不存在视为成功）
    pub fn remove(&self, archive: &CsvArchive) -> RepositoryResult<()> {
        match fs::remove_file(self.path_for(archive)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepositoryError::InternalError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ArchiveState;
    use chrono::NaiveDate;

    fn archive(name: &str) -> CsvArchive {
        CsvArchive {
            id: 1,
            profile_id: 1,
            archive_name: name.to_string(),
            date_archive: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            state: ArchiveState::Draft,
            log: String::new(),
        }
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = ArchiveStorage::new(dir.path().join("csv_import"));
        let a = archive("2024-03-01_0_my parties.csv");

        let path = storage.write(&a, b"name\nAcme\n").unwrap();
        assert!(path.ends_with("2024-03-01_0_my_parties.csv"));
        assert_eq!(storage.read(&a).unwrap(), b"name\nAcme\n");

        storage.remove(&a).unwrap();
        assert!(matches!(storage.read(&a), Err(RepositoryError::NotFound { .. })));
        storage.remove(&a).unwrap();
    }
}
