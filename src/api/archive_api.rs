// ==========================================
// CSV 导入引擎 - 档案管理 API
// ==========================================
// 职责: 档案创建（命名 + 载荷落盘）、状态流转、触发导入
// 红线: 载荷仅在 DRAFT 状态可替换
// ==========================================

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::archive::CsvArchive;
use crate::domain::import_log::ImportLogEntry;
use crate::domain::profile::CsvProfile;
use crate::domain::types::ArchiveState;
use crate::importer::archive_naming::{archive_name, date_prefix, next_sequence};
use crate::importer::{ArchiveImportReport, CsvImporter};
use crate::repository::{ArchiveRepository, ArchiveStorage, ProfileRepository};

// ==========================================
// ArchiveApi - 档案管理 API
// ==========================================

/// 档案管理API
///
/// 职责：
/// 1. 创建档案（自动命名，未指定 Profile 时使用唯一的启用 Profile）
/// 2. 载荷替换（仅 DRAFT）
/// 3. 状态流转（取消 / 重置为草稿）
/// 4. 触发导入与查询导入日志
pub struct ArchiveApi {
    archive_repo: Arc<ArchiveRepository>,
    profile_repo: Arc<ProfileRepository>,
    storage: ArchiveStorage,
    importer: Arc<dyn CsvImporter>,
}

impl ArchiveApi {
    pub fn new(
        archive_repo: Arc<ArchiveRepository>,
        profile_repo: Arc<ProfileRepository>,
        storage: ArchiveStorage,
        importer: Arc<dyn CsvImporter>,
    ) -> Self {
        Self {
            archive_repo,
            profile_repo,
            storage,
            importer,
        }
    }

    /// 创建档案（档案日期取当前时间）
    pub fn create_archive(&self, profile_id: Option<i64>, payload: &[u8]) -> ApiResult<CsvArchive> {
        self.create_archive_at(profile_id, payload, Local::now().naive_local())
    }

    /// 创建档案
    ///
    /// # 参数
    /// - profile_id: Profile ID；为 None 时使用唯一的启用 Profile
    /// - payload: CSV 载荷
    /// - date_archive: 档案日期（决定档案名的日期部分与序号）
    ///
    /// # 返回
    /// - Ok(CsvArchive): 新建的 DRAFT 档案
    /// - Err(ApiError): Profile 不存在/未启用、载荷为空、落盘失败
    pub fn create_archive_at(
        &self,
        profile_id: Option<i64>,
        payload: &[u8],
        date_archive: NaiveDateTime,
    ) -> ApiResult<CsvArchive> {
        if payload.is_empty() {
            return Err(ApiError::InvalidInput("档案载荷不能为空".to_string()));
        }
        let profile = self.resolve_profile(profile_id)?;

        let date = date_archive.date();
        let existing = self.archive_repo.list_names_with_prefix(&date_prefix(date))?;
        let sequence = next_sequence(&existing, date, &profile.name)
            .map_err(|e| ApiError::InternalError(format!("档案命名失败: {}", e)))?;
        let name = archive_name(date, sequence, &profile.name);

        let id = self.archive_repo.insert(profile.id, &name, date_archive)?;
        let archive = self.get_archive(id)?;

        if let Err(e) = self.storage.write(&archive, payload) {
            warn!(archive_id = id, error = %e, "载荷落盘失败，删除档案");
            self.archive_repo.delete(id)?;
            return Err(e.into());
        }

        info!(archive_id = id, archive = %name, profile_id = profile.id, "档案已创建");
        Ok(archive)
    }

    /// 替换载荷（仅 DRAFT）
    pub fn replace_payload(&self, id: i64, payload: &[u8]) -> ApiResult<()> {
        if payload.is_empty() {
            return Err(ApiError::InvalidInput("档案载荷不能为空".to_string()));
        }
        let archive = self.get_archive(id)?;
        if !archive.is_editable() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "档案 {} 状态为 {}，载荷不可修改",
                archive.archive_name,
                archive.state.as_str()
            )));
        }
        self.storage.write(&archive, payload)?;
        Ok(())
    }

    /// 取消档案（DRAFT → CANCELED）
    pub fn cancel(&self, id: i64) -> ApiResult<CsvArchive> {
        self.transition(id, ArchiveState::Canceled)
    }

    /// 重置为草稿（CANCELED → DRAFT）
    pub fn reset_to_draft(&self, id: i64) -> ApiResult<CsvArchive> {
        self.transition(id, ArchiveState::Draft)
    }

    /// 删除档案（导入日志级联删除，载荷文件一并删除）
    pub fn delete_archive(&self, id: i64) -> ApiResult<()> {
        let archive = self.get_archive(id)?;
        self.storage.remove(&archive)?;
        self.archive_repo.delete(id)?;
        info!(archive_id = id, "档案已删除");
        Ok(())
    }

    /// 导入档案（按给定顺序）
    pub fn import(&self, archive_ids: &[i64]) -> ApiResult<Vec<ArchiveImportReport>> {
        if archive_ids.is_empty() {
            return Err(ApiError::InvalidInput("档案ID列表不能为空".to_string()));
        }
        Ok(self.importer.import(archive_ids)?)
    }

    pub fn get_archive(&self, id: i64) -> ApiResult<CsvArchive> {
        self.archive_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("CsvArchive(id={})", id)))
    }

    pub fn list_drafts(&self) -> ApiResult<Vec<CsvArchive>> {
        Ok(self.archive_repo.list_drafts()?)
    }

    /// 查询档案的导入日志
    pub fn list_log_entries(&self, id: i64) -> ApiResult<Vec<ImportLogEntry>> {
        Ok(self.archive_repo.find_log_entries(id)?)
    }

    // ==========================================
    // 内部方法
    // ==========================================

    fn resolve_profile(&self, profile_id: Option<i64>) -> ApiResult<CsvProfile> {
        let profile = match profile_id {
            Some(id) => self
                .profile_repo
                .find_by_id(id)?
                .ok_or_else(|| ApiError::NotFound(format!("CsvProfile(id={})", id)))?,
            None => self.profile_repo.default_profile()?.ok_or_else(|| {
                ApiError::InvalidInput("未指定 Profile，且启用的 Profile 不唯一".to_string())
            })?,
        };
        if !profile.active {
            return Err(ApiError::BusinessRuleViolation(format!(
                "Profile {} 未启用",
                profile.name
            )));
        }
        Ok(profile)
    }

    fn transition(&self, id: i64, target: ArchiveState) -> ApiResult<CsvArchive> {
        self.archive_repo.update_state(id, target)?;
        info!(archive_id = id, state = %target.as_str(), "档案状态已更新");
        self.get_archive(id)
    }
}
