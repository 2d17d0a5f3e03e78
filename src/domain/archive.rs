// ==========================================
// CSV 导入引擎 - 档案 (Archive)
// ==========================================
// 职责: 一份上传的 CSV 载荷，绑定唯一 Profile
// 红线: 离开 DRAFT 后载荷不可修改
// ==========================================

use crate::domain::types::ArchiveState;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvArchive {
    pub id: i64,
    pub profile_id: i64,
    pub archive_name: String,        // <日期>_<序号>_<slug>.csv
    pub date_archive: NaiveDateTime, // 档案日期
    pub state: ArchiveState,
    pub log: String,                 // 追加式日志文本
}

impl CsvArchive {
    /// 载荷是否仍可替换
    pub fn is_editable(&self) -> bool {
        self.state == ArchiveState::Draft
    }

    /// 载荷文件名（空格替换为下划线）
    pub fn storage_name(&self) -> String {
        self.archive_name.replace(' ', "_")
    }
}
