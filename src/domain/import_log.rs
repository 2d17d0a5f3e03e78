// ==========================================
// CSV 导入引擎 - 导入日志
// ==========================================
// 职责: 每条导入结果（done/error）的审计记录
// 红线: 写入一次，不可修改；按档案粒度持久化
// ==========================================

use crate::domain::record::RecordRef;
use crate::domain::types::LogStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// LogKind - 日志消息类型
// ==========================================
// 与 locales 中 import.* 消息键一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    RecordSaved,
    RecordUpdated,
    SuccessSimulation,
    CodeNotFound,
    NotCreateUpdate,
    CantUpdate,
    CreationError,
    UpdatingError,
    ConversionError,
    RequiredEmpty,
    RelationMissing,
    FormatError,
    ReadError,
    MappingError,
    ConfigError,
    ArchiveState,
    NotificationError,
}

impl LogKind {
    /// 消息键（locales 中 import.<key>）
    pub fn key(&self) -> &'static str {
        match self {
            LogKind::RecordSaved => "record_saved",
            LogKind::RecordUpdated => "record_updated",
            LogKind::SuccessSimulation => "success_simulation",
            LogKind::CodeNotFound => "code_not_found",
            LogKind::NotCreateUpdate => "not_create_update",
            LogKind::CantUpdate => "cant_update",
            LogKind::CreationError => "creation_error",
            LogKind::UpdatingError => "updating_error",
            LogKind::ConversionError => "conversion_error",
            LogKind::RequiredEmpty => "required_empty",
            LogKind::RelationMissing => "relation_missing",
            LogKind::FormatError => "format_error",
            LogKind::ReadError => "read_error",
            LogKind::MappingError => "mapping_error",
            LogKind::ConfigError => "config_error",
            LogKind::ArchiveState => "archive_state",
            LogKind::NotificationError => "notification_error",
        }
    }

    /// 默认状态
    pub fn status(&self) -> LogStatus {
        match self {
            LogKind::RecordSaved | LogKind::RecordUpdated | LogKind::SuccessSimulation => {
                LogStatus::Done
            }
            _ => LogStatus::Error,
        }
    }

    const ALL: [LogKind; 17] = [
        LogKind::RecordSaved,
        LogKind::RecordUpdated,
        LogKind::SuccessSimulation,
        LogKind::CodeNotFound,
        LogKind::NotCreateUpdate,
        LogKind::CantUpdate,
        LogKind::CreationError,
        LogKind::UpdatingError,
        LogKind::ConversionError,
        LogKind::RequiredEmpty,
        LogKind::RelationMissing,
        LogKind::FormatError,
        LogKind::ReadError,
        LogKind::MappingError,
        LogKind::ConfigError,
        LogKind::ArchiveState,
        LogKind::NotificationError,
    ];
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogKind::ALL
            .iter()
            .find(|k| k.key() == s)
            .copied()
            .ok_or_else(|| format!("未知日志类型: {}", s))
    }
}

// ==========================================
// ImportLogEntry - 导入日志条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLogEntry {
    pub create_date: NaiveDateTime,
    pub record: Option<RecordRef>, // 关联记录（可选）
    pub status: LogStatus,
    pub kind: LogKind,
    pub line: Option<usize>,       // 来源行号
    pub comment: String,           // 已本地化的说明
}

impl ImportLogEntry {
    pub fn is_done(&self) -> bool {
        self.status == LogStatus::Done
    }

    pub fn is_error(&self) -> bool {
        self.status == LogStatus::Error
    }

    /// 渲染为档案日志文本中的一行
    pub fn to_log_line(&self) -> String {
        let record = self
            .record
            .as_ref()
            .map(|r| format!(" [{}]", r))
            .unwrap_or_default();
        format!(
            "{} {}{} {}",
            self.create_date.format("%Y-%m-%d %H:%M:%S"),
            self.status,
            record,
            self.comment.replace('\n', " ")
        )
    }
}
