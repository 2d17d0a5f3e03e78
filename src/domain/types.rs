// ==========================================
// CSV 导入引擎 - 领域类型定义
// ==========================================
// 职责: 方言分隔符、档案状态、日志状态、字段类型、关联方式
// 序列化格式: 与数据库/配置中的字面值一致
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// CSV 分隔符 (Separator)
// ==========================================
// 配置中以字面 token 存储: "," ";" "tab" "|"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CsvSeparator {
    #[default]
    #[serde(rename = ",")]
    Comma,
    #[serde(rename = ";")]
    Semicolon,
    #[serde(rename = "tab")]
    Tab,
    #[serde(rename = "|")]
    Pipe,
}

impl CsvSeparator {
    /// 分隔符对应的实际字节
    pub fn as_byte(&self) -> u8 {
        match self {
            CsvSeparator::Comma => b',',
            CsvSeparator::Semicolon => b';',
            CsvSeparator::Tab => b'\t',
            CsvSeparator::Pipe => b'|',
        }
    }

    /// 配置 token
    pub fn token(&self) -> &'static str {
        match self {
            CsvSeparator::Comma => ",",
            CsvSeparator::Semicolon => ";",
            CsvSeparator::Tab => "tab",
            CsvSeparator::Pipe => "|",
        }
    }
}

impl fmt::Display for CsvSeparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for CsvSeparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "," => Ok(CsvSeparator::Comma),
            ";" => Ok(CsvSeparator::Semicolon),
            "tab" | "\t" => Ok(CsvSeparator::Tab),
            "|" => Ok(CsvSeparator::Pipe),
            other => Err(format!("不支持的分隔符: {:?}", other)),
        }
    }
}

// ==========================================
// 档案状态 (Archive State)
// ==========================================
// 流转: DRAFT → DONE / DRAFT → CANCELED / CANCELED → DRAFT
// DONE 为终态（重新导入需新建档案）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveState {
    Draft,    // 草稿（可编辑、可导入）
    Done,     // 已导入
    Canceled, // 已取消
}

impl ArchiveState {
    /// 是否允许从当前状态流转到目标状态
    pub fn can_transition_to(&self, target: ArchiveState) -> bool {
        matches!(
            (self, target),
            (ArchiveState::Draft, ArchiveState::Done)
                | (ArchiveState::Draft, ArchiveState::Canceled)
                | (ArchiveState::Canceled, ArchiveState::Draft)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveState::Draft => "DRAFT",
            ArchiveState::Done => "DONE",
            ArchiveState::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ArchiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ArchiveState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(ArchiveState::Draft),
            "DONE" => Ok(ArchiveState::Done),
            "CANCELED" => Ok(ArchiveState::Canceled),
            other => Err(format!("未知档案状态: {}", other)),
        }
    }
}

// ==========================================
// 导入日志状态 (Log Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Done,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Done => "done",
            LogStatus::Error => "error",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(LogStatus::Done),
            "error" => Ok(LogStatus::Error),
            other => Err(format!("未知日志状态: {}", other)),
        }
    }
}

// ==========================================
// 字段类型 (Field Kind)
// ==========================================
// 映射行按此类型将单元格文本转换为内部值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Char,    // 文本
    Integer, // 整数
    Numeric, // 浮点
    Boolean, // 布尔
    Date,    // 日期（YYYYMMDD / YYYY-MM-DD）
}

// ==========================================
// 父子关联方式 (Relation Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// 子记录在 rel_field 中持有父记录引用
    #[default]
    ParentReference,
    /// 父记录的 rel_field 集合包含子记录
    ParentCollection,
}
