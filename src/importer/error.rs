// ==========================================
// CSV 导入引擎 - 导入模块错误类型
// ==========================================
// 分级: 档案致命（中止当前档案）/ 分组局部（记录日志后继续）
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 载荷/方言错误（档案致命）=====
    #[error("档案解码失败: {0}")]
    DecodeError(String),

    #[error("CSV 方言无效: {0}")]
    DialectError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("行 {line} 列数不足: 需要 {expected} 列，实际 {actual} 列")]
    FormatError {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    // ===== 映射错误 =====
    #[error("映射 {mapping} 执行失败 (行 {line}): {message}")]
    MappingError {
        mapping: String,
        line: usize,
        message: String,
    },

    #[error("类型转换失败 (行 {row}, 字段 {field}): {message}")]
    TypeConversionError {
        row: usize,
        field: String,
        message: String,
    },

    #[error("日期格式错误 (行 {row}, 字段 {field}): 期望 YYYYMMDD 或 YYYY-MM-DD，实际 {value}")]
    DateFormatError {
        row: usize,
        field: String,
        value: String,
    },

    #[error("必填映射 {mapping} 在行 {line} 无值")]
    RequiredMappingEmpty { mapping: String, line: usize },

    // ===== 配置错误（档案致命）=====
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("Profile 无效: {0}")]
    ProfileError(String),

    // ===== 持久化错误（分组局部）=====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否中止整个档案
    ///
    /// 类型转换、必填映射为空、持久化失败只影响当前分组
    pub fn is_archive_fatal(&self) -> bool {
        !matches!(
            self,
            ImportError::TypeConversionError { .. }
                | ImportError::DateFormatError { .. }
                | ImportError::RequiredMappingEmpty { .. }
                | ImportError::Repository(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Utf8 { .. } => ImportError::DecodeError(err.to_string()),
            _ => ImportError::CsvParseError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
