// ==========================================
// CSV 导入引擎 - API 层
// ==========================================
// 职责: 提供档案管理与导入接口,供命令行或宿主系统调用
// ==========================================

pub mod archive_api;
pub mod error;

// 重导出核心类型
pub use archive_api::ArchiveApi;
pub use error::{ApiError, ApiResult};
