// ==========================================
// CSV 导入引擎 - 核心库
// ==========================================
// 职责: CSV 档案 → 目标记录（新建/更新 + 层级关联 + 审计日志）
// 技术栈: Rust + SQLite
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "en");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 导入引擎
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ArchiveState, CsvSeparator, FieldKind, LogStatus, RelationKind};

// 领域实体
pub use domain::{
    CsvArchive, CsvProfile, FieldMapping, ImportLogEntry, LogKind, MappingLine, ProfileMapping,
    RecordRef, ValueTree,
};

// 导入引擎
pub use importer::{
    ArchiveImportReport, CsvImporter, CsvImporterImpl, FieldMapper, ImportError, ImportHooks,
    MappingRegistry, Notifier,
};

// 仓储
pub use repository::{RecordStore, RepositoryError, SqliteRecordStore};

// API
pub use api::ArchiveApi;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "csv-import";
