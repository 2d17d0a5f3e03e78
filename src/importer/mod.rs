// ==========================================
// CSV 导入引擎 - 导入层
// ==========================================
// 职责: 档案载荷 → 行分组 → 值树 → 目标记录
// 流程: 解析 → 映射 → 分组 → 组装 → 新建/更新 → 通知 → 日志
// ==========================================

// 模块声明
pub mod archive_naming;
pub mod csv_importer_impl;
pub mod csv_importer_trait;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod hierarchy;
pub mod import_session;
pub mod notifier;
pub mod record_resolver;
pub mod row_grouper;

// 重导出核心类型
pub use archive_naming::{archive_name, date_prefix, next_sequence, slugify};
pub use csv_importer_impl::{ArchiveImportReport, CsvImporterImpl};
pub use error::{ImportError, ImportResult};
pub use field_mapper::{FnMapper, LineMapper, MappingColumn, MappingContext, MappingRegistry, RowValues};
pub use file_parser::{CsvDialect, SourceRow};
pub use hierarchy::{HierarchyAssembler, MappingPlan};
pub use import_session::ImportSession;
pub use notifier::{LogNotifier, OutboxNotifier};
pub use record_resolver::{decide, RecordResolver, Resolution};
pub use row_grouper::{group_by_column, group_rows, RowGroup};

// 重导出 Trait 接口
pub use csv_importer_trait::{CsvImporter, FieldMapper, ImportHooks, NoopHooks, Notifier};
