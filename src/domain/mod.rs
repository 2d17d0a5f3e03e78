// ==========================================
// CSV 导入引擎 - 领域模型层
// ==========================================
// 职责: 定义 Profile / 档案 / 映射 / 导入日志 / 值树
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod archive;
pub mod import_log;
pub mod mapping;
pub mod profile;
pub mod record;
pub mod types;

// 重导出核心类型
pub use archive::CsvArchive;
pub use import_log::{ImportLogEntry, LogKind};
pub use mapping::{FieldMapping, MappingLine};
pub use profile::{CsvProfile, ProfileMapping};
pub use record::{FieldValues, NodeId, RecordRef, ValueNode, ValueTree};
pub use types::{ArchiveState, CsvSeparator, FieldKind, LogStatus, RelationKind};
