// ==========================================
// CSV 导入引擎 - 导入器 Trait 定义
// ==========================================
// 职责: 定义导入流程的接口（不包含实现）
// 协作方: 映射器 / 模型钩子 / 通知投递 由外部注入
// ==========================================

use crate::domain::archive::CsvArchive;
use crate::domain::record::{FieldValues, RecordRef};
use crate::importer::csv_importer_impl::ArchiveImportReport;
use crate::importer::error::ImportResult;
use crate::importer::field_mapper::{MappingColumn, MappingContext, RowValues};
use crate::importer::file_parser::SourceRow;
use crate::repository::error::RepositoryResult;
use crate::repository::record_store::RecordStore;

// ==========================================
// CsvImporter Trait
// ==========================================
// 用途: 导入主流程
// 实现者: CsvImporterImpl
pub trait CsvImporter {
    /// 按给定顺序导入多个档案
    ///
    /// # 参数
    /// - `archive_ids`: 档案 id（逐个串行处理）
    ///
    /// # 返回
    /// - `Ok(reports)`: 每个档案一份报告（档案致命错误已转为日志条目）
    /// - `Err(...)`: 仓储层无法读写档案本身
    fn import(&self, archive_ids: &[i64]) -> ImportResult<Vec<ArchiveImportReport>>;

    /// 导入单个档案
    fn import_archive(&self, archive: &CsvArchive) -> ImportResult<ArchiveImportReport>;

    /// 解析档案载荷；解码或方言错误时返回 None
    fn read_dialect(&self, archive: &CsvArchive) -> Option<(Vec<SourceRow>, Option<Vec<String>>)>;
}

// ==========================================
// FieldMapper Trait
// ==========================================
// 用途: 外部列值 → 一个目标模型的内部字段值
// 实现者: LineMapper / FnMapper
pub trait FieldMapper: Send + Sync {
    /// 映射名（注册表键）
    fn name(&self) -> &str;

    /// 目标模型
    fn model(&self) -> &str;

    /// 声明的源列（按列序号升序）；为空表示按表头/位置取值
    fn columns(&self) -> &[MappingColumn];

    /// 映射一行
    ///
    /// # 错误
    /// - `MappingError`: 结构性缺列，中止整个档案
    /// - `TypeConversionError` / `DateFormatError`: 仅影响当前分组
    fn map_to_values(&self, row: &RowValues, ctx: &MappingContext<'_>) -> ImportResult<FieldValues>;

    /// 更新前剔除仅新建字段
    fn exclude_on_update(&self, values: FieldValues) -> FieldValues;
}

// ==========================================
// ImportHooks Trait
// ==========================================
// 用途: 按目标模型注入的默认值与后处理
pub trait ImportHooks: Send + Sync {
    /// 填充默认值（parent 为父节点字段值，基础映射为 None）
    fn apply_defaults(
        &self,
        _model: &str,
        values: FieldValues,
        _parent: Option<&FieldValues>,
    ) -> FieldValues {
        values
    }

    /// 更新父记录时查找已有子记录
    ///
    /// # 返回
    /// - `Ok(None)`: 未处理，由引擎按关联字段 + 全部字段值匹配
    /// - `Ok(Some(refs))`: 候选记录（取第一个；为空表示无法匹配）
    fn search_children(
        &self,
        _store: &dyn RecordStore,
        _parent: &RecordRef,
        _model: &str,
        _rel_field: &str,
        _values: &FieldValues,
    ) -> RepositoryResult<Option<Vec<RecordRef>>> {
        Ok(None)
    }

    /// 档案导入完成后，对本次新建的顶层记录做后处理（无新建时不调用）
    fn post_import(&self, _model: &str, _created: &[RecordRef]) {}
}

/// 无操作钩子
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl ImportHooks for NoopHooks {}

// ==========================================
// Notifier Trait
// ==========================================
// 用途: 导入完成后通知用户组（投递失败不影响导入）
pub trait Notifier: Send + Sync {
    fn notify(&self, group: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}
