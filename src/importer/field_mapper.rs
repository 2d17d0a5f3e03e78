// ==========================================
// CSV 导入引擎 - 字段映射器实现
// ==========================================
// 职责: 外部列值 → 内部字段值 + 类型转换
// 注册: MappingRegistry 在进程启动时按名称注册映射器
// ==========================================

use crate::domain::mapping::FieldMapping;
use crate::domain::profile::CsvProfile;
use crate::domain::record::FieldValues;
use crate::domain::types::FieldKind;
use crate::importer::csv_importer_trait::FieldMapper;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::SourceRow;
use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// 外部列名 → 单元格值（仅非空）
pub type RowValues = BTreeMap<String, String>;

/// 映射器声明的源列
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingColumn {
    pub external_field: String,
    pub sequence: usize,
}

impl MappingColumn {
    pub fn new(external_field: &str, sequence: usize) -> Self {
        Self {
            external_field: external_field.to_string(),
            sequence,
        }
    }
}

/// 映射上下文（映射函数只读）
#[derive(Debug, Clone, Copy)]
pub struct MappingContext<'a> {
    pub profile: &'a CsvProfile,
    pub line: usize,
}

/// 为映射器构造一行的输入字典
///
/// - 声明了列: external_field → 对应列单元格
/// - 未声明列且有表头: 表头 → 单元格
/// - 其他: "0","1",... → 单元格
pub fn row_values(mapper: &dyn FieldMapper, row: &SourceRow, headers: Option<&[String]>) -> RowValues {
    let columns = mapper.columns();
    if !columns.is_empty() {
        return columns
            .iter()
            .filter_map(|col| {
                let cell = row.cell(col.sequence);
                (!cell.is_empty()).then(|| (col.external_field.clone(), cell.to_string()))
            })
            .collect();
    }

    match headers {
        Some(headers) => headers
            .iter()
            .zip(row.cells.iter())
            .filter(|(h, c)| !h.is_empty() && !c.is_empty())
            .map(|(h, c)| (h.clone(), c.clone()))
            .collect(),
        None => row
            .cells
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, c)| (i.to_string(), c.clone()))
            .collect(),
    }
}

// ==========================================
// LineMapper - 基于映射行的映射器
// ==========================================
pub struct LineMapper {
    mapping: FieldMapping,
    columns: Vec<MappingColumn>,
}

impl LineMapper {
    pub fn new(mapping: FieldMapping) -> Self {
        let mut lines: Vec<_> = mapping.lines.iter().collect();
        lines.sort_by_key(|l| l.sequence);
        let columns = lines
            .iter()
            .map(|l| MappingColumn::new(&l.external_field, l.sequence))
            .collect();
        Self { mapping, columns }
    }

    /// 按字段类型转换单元格
    fn convert(&self, kind: FieldKind, raw: &str, field: &str, row: usize) -> ImportResult<JsonValue> {
        let conversion_error = |message: String| ImportError::TypeConversionError {
            row,
            field: field.to_string(),
            message,
        };

        match kind {
            FieldKind::Char => Ok(JsonValue::String(raw.to_string())),
            FieldKind::Integer => raw
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| conversion_error(format!("无法解析为整数: {}", raw))),
            FieldKind::Numeric => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
                .ok_or_else(|| conversion_error(format!("无法解析为数值: {}", raw))),
            FieldKind::Boolean => parse_bool(raw)
                .map(JsonValue::Bool)
                .ok_or_else(|| conversion_error(format!("无法解析为布尔值: {}", raw))),
            FieldKind::Date => parse_date(raw)
                .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(|| ImportError::DateFormatError {
                    row,
                    field: field.to_string(),
                    value: raw.to_string(),
                }),
        }
    }
}

impl FieldMapper for LineMapper {
    fn name(&self) -> &str {
        &self.mapping.name
    }

    fn model(&self) -> &str {
        &self.mapping.model
    }

    fn columns(&self) -> &[MappingColumn] {
        &self.columns
    }

    fn map_to_values(&self, row: &RowValues, ctx: &MappingContext<'_>) -> ImportResult<FieldValues> {
        let mut values = FieldValues::new();
        for line in &self.mapping.lines {
            let Some(raw) = row.get(&line.external_field) else {
                continue;
            };
            let value = self.convert(line.kind, raw, &line.field, ctx.line)?;
            values.insert(line.field.clone(), value);
        }
        Ok(values)
    }

    fn exclude_on_update(&self, mut values: FieldValues) -> FieldValues {
        for line in self.mapping.lines.iter().filter(|l| l.create_only) {
            values.remove(&line.field);
        }
        values
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "y" | "yes" => Some(true),
        "0" | "false" | "f" | "n" | "no" => Some(false),
        _ => None,
    }
}

/// 支持 YYYYMMDD 与 YYYY-MM-DD
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

// ==========================================
// FnMapper - 闭包映射器
// ==========================================
type MapFn = dyn Fn(&RowValues, &MappingContext<'_>) -> ImportResult<FieldValues> + Send + Sync;

pub struct FnMapper {
    name: String,
    model: String,
    columns: Vec<MappingColumn>,
    create_only: Vec<String>,
    func: Box<MapFn>,
}

impl FnMapper {
    pub fn new<F>(name: &str, model: &str, func: F) -> Self
    where
        F: Fn(&RowValues, &MappingContext<'_>) -> ImportResult<FieldValues> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            columns: Vec::new(),
            create_only: Vec::new(),
            func: Box::new(func),
        }
    }

    pub fn with_columns(mut self, columns: Vec<MappingColumn>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_create_only(mut self, fields: &[&str]) -> Self {
        self.create_only = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

impl FieldMapper for FnMapper {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn columns(&self) -> &[MappingColumn] {
        &self.columns
    }

    fn map_to_values(&self, row: &RowValues, ctx: &MappingContext<'_>) -> ImportResult<FieldValues> {
        (self.func)(row, ctx)
    }

    fn exclude_on_update(&self, mut values: FieldValues) -> FieldValues {
        for field in &self.create_only {
            values.remove(field);
        }
        values
    }
}

// ==========================================
// MappingRegistry - 映射器注册表
// ==========================================
#[derive(Default, Clone)]
pub struct MappingRegistry {
    mappers: HashMap<String, Arc<dyn FieldMapper>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由映射定义批量构造
    pub fn from_mappings(mappings: impl IntoIterator<Item = FieldMapping>) -> Self {
        let mut registry = Self::new();
        for mapping in mappings {
            registry.register_mapping(mapping);
        }
        registry
    }

    /// 注册映射器（同名覆盖）
    pub fn register(&mut self, mapper: impl FieldMapper + 'static) {
        debug!(mapping = mapper.name(), model = mapper.model(), "注册映射器");
        self.mappers.insert(mapper.name().to_string(), Arc::new(mapper));
    }

    pub fn register_mapping(&mut self, mapping: FieldMapping) {
        self.register(LineMapper::new(mapping));
    }

    /// 按名称解析映射器（不存在即配置错误）
    pub fn resolve(&self, name: &str) -> ImportResult<Arc<dyn FieldMapper>> {
        self.mappers
            .get(name)
            .cloned()
            .ok_or_else(|| ImportError::ConfigError(format!("映射 {} 未注册", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mappers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}
