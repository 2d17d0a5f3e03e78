// ==========================================
// CSV 导入引擎 - 字段映射定义
// ==========================================
// 职责: 外部列 → 内部字段 的共享映射模板
// 说明: 映射按名称被多个 Profile 引用（不归属于某个 Profile）
// ==========================================

use crate::domain::types::FieldKind;
use serde::{Deserialize, Serialize};

// ==========================================
// MappingLine - 映射行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingLine {
    pub external_field: String, // 外部列名
    pub sequence: usize,        // 列序号（0 起）
    pub field: String,          // 内部字段名
    #[serde(default)]
    pub kind: FieldKind,        // 值类型
    #[serde(default)]
    pub create_only: bool,      // 仅新建时写入（更新时剔除）
}

impl MappingLine {
    pub fn new(external_field: &str, sequence: usize, field: &str) -> Self {
        Self {
            external_field: external_field.to_string(),
            sequence,
            field: field.to_string(),
            kind: FieldKind::Char,
            create_only: false,
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }
}

// ==========================================
// FieldMapping - 字段映射
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub name: String,  // 映射名（注册表键）
    pub model: String, // 目标模型
    #[serde(default)]
    pub lines: Vec<MappingLine>,
}

impl FieldMapping {
    pub fn new(name: &str, model: &str, lines: Vec<MappingLine>) -> Self {
        Self {
            name: name.to_string(),
            model: model.to_string(),
            lines,
        }
    }

    /// 映射使用到的最大列序号
    pub fn max_sequence(&self) -> Option<usize> {
        self.lines.iter().map(|l| l.sequence).max()
    }
}
