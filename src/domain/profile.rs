// ==========================================
// CSV 导入引擎 - 导入配置 (Profile)
// ==========================================
// 职责: 一条导入管道的配置：目标模型、映射树、CSV 方言、新建/更新策略
// 生命周期: 导入前由操作员维护，导入期间只读
// ==========================================

use crate::domain::types::{CsvSeparator, RelationKind};
use serde::{Deserialize, Serialize};

// ==========================================
// ProfileMapping - Profile 内的映射挂载
// ==========================================
// 用途: 把共享映射放到 Profile 的映射树中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMapping {
    pub mapping: String,           // 映射名
    #[serde(default)]
    pub parent: Option<String>,    // 父映射名（基础映射为 None）
    #[serde(default)]
    pub rel_field: Option<String>, // 关联字段
    #[serde(default)]
    pub link: RelationKind,        // 关联方式
    #[serde(default)]
    pub required: bool,            // 每行必须给值（不向下填充）
}

impl ProfileMapping {
    /// 基础映射
    pub fn base(mapping: &str) -> Self {
        Self {
            mapping: mapping.to_string(),
            parent: None,
            rel_field: None,
            link: RelationKind::ParentReference,
            required: false,
        }
    }

    /// 子映射
    pub fn child(mapping: &str, parent: &str, rel_field: &str) -> Self {
        Self {
            mapping: mapping.to_string(),
            parent: Some(parent.to_string()),
            rel_field: Some(rel_field.to_string()),
            link: RelationKind::ParentReference,
            required: false,
        }
    }

    pub fn with_link(mut self, link: RelationKind) -> Self {
        self.link = link;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

// ==========================================
// CsvProfile - 导入配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvProfile {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub model: String, // 目标模型
    #[serde(default)]
    pub mappings: Vec<ProfileMapping>,

    // ===== CSV 方言 =====
    #[serde(default)]
    pub separator: CsvSeparator,
    #[serde(default = "default_quote")]
    pub quote: String,
    #[serde(default)]
    pub has_header: bool,

    // ===== 导入策略 =====
    #[serde(default = "default_true")]
    pub create_record: bool,
    #[serde(default)]
    pub update_record: bool,
    #[serde(default)]
    pub testing: bool, // 仅模拟，不落库

    // ===== 更新键 =====
    #[serde(default)]
    pub code_internal: Option<String>, // 内部键字段
    #[serde(default = "default_code_external")]
    pub code_external: Option<usize>,  // 外部键列序号

    // ===== 其他 =====
    #[serde(default)]
    pub group: Option<String>, // 通知用户组
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub note: Option<String>,
}

fn default_quote() -> String {
    "\"".to_string()
}

fn default_true() -> bool {
    true
}

fn default_code_external() -> Option<usize> {
    Some(0)
}

impl CsvProfile {
    /// 以默认策略创建 Profile（新建=是，更新=否）
    pub fn new(name: &str, model: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            model: model.to_string(),
            mappings: Vec::new(),
            separator: CsvSeparator::Comma,
            quote: default_quote(),
            has_header: false,
            create_record: true,
            update_record: false,
            testing: false,
            code_internal: None,
            code_external: default_code_external(),
            group: None,
            active: true,
            note: None,
        }
    }

    /// 校验配置不变量
    ///
    /// # 规则
    /// - update_record=true 时必须给出内部键字段与外部键列
    /// - 映射名不可重复
    /// - 引号为单个可见 ASCII 字符且不同于分隔符
    pub fn validate(&self) -> Result<(), String> {
        let mut quote = self.quote.chars();
        match (quote.next(), quote.next()) {
            (Some(q), None) if q.is_ascii_graphic() && q as u8 != self.separator.as_byte() => {}
            _ => {
                return Err(format!(
                    "Profile {} 引号字符无效: {:?}",
                    self.name, self.quote
                ))
            }
        }

        if self.update_record {
            let internal_ok = self
                .code_internal
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !internal_ok || self.code_external.is_none() {
                return Err(format!(
                    "Profile {} 允许更新但未配置键字段 (code_internal/code_external)",
                    self.name
                ));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for m in &self.mappings {
            if !seen.insert(m.mapping.as_str()) {
                return Err(format!("Profile {} 中映射 {} 重复", self.name, m.mapping));
            }
        }

        Ok(())
    }

    /// 查找 Profile 内的映射挂载
    pub fn mapping(&self, name: &str) -> Option<&ProfileMapping> {
        self.mappings.iter().find(|m| m.mapping == name)
    }
}
