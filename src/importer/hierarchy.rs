// ==========================================
// CSV 导入引擎 - 层级组装器
// ==========================================
// 职责: 逻辑分组 → 值树（基础映射为根，子映射按关联字段挂载）
// 约束: 值树为 arena 结构，父节点仅以索引持有子节点
// ==========================================

use crate::domain::profile::CsvProfile;
use crate::domain::record::{ValueNode, ValueTree};
use crate::domain::types::RelationKind;
use crate::importer::csv_importer_trait::{FieldMapper, ImportHooks};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::{row_values, MappingContext, MappingRegistry, RowValues};
use crate::importer::row_grouper::{leading_column, RowGroup};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ==========================================
// MappingPlan - Profile 的映射计划
// ==========================================

/// 计划中的一个映射
#[derive(Clone)]
pub struct PlannedMapping {
    pub mapper: Arc<dyn FieldMapper>,
    pub parent: Option<String>,
    pub rel_field: Option<String>,
    pub link: RelationKind,
    pub required: bool,
}

impl PlannedMapping {
    pub fn name(&self) -> &str {
        self.mapper.name()
    }

    pub fn model(&self) -> &str {
        self.mapper.model()
    }
}

/// Profile 映射树解析结果
#[derive(Clone)]
pub struct MappingPlan {
    pub base: PlannedMapping,
    /// 子映射（父映射总在子映射之前）
    pub children: Vec<PlannedMapping>,
    /// 因缺少关联字段被跳过的映射
    pub skipped: Vec<String>,
}

impl MappingPlan {
    /// 解析 Profile 的映射树
    ///
    /// # 规则
    /// - 基础映射: 无父映射且目标模型等于 Profile 模型；缺失即配置错误
    /// - 其他无父映射的映射挂在基础映射下
    /// - 缺少关联字段的子映射（及其后代）被跳过并告警
    /// - 未注册的映射名、未知父映射、循环引用均为配置错误
    pub fn build(profile: &CsvProfile, registry: &MappingRegistry) -> ImportResult<Self> {
        let mut resolved = Vec::with_capacity(profile.mappings.len());
        for pm in &profile.mappings {
            resolved.push((pm, registry.resolve(&pm.mapping)?));
        }

        let base_index = resolved
            .iter()
            .position(|(pm, mapper)| pm.parent.is_none() && mapper.model() == profile.model)
            .ok_or_else(|| {
                ImportError::ConfigError(format!(
                    "Profile {} 缺少目标模型 {} 的基础映射",
                    profile.name, profile.model
                ))
            })?;

        let (base_pm, base_mapper) = resolved.remove(base_index);
        let base = PlannedMapping {
            mapper: base_mapper,
            parent: None,
            rel_field: None,
            link: base_pm.link,
            required: base_pm.required,
        };

        let known: Vec<&str> = profile.mappings.iter().map(|m| m.mapping.as_str()).collect();
        let mut pending: Vec<PlannedMapping> = Vec::new();
        for (pm, mapper) in resolved {
            let parent = pm
                .parent
                .clone()
                .unwrap_or_else(|| base.name().to_string());
            if !known.contains(&parent.as_str()) {
                return Err(ImportError::ConfigError(format!(
                    "映射 {} 的父映射 {} 不在 Profile {} 中",
                    pm.mapping, parent, profile.name
                )));
            }
            pending.push(PlannedMapping {
                mapper,
                parent: Some(parent),
                rel_field: pm.rel_field.clone().filter(|f| !f.trim().is_empty()),
                link: pm.link,
                required: pm.required,
            });
        }

        // 按依赖排序：父映射已就位的子映射依次加入
        let mut placed: Vec<String> = vec![base.name().to_string()];
        let mut skipped: Vec<String> = Vec::new();
        let mut children = Vec::new();
        while !pending.is_empty() {
            let before = pending.len();
            let mut rest = Vec::new();
            for planned in pending {
                let parent = planned.parent.as_deref().unwrap_or_default();
                if skipped.iter().any(|s| s == parent) || planned.rel_field.is_none() {
                    warn!(
                        profile = %profile.name,
                        mapping = planned.name(),
                        "子映射缺少关联字段（或父映射已跳过），已跳过"
                    );
                    skipped.push(planned.name().to_string());
                } else if placed.iter().any(|p| p == parent) {
                    placed.push(planned.name().to_string());
                    children.push(planned);
                } else {
                    rest.push(planned);
                }
            }
            if rest.len() == before {
                let names: Vec<&str> = rest.iter().map(|p| p.name()).collect();
                return Err(ImportError::ConfigError(format!(
                    "Profile {} 的映射存在循环引用: {}",
                    profile.name,
                    names.join(", ")
                )));
            }
            pending = rest;
        }

        Ok(Self {
            base,
            children,
            skipped,
        })
    }

    /// 分组依据的列
    pub fn leading_column(&self) -> usize {
        leading_column(self.base.mapper.as_ref())
    }

    /// 所有映射使用到的最大列序号
    pub fn max_column(&self) -> Option<usize> {
        std::iter::once(&self.base)
            .chain(self.children.iter())
            .flat_map(|p| p.mapper.columns().iter().map(|c| c.sequence))
            .max()
    }

    /// 按映射名查找
    pub fn mapping(&self, name: &str) -> Option<&PlannedMapping> {
        std::iter::once(&self.base)
            .chain(self.children.iter())
            .find(|p| p.name() == name)
    }
}

// ==========================================
// HierarchyAssembler - 层级组装器
// ==========================================
pub struct HierarchyAssembler<'a> {
    plan: &'a MappingPlan,
    hooks: &'a dyn ImportHooks,
    profile: &'a CsvProfile,
    headers: Option<&'a [String]>,
}

impl<'a> HierarchyAssembler<'a> {
    pub fn new(
        plan: &'a MappingPlan,
        hooks: &'a dyn ImportHooks,
        profile: &'a CsvProfile,
        headers: Option<&'a [String]>,
    ) -> Self {
        Self {
            plan,
            hooks,
            profile,
            headers,
        }
    }

    /// 组装一个分组的值树
    ///
    /// # 规则
    /// - 基础映射只在首行求值，生成根节点
    /// - 子映射逐行求值，挂到同一行的父节点，否则挂到该父映射最近一个节点
    /// - 非必填映射：空单元格沿用本组上一行的值；整行为空不产生子节点
    /// - 必填映射：不沿用；整行为空即 RequiredMappingEmpty
    pub fn assemble(&self, group: &RowGroup) -> ImportResult<ValueTree> {
        let first = group.first();
        let base = &self.plan.base;
        let base_input = row_values(base.mapper.as_ref(), first, self.headers);
        let root_values = base.mapper.map_to_values(&base_input, &self.ctx(first.line))?;

        let mut tree = ValueTree::new(ValueNode {
            mapping: base.name().to_string(),
            model: base.model().to_string(),
            values: root_values,
            rel_field: None,
            link: base.link,
            line: first.line,
            children: Vec::new(),
        });

        let mut latest = HashMap::new();
        latest.insert(base.name(), tree.root());
        let mut carried: HashMap<&str, RowValues> = HashMap::new();

        for row in &group.rows {
            let mut same_row = HashMap::new();
            if row.line == first.line {
                same_row.insert(base.name(), tree.root());
            }

            for child in &self.plan.children {
                let mapper = child.mapper.as_ref();
                let mut input = row_values(mapper, row, self.headers);

                if input.is_empty() {
                    if child.required {
                        return Err(ImportError::RequiredMappingEmpty {
                            mapping: child.name().to_string(),
                            line: row.line,
                        });
                    }
                    continue;
                }

                if !child.required {
                    if let Some(previous) = carried.get(child.name()) {
                        for column in mapper.columns() {
                            if let Some(value) = previous.get(&column.external_field) {
                                input
                                    .entry(column.external_field.clone())
                                    .or_insert_with(|| value.clone());
                            }
                        }
                    }
                    carried.insert(child.name(), input.clone());
                }

                let parent_name = child.parent.as_deref().unwrap_or_else(|| base.name());
                let Some(parent_id) = same_row
                    .get(parent_name)
                    .or_else(|| latest.get(parent_name))
                    .copied()
                else {
                    debug!(mapping = child.name(), line = row.line, "父映射无节点，跳过子值");
                    continue;
                };

                let values = mapper.map_to_values(&input, &self.ctx(row.line))?;
                let values =
                    self.hooks
                        .apply_defaults(mapper.model(), values, Some(&tree.node(parent_id).values));
                if values.is_empty() {
                    continue;
                }

                let node_id = tree.attach(
                    parent_id,
                    ValueNode {
                        mapping: child.name().to_string(),
                        model: mapper.model().to_string(),
                        values,
                        rel_field: child.rel_field.clone(),
                        link: child.link,
                        line: row.line,
                        children: Vec::new(),
                    },
                );
                same_row.insert(child.name(), node_id);
                latest.insert(child.name(), node_id);
            }
        }

        Ok(tree)
    }

    fn ctx(&self, line: usize) -> MappingContext<'a> {
        MappingContext {
            profile: self.profile,
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mapping::{FieldMapping, MappingLine};
    use crate::domain::profile::ProfileMapping;
    use crate::importer::csv_importer_trait::NoopHooks;
    use crate::importer::file_parser::SourceRow;
    use crate::importer::row_grouper::group_by_column;
    use serde_json::json;

    fn registry() -> MappingRegistry {
        MappingRegistry::from_mappings(vec![
            FieldMapping::new("party", "party.party", vec![MappingLine::new("name", 0, "name")]),
            FieldMapping::new(
                "contact",
                "party.contact_mechanism",
                vec![
                    MappingLine::new("email", 1, "value"),
                    MappingLine::new("type", 2, "type"),
                ],
            ),
            FieldMapping::new("address", "party.address", vec![MappingLine::new("city", 3, "city")]),
        ])
    }

    fn profile(mappings: Vec<ProfileMapping>) -> CsvProfile {
        let mut profile = CsvProfile::new("Parties", "party.party");
        profile.mappings = mappings;
        profile
    }

    fn row(line: usize, cells: &[&str]) -> SourceRow {
        SourceRow::new(line, cells.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_plan_requires_base_mapping() {
        let p = profile(vec![ProfileMapping::child("contact", "party", "party")]);
        assert!(matches!(
            MappingPlan::build(&p, &registry()),
            Err(ImportError::ConfigError(_))
        ));
    }

    #[test]
    fn test_plan_skips_child_without_rel_field() {
        let mut orphan = ProfileMapping::child("address", "party", "party");
        orphan.rel_field = None;
        let p = profile(vec![
            ProfileMapping::base("party"),
            ProfileMapping::child("contact", "party", "party"),
            orphan,
        ]);

        let plan = MappingPlan::build(&p, &registry()).unwrap();
        assert_eq!(plan.children.len(), 1);
        assert_eq!(plan.skipped, vec!["address".to_string()]);
        assert_eq!(plan.max_column(), Some(2));
        assert_eq!(plan.leading_column(), 0);
    }

    #[test]
    fn test_plan_unknown_mapping_is_config_error() {
        let p = profile(vec![ProfileMapping::base("party"), ProfileMapping::base("ghost")]);
        assert!(matches!(
            MappingPlan::build(&p, &registry()),
            Err(ImportError::ConfigError(_))
        ));
    }

    #[test]
    fn test_assemble_children_with_fill_down() {
        let p = profile(vec![
            ProfileMapping::base("party"),
            ProfileMapping::child("contact", "party", "party"),
        ]);
        let plan = MappingPlan::build(&p, &registry()).unwrap();
        let groups = group_by_column(
            vec![
                row(2, &["Acme", "info@acme.test", "email"]),
                row(3, &["", "sales@acme.test", ""]),
                row(4, &["", "", ""]),
            ],
            0,
        );
        assert_eq!(groups.len(), 1);

        let hooks = NoopHooks;
        let tree = HierarchyAssembler::new(&plan, &hooks, &p, None)
            .assemble(&groups[0])
            .unwrap();

        assert_eq!(
            tree.to_json(),
            json!({
                "name": "Acme",
                "party": [
                    {"value": "info@acme.test", "type": "email"},
                    {"value": "sales@acme.test", "type": "email"}
                ]
            })
        );
    }

    #[test]
    fn test_required_mapping_does_not_fill_down() {
        let p = profile(vec![
            ProfileMapping::base("party"),
            ProfileMapping::child("contact", "party", "party").required(),
        ]);
        let plan = MappingPlan::build(&p, &registry()).unwrap();
        let hooks = NoopHooks;
        let assembler = HierarchyAssembler::new(&plan, &hooks, &p, None);

        let ok = group_by_column(
            vec![
                row(2, &["Acme", "info@acme.test", "email"]),
                row(3, &["", "sales@acme.test", ""]),
            ],
            0,
        );
        let tree = assembler.assemble(&ok[0]).unwrap();
        let second = tree.node(tree.children(tree.root())[1]);
        assert!(!second.values.contains_key("type"));

        let missing = group_by_column(
            vec![row(2, &["Acme", "info@acme.test", ""]), row(3, &["", "", "", "x"])],
            0,
        );
        assert!(matches!(
            assembler.assemble(&missing[0]),
            Err(ImportError::RequiredMappingEmpty { line: 3, .. })
        ));
    }

    #[test]
    fn test_grandchildren_attach_to_latest_parent_node() {
        let mut reg = registry();
        reg.register_mapping(FieldMapping::new(
            "note",
            "party.note",
            vec![MappingLine::new("note", 3, "text")],
        ));
        let p = profile(vec![
            ProfileMapping::base("party"),
            ProfileMapping::child("note", "contact", "contact"),
            ProfileMapping::child("contact", "party", "party"),
        ]);
        let plan = MappingPlan::build(&p, &reg).unwrap();
        assert_eq!(plan.children[0].name(), "contact");

        let groups = group_by_column(
            vec![
                row(2, &["Acme", "info@acme.test", "", "first"]),
                row(3, &["", "", "", "second"]),
            ],
            0,
        );
        let hooks = NoopHooks;
        let tree = HierarchyAssembler::new(&plan, &hooks, &p, None)
            .assemble(&groups[0])
            .unwrap();

        let contact = tree.children(tree.root())[0];
        assert_eq!(tree.children(tree.root()).len(), 1);
        assert_eq!(tree.children(contact).len(), 2);
    }
}
