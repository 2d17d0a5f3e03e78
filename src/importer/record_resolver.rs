// ==========================================
// CSV 导入引擎 - 记录解析与持久化
// ==========================================
// 职责: 新建/更新决策 + 值树自顶向下落库 + 日志条目
// 事务: 每个分组一个保存点，持久化失败只回滚本分组
// ==========================================
//
// 决策表:
// | 允许更新 | 已存在 | 允许新建 | 结果       |
// |----------|--------|----------|------------|
// | 是       | 是     | 任意     | Update     |
// | 是       | 否     | 是       | Create     |
// | 是       | 否     | 否       | Unresolved |
// | 否       | -      | 是       | Create     |
// | 否       | -      | 否       | Unresolved |

use crate::domain::profile::CsvProfile;
use crate::domain::record::{FieldValues, NodeId, RecordRef, ValueTree};
use crate::domain::types::RelationKind;
use crate::domain::LogKind;
use crate::importer::csv_importer_trait::ImportHooks;
use crate::importer::hierarchy::MappingPlan;
use crate::importer::import_session::ImportSession;
use crate::importer::row_grouper::RowGroup;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::RecordStore;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

/// 分组保存点名称
pub const GROUP_SAVEPOINT: &str = "import_group";

/// 新建/更新决策结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Update(RecordRef),
    Create,
    Unresolved,
}

/// 新建/更新决策
pub fn decide(update_allowed: bool, create_allowed: bool, existing: Option<RecordRef>) -> Resolution {
    match (update_allowed, existing, create_allowed) {
        (true, Some(record), _) => Resolution::Update(record),
        (_, _, true) => Resolution::Create,
        _ => Resolution::Unresolved,
    }
}

// ==========================================
// RecordResolver
// ==========================================
pub struct RecordResolver<'a> {
    store: &'a dyn RecordStore,
    hooks: &'a dyn ImportHooks,
    plan: &'a MappingPlan,
    profile: &'a CsvProfile,
}

impl<'a> RecordResolver<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        hooks: &'a dyn ImportHooks,
        plan: &'a MappingPlan,
        profile: &'a CsvProfile,
    ) -> Self {
        Self {
            store,
            hooks,
            plan,
            profile,
        }
    }

    /// 持久化一个分组的值树
    ///
    /// # 返回
    /// - `Ok(Some(record))`: 顶层记录已新建/更新
    /// - `Ok(None)`: 分组被跳过或失败（已写入错误日志）或处于模拟模式
    /// - `Err(...)`: 保存点本身无法建立/释放
    pub fn persist_group(
        &self,
        group: &RowGroup,
        tree: &ValueTree,
        session: &mut ImportSession,
    ) -> RepositoryResult<Option<RecordRef>> {
        let line = group.line();
        let line_text = line.to_string();
        let root = tree.node(tree.root());

        // 1. 键值查找
        let existing = if self.profile.update_record {
            let Some(key) = self.key_value(group, tree) else {
                session.push(LogKind::CodeNotFound, None, Some(line), &[("line", &line_text)]);
                return Ok(None);
            };
            let field = self.profile.code_internal.as_deref().unwrap_or_default();
            match self.store.search(&root.model, &[(field, key)]) {
                Ok(found) => found.into_iter().next(),
                Err(e) => {
                    self.push_failure(session, LogKind::UpdatingError, None, tree, &e, line);
                    return Ok(None);
                }
            }
        } else {
            None
        };

        // 2. 决策
        let resolution = decide(self.profile.update_record, self.profile.create_record, existing);
        if resolution == Resolution::Unresolved {
            session.push(LogKind::NotCreateUpdate, None, Some(line), &[("line", &line_text)]);
            return Ok(None);
        }

        // 3. 模拟模式：不落库，每组一条
        if self.profile.testing {
            let values = tree.to_json().to_string();
            session.push(
                LogKind::SuccessSimulation,
                None,
                Some(line),
                &[("values", &values), ("model", &root.model), ("line", &line_text)],
            );
            return Ok(None);
        }

        // 4. 保存点内持久化
        self.store.savepoint(GROUP_SAVEPOINT)?;
        let mark = session.mark();
        let updating = match &resolution {
            Resolution::Update(record) => Some(record.clone()),
            _ => None,
        };

        match self.persist_node(tree, tree.root(), resolution, None, session) {
            Ok(Some(record)) => {
                self.store.release(GROUP_SAVEPOINT)?;
                if updating.is_none() {
                    session.record_created(record.clone());
                }
                session.record_top_level(record.clone());
                Ok(Some(record))
            }
            Ok(None) => {
                self.store.release(GROUP_SAVEPOINT)?;
                Ok(None)
            }
            Err(e) => {
                warn!(line, model = %root.model, error = %e, "分组持久化失败，回滚本分组");
                self.store.rollback_to(GROUP_SAVEPOINT)?;
                session.discard_done_since(mark);
                let kind = if updating.is_some() {
                    LogKind::UpdatingError
                } else {
                    LogKind::CreationError
                };
                self.push_failure(session, kind, updating, tree, &e, line);
                Ok(None)
            }
        }
    }

    /// 更新键：优先取根节点中已转换的键字段值，否则取键列原文
    fn key_value(&self, group: &RowGroup, tree: &ValueTree) -> Option<JsonValue> {
        let column = self.profile.code_external?;
        let raw = group.first().cell(column).trim();
        if raw.is_empty() {
            return None;
        }
        let field = self.profile.code_internal.as_deref()?;
        let converted = tree.node(tree.root()).values.get(field).cloned();
        Some(converted.unwrap_or_else(|| JsonValue::String(raw.to_string())))
    }

    /// 持久化节点及其子树
    fn persist_node(
        &self,
        tree: &ValueTree,
        id: NodeId,
        resolution: Resolution,
        parent: Option<&RecordRef>,
        session: &mut ImportSession,
    ) -> RepositoryResult<Option<RecordRef>> {
        let node = tree.node(id);
        let line_text = node.line.to_string();
        let mapper = self
            .plan
            .mapping(&node.mapping)
            .map(|p| p.mapper.clone())
            .ok_or_else(|| RepositoryError::InternalError(format!("映射 {} 不在计划中", node.mapping)))?;

        let mut values = node.values.clone();
        if let (Some(parent), Some(rel_field), RelationKind::ParentReference) =
            (parent, node.rel_field.as_ref(), node.link)
        {
            values.insert(rel_field.clone(), json!(parent.id));
        }

        let (record, updated) = match resolution {
            Resolution::Unresolved => {
                let values_text = json_text(&values);
                session.push(
                    LogKind::CantUpdate,
                    None,
                    Some(node.line),
                    &[("model", &node.model), ("values", &values_text), ("line", &line_text)],
                );
                return Ok(None);
            }
            Resolution::Create => {
                // 子节点默认值已在组装时填充
                if parent.is_none() {
                    values = self.hooks.apply_defaults(&node.model, values, None);
                }
                let record = self.store.create(&node.model, &values)?;
                session.push(
                    LogKind::RecordSaved,
                    Some(record.clone()),
                    Some(node.line),
                    &[("record", &record.to_string()), ("line", &line_text)],
                );
                (record, false)
            }
            Resolution::Update(record) => {
                let values = mapper.exclude_on_update(values);
                self.store.write(&record, &values)?;
                let values_text = json_text(&values);
                session.push(
                    LogKind::RecordUpdated,
                    Some(record.clone()),
                    Some(node.line),
                    &[
                        ("record", &record.to_string()),
                        ("values", &values_text),
                        ("line", &line_text),
                    ],
                );
                (record, true)
            }
        };

        if let (Some(parent), Some(rel_field), RelationKind::ParentCollection) =
            (parent, node.rel_field.as_ref(), node.link)
        {
            self.store.attach(parent, rel_field, &record)?;
        }

        for child_id in tree.children(id) {
            let child_resolution = if updated && self.profile.update_record {
                let existing = self.find_child(&record, tree, *child_id)?;
                decide(true, self.profile.create_record, existing)
            } else {
                Resolution::Create
            };
            self.persist_node(tree, *child_id, child_resolution, Some(&record), session)?;
        }

        Ok(Some(record))
    }

    /// 查找已更新父记录下的已有子记录
    fn find_child(
        &self,
        parent: &RecordRef,
        tree: &ValueTree,
        id: NodeId,
    ) -> RepositoryResult<Option<RecordRef>> {
        let node = tree.node(id);
        let Some(rel_field) = node.rel_field.as_deref() else {
            return Ok(None);
        };

        if let Some(found) =
            self.hooks
                .search_children(self.store, parent, &node.model, rel_field, &node.values)?
        {
            return Ok(found.into_iter().next());
        }

        match node.link {
            RelationKind::ParentReference => {
                let parent_id = json!(parent.id);
                let mut domain: Vec<(&str, JsonValue)> = vec![(rel_field, parent_id)];
                domain.extend(node.values.iter().map(|(k, v)| (k.as_str(), v.clone())));
                Ok(self.store.search(&node.model, &domain)?.into_iter().next())
            }
            RelationKind::ParentCollection => {
                for candidate in self.store.linked(parent, rel_field)? {
                    if candidate.model != node.model {
                        continue;
                    }
                    let stored = self.store.read(&candidate)?;
                    if node.values.iter().all(|(k, v)| stored.get(k) == Some(v)) {
                        debug!(record = %candidate, "匹配到已有子记录");
                        return Ok(Some(candidate));
                    }
                }
                Ok(None)
            }
        }
    }

    fn push_failure(
        &self,
        session: &mut ImportSession,
        kind: LogKind,
        record: Option<RecordRef>,
        tree: &ValueTree,
        error: &RepositoryError,
        line: usize,
    ) {
        let values = tree.to_json().to_string();
        let record_text = record.as_ref().map(|r| r.to_string()).unwrap_or_default();
        session.push(
            kind,
            record,
            Some(line),
            &[
                ("record", &record_text),
                ("values", &values),
                ("error", &error.to_string()),
                ("line", &line.to_string()),
            ],
        );
    }
}

fn json_text(values: &FieldValues) -> String {
    serde_json::to_string(values).unwrap_or_default()
}
