// ==========================================
// CSV 导入引擎 - 记录与值树
// ==========================================
// 职责: 记录引用、字段值字典、层级值树（arena 结构）
// 约束: 值树不使用父子互相引用，子节点以索引挂载
// ==========================================

use crate::domain::types::RelationKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// 内部字段名 → 值
pub type FieldValues = BTreeMap<String, JsonValue>;

// ==========================================
// RecordRef - 记录引用
// ==========================================
// 显示格式: "model,id"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub model: String,
    pub id: i64,
}

impl RecordRef {
    pub fn new(model: impl Into<String>, id: i64) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }

    /// 解析 "model,id" 格式
    pub fn parse(raw: &str) -> Option<Self> {
        let (model, id) = raw.rsplit_once(',')?;
        let id = id.trim().parse::<i64>().ok()?;
        let model = model.trim();
        if model.is_empty() {
            return None;
        }
        Some(Self::new(model, id))
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.model, self.id)
    }
}

// ==========================================
// ValueTree - 层级值树
// ==========================================

/// 值树节点索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 值树节点（一个目标模型的一份字段值）
#[derive(Debug, Clone)]
pub struct ValueNode {
    /// 生成该节点的映射名
    pub mapping: String,
    /// 目标模型
    pub model: String,
    /// 字段值
    pub values: FieldValues,
    /// 挂载到父节点时使用的关联字段（根节点为 None）
    pub rel_field: Option<String>,
    /// 关联方式
    pub link: RelationKind,
    /// 来源行号（1 起）
    pub line: usize,
    /// 子节点
    pub children: Vec<NodeId>,
}

/// 一个逻辑分组组装出的值树，节点 0 为根
#[derive(Debug, Clone)]
pub struct ValueTree {
    nodes: Vec<ValueNode>,
}

impl ValueTree {
    /// 以根节点创建值树
    pub fn new(root: ValueNode) -> Self {
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &ValueNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ValueNode {
        &mut self.nodes[id.0]
    }

    /// 在 parent 下挂载子节点，返回新节点索引
    pub fn attach(&mut self, parent: NodeId, child: ValueNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(child);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 渲染为嵌套字典：子节点列表挂在父字典的关联字段名下
    pub fn to_json(&self) -> JsonValue {
        self.node_to_json(self.root())
    }

    fn node_to_json(&self, id: NodeId) -> JsonValue {
        let node = self.node(id);
        let mut map: serde_json::Map<String, JsonValue> = node
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for child_id in &node.children {
            let child = self.node(*child_id);
            let Some(rel_field) = child.rel_field.as_ref() else {
                continue;
            };
            let entry = map
                .entry(rel_field.clone())
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            // 关联字段已存在标量值（例如父引用）时改写为列表
            if !entry.is_array() {
                *entry = JsonValue::Array(Vec::new());
            }
            if let JsonValue::Array(list) = entry {
                list.push(self.node_to_json(*child_id));
            }
        }

        JsonValue::Object(map)
    }
}
