// ==========================================
// CSV 导入引擎 - 记录存储 Trait
// ==========================================
// 职责: 定义导入引擎所需的持久化原语（不包含实现）
// 红线: 存储不含业务规则，只做 search/create/write
// ==========================================

use crate::domain::record::{FieldValues, RecordRef};
use crate::repository::error::RepositoryResult;
use serde_json::Value as JsonValue;

/// 等值查询条件：字段名 = 值
pub type SearchDomain<'a> = [(&'a str, JsonValue)];

// ==========================================
// RecordStore Trait
// ==========================================
// 用途: 外部对象存储（模型 + 字段值）
// 实现者: SqliteRecordStore
pub trait RecordStore: Send + Sync {
    /// 按等值条件查询记录（按 id 升序）
    fn search(&self, model: &str, domain: &SearchDomain<'_>) -> RepositoryResult<Vec<RecordRef>>;

    /// 新建记录
    fn create(&self, model: &str, values: &FieldValues) -> RepositoryResult<RecordRef>;

    /// 更新记录（仅覆盖给出的字段）
    fn write(&self, record: &RecordRef, values: &FieldValues) -> RepositoryResult<()>;

    /// 读取记录字段值
    fn read(&self, record: &RecordRef) -> RepositoryResult<FieldValues>;

    /// 把 child 加入 parent 的集合字段
    fn attach(&self, parent: &RecordRef, field: &str, child: &RecordRef) -> RepositoryResult<()>;

    /// 列出 parent 集合字段中的记录
    fn linked(&self, parent: &RecordRef, field: &str) -> RepositoryResult<Vec<RecordRef>>;

    // ===== 事务边界（默认无操作）=====

    /// 开启保存点
    fn savepoint(&self, _name: &str) -> RepositoryResult<()> {
        Ok(())
    }

    /// 释放保存点（提交其中的修改到外层）
    fn release(&self, _name: &str) -> RepositoryResult<()> {
        Ok(())
    }

    /// 回滚到保存点并释放
    fn rollback_to(&self, _name: &str) -> RepositoryResult<()> {
        Ok(())
    }
}
