// ==========================================
// CSV 导入引擎 - 导入会话
// ==========================================
// 职责: 单个档案导入期间的日志累积与顶层记录收集
// 生命周期: 每个档案新建一次，finish() 后交由引擎一次性落库
// ==========================================

use crate::domain::import_log::{ImportLogEntry, LogKind};
use crate::domain::record::RecordRef;
use crate::i18n;
use chrono::{Local, NaiveDateTime, Timelike};
use uuid::Uuid;

/// 会话结束后的产出
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub import_id: String,
    pub entries: Vec<ImportLogEntry>,
    /// 新建/更新的顶层记录（去重，按出现顺序）
    pub top_level: Vec<RecordRef>,
    /// 其中本次新建的顶层记录
    pub created: Vec<RecordRef>,
}

// ==========================================
// ImportSession - 导入会话
// ==========================================
#[derive(Debug)]
pub struct ImportSession {
    archive_id: i64,
    import_id: String,
    entries: Vec<ImportLogEntry>,
    top_level: Vec<RecordRef>,
    created: Vec<RecordRef>,
}

impl ImportSession {
    pub fn new(archive_id: i64) -> Self {
        Self {
            archive_id,
            import_id: Uuid::new_v4().to_string(),
            entries: Vec::new(),
            top_level: Vec::new(),
            created: Vec::new(),
        }
    }

    pub fn archive_id(&self) -> i64 {
        self.archive_id
    }

    pub fn import_id(&self) -> &str {
        &self.import_id
    }

    /// 追加一条日志（comment 按 import.<kind> 渲染）
    pub fn push(
        &mut self,
        kind: LogKind,
        record: Option<RecordRef>,
        line: Option<usize>,
        args: &[(&str, &str)],
    ) {
        let comment = i18n::t_with_args(&format!("import.{}", kind.key()), args);
        self.entries.push(ImportLogEntry {
            create_date: now(),
            record,
            status: kind.status(),
            kind,
            line,
            comment,
        });
    }

    /// 当前位置（用于分组回滚时丢弃其 done 条目）
    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    /// 丢弃 mark 之后产生的 done 条目，保留错误条目
    pub fn discard_done_since(&mut self, mark: usize) {
        let mut index = 0;
        self.entries.retain(|entry| {
            let keep = index < mark || !entry.is_done();
            index += 1;
            keep
        });
    }

    /// 档案中止：丢弃全部 done 条目与顶层记录，保留错误条目
    pub fn abort(&mut self) {
        self.discard_done_since(0);
        self.top_level.clear();
        self.created.clear();
    }

    /// 登记顶层记录（去重）
    pub fn record_top_level(&mut self, record: RecordRef) {
        if !self.top_level.contains(&record) {
            self.top_level.push(record);
        }
    }

    /// 登记新建的顶层记录（去重）
    pub fn record_created(&mut self, record: RecordRef) {
        if !self.created.contains(&record) {
            self.created.push(record);
        }
    }

    pub fn entries(&self) -> &[ImportLogEntry] {
        &self.entries
    }

    pub fn top_level(&self) -> &[RecordRef] {
        &self.top_level
    }

    pub fn created(&self) -> &[RecordRef] {
        &self.created
    }

    pub fn done_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_done()).count()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    /// 结束会话
    pub fn finish(self) -> SessionOutcome {
        SessionOutcome {
            import_id: self.import_id,
            entries: self.entries,
            top_level: self.top_level,
            created: self.created,
        }
    }
}

fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
