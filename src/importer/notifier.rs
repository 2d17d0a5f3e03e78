// ==========================================
// CSV 导入引擎 - 导入通知
// ==========================================
// 实现: OutboxNotifier（写入 notification_outbox 表，由外部投递）
//       LogNotifier（仅记录 tracing 日志）
// ==========================================

use crate::domain::record::RecordRef;
use crate::i18n;
use crate::importer::csv_importer_trait::Notifier;
use anyhow::{anyhow, Context};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use tracing::info;

/// 通知标题
pub fn notification_subject() -> String {
    i18n::t("notification.request_title")
}

/// 通知正文：There are new <model> from <profile>. IDs: a, b
pub fn notification_body(model: &str, profile: &str, records: &[RecordRef]) -> String {
    let ids: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    format!(
        "{}{}",
        i18n::t_with_args("notification.new_record", &[("model", model), ("profile", profile)]),
        ids.join(", ")
    )
}

// ==========================================
// OutboxNotifier
// ==========================================
pub struct OutboxNotifier {
    conn: Arc<Mutex<Connection>>,
}

impl OutboxNotifier {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 发件箱中的待投递数量
    pub fn pending_count(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow!("锁获取失败: {}", e))?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM notification_outbox", [], |row| {
            row.get(0)
        })?;
        Ok(n as usize)
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, group: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        if group.trim().is_empty() {
            return Err(anyhow!("通知用户组为空"));
        }
        let conn = self.conn.lock().map_err(|e| anyhow!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO notification_outbox (group_name, subject, body) VALUES (?1, ?2, ?3)",
            params![group, subject, body],
        )
        .with_context(|| format!("写入通知发件箱失败 (group={})", group))?;
        Ok(())
    }
}

// ==========================================
// LogNotifier
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, group: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(group, subject, body, "导入通知");
        Ok(())
    }
}
