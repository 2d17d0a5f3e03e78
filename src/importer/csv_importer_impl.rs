// ==========================================
// CSV 导入引擎 - 导入器实现
// ==========================================
// 职责: 整合导入流程，从档案载荷到目标记录
// 流程: 状态检查 → Profile → 方言解析 → 映射计划 → 行宽校验
//       → 分组 → 层级组装 → 新建/更新 → 通知 → 日志落库
// 事务: 档案级保存点（致命错误整体回滚，档案保持 DRAFT）
//       分组级保存点（持久化失败只回滚本分组）
// ==========================================

use crate::domain::archive::CsvArchive;
use crate::domain::import_log::{ImportLogEntry, LogKind};
use crate::domain::profile::CsvProfile;
use crate::domain::record::RecordRef;
use crate::domain::types::ArchiveState;
use crate::i18n;
use crate::importer::csv_importer_trait::{CsvImporter, ImportHooks, NoopHooks, Notifier};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::MappingRegistry;
use crate::importer::file_parser::{self, CsvDialect, SourceRow};
use crate::importer::hierarchy::{HierarchyAssembler, MappingPlan};
use crate::importer::import_session::ImportSession;
use crate::importer::notifier::{notification_body, notification_subject, LogNotifier, OutboxNotifier};
use crate::importer::record_resolver::RecordResolver;
use crate::importer::row_grouper::group_by_column;
use crate::repository::{
    ArchiveRepository, ArchiveStorage, ProfileRepository, RecordStore, SqliteRecordStore,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, instrument, warn};

/// 档案级保存点名称
pub const ARCHIVE_SAVEPOINT: &str = "import_archive";

// ==========================================
// ArchiveImportReport - 单个档案的导入报告
// ==========================================
#[derive(Debug, Clone)]
pub struct ArchiveImportReport {
    pub archive_id: i64,
    pub import_id: String,
    /// 导入后的档案状态（成功为 DONE，否则保持原状态）
    pub state: ArchiveState,
    /// 处理的分组数
    pub groups: usize,
    pub entries: Vec<ImportLogEntry>,
    /// 新建/更新的顶层记录
    pub records: Vec<RecordRef>,
    /// 其中本次新建的顶层记录
    pub created: Vec<RecordRef>,
}

impl ArchiveImportReport {
    pub fn done_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_done()).count()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    pub fn is_imported(&self) -> bool {
        self.state == ArchiveState::Done
    }

    /// 指定类型的日志条目
    pub fn entries_of(&self, kind: LogKind) -> impl Iterator<Item = &ImportLogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

// ==========================================
// CsvImporterImpl - CSV 导入器实现
// ==========================================
pub struct CsvImporterImpl<S>
where
    S: RecordStore,
{
    // 数据访问层
    archives: ArchiveRepository,
    profiles: ProfileRepository,
    storage: ArchiveStorage,

    // 目标记录存储
    store: S,

    // 映射与扩展点
    registry: MappingRegistry,
    hooks: Box<dyn ImportHooks>,
    notifier: Box<dyn Notifier>,
}

impl<S> CsvImporterImpl<S>
where
    S: RecordStore,
{
    /// 创建导入器（默认无钩子，通知只写日志）
    pub fn new(
        archives: ArchiveRepository,
        profiles: ProfileRepository,
        storage: ArchiveStorage,
        store: S,
        registry: MappingRegistry,
    ) -> Self {
        Self {
            archives,
            profiles,
            storage,
            store,
            registry,
            hooks: Box::new(NoopHooks),
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn ImportHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &MappingRegistry {
        &self.registry
    }

    /// 导入所有 DRAFT 档案
    pub fn import_drafts(&self) -> ImportResult<Vec<ArchiveImportReport>> {
        let ids: Vec<i64> = self.archives.list_drafts()?.iter().map(|a| a.id).collect();
        self.import(&ids)
    }

    // ==========================================
    // 档案主体（在档案保存点内执行）
    // ==========================================
    fn run_archive(
        &self,
        archive: &CsvArchive,
        profile: &CsvProfile,
        session: &mut ImportSession,
    ) -> ImportResult<usize> {
        // 1. 映射计划
        let plan = MappingPlan::build(profile, &self.registry)?;
        for skipped in &plan.skipped {
            session.push(LogKind::RelationMissing, None, None, &[("mapping", skipped)]);
        }

        // 2. 读取与解析
        let dialect = CsvDialect::from_profile(profile)?;
        let payload = self
            .storage
            .read(archive)
            .map_err(|e| ImportError::FileReadError(e.to_string()))?;
        let (rows, headers) = file_parser::read_dialect(&payload, &dialect)?;
        let rows: Vec<SourceRow> = rows.collect::<ImportResult<_>>()?;
        debug!(rows = rows.len(), has_header = headers.is_some(), "载荷解析完成");

        // 3. 行宽校验（任一行不足即档案致命）
        if let Some(max_column) = plan.max_column() {
            check_widths(&rows, max_column + 1)?;
        }

        // 4. 分组
        let groups = group_by_column(rows, plan.leading_column());
        info!(groups = groups.len(), "分组完成");

        // 5. 逐组组装与持久化
        let assembler =
            HierarchyAssembler::new(&plan, self.hooks.as_ref(), profile, headers.as_deref());
        let resolver = RecordResolver::new(&self.store, self.hooks.as_ref(), &plan, profile);

        for group in &groups {
            let tree = match assembler.assemble(group) {
                Ok(tree) => tree,
                Err(e) if !e.is_archive_fatal() => {
                    warn!(line = group.line(), error = %e, "分组组装失败，跳过");
                    push_group_error(session, &e, group.line());
                    continue;
                }
                Err(e) => return Err(e),
            };
            resolver.persist_group(group, &tree, session)?;
        }

        Ok(groups.len())
    }

    /// 通知 Profile 用户组（失败只记录错误条目）
    fn notify(&self, profile: &CsvProfile, session: &mut ImportSession) {
        let Some(group) = profile.group.as_deref().filter(|g| !g.trim().is_empty()) else {
            debug!("Profile 未配置通知用户组，跳过通知");
            return;
        };
        let body = notification_body(&profile.model, &profile.name, session.top_level());
        if let Err(e) = self.notifier.notify(group, &notification_subject(), &body) {
            warn!(group, error = %e, "导入通知失败");
            session.push(
                LogKind::NotificationError,
                None,
                None,
                &[("group", group), ("error", &e.to_string())],
            );
        }
    }

    /// 日志落库 + 状态迁移
    fn finish(
        &self,
        archive: &CsvArchive,
        session: ImportSession,
        imported: bool,
        groups: usize,
    ) -> ImportResult<ArchiveImportReport> {
        let done = session.done_count().to_string();
        let errors = session.error_count().to_string();
        let outcome = session.finish();

        let mut lines = Vec::with_capacity(outcome.entries.len() + 2);
        lines.push(i18n::t_with_args(
            "import.reading_archive",
            &[("archive", &archive.archive_name)],
        ));
        lines.extend(outcome.entries.iter().map(|e| e.to_log_line()));
        lines.push(i18n::t_with_args(
            "import.summary",
            &[("import_id", &outcome.import_id), ("done", &done), ("errors", &errors)],
        ));

        self.archives
            .insert_log_entries(archive.id, &outcome.import_id, &outcome.entries)?;
        self.archives.append_log(archive.id, &lines)?;

        let state = if imported {
            self.archives.update_state(archive.id, ArchiveState::Done)?;
            ArchiveState::Done
        } else {
            archive.state
        };

        info!(
            archive_id = archive.id,
            import_id = %outcome.import_id,
            state = %state.as_str(),
            done = %done,
            errors = %errors,
            "档案导入结束"
        );

        Ok(ArchiveImportReport {
            archive_id: archive.id,
            import_id: outcome.import_id,
            state,
            groups,
            entries: outcome.entries,
            records: outcome.top_level,
            created: outcome.created,
        })
    }
}

impl CsvImporterImpl<SqliteRecordStore> {
    /// 基于同一 SQLite 连接装配导入器（通知写入发件箱）
    pub fn with_sqlite(
        conn: Arc<Mutex<Connection>>,
        storage: ArchiveStorage,
        registry: MappingRegistry,
    ) -> Self {
        Self::new(
            ArchiveRepository::new(conn.clone()),
            ProfileRepository::new(conn.clone()),
            storage,
            SqliteRecordStore::new(conn.clone()),
            registry,
        )
        .with_notifier(Box::new(OutboxNotifier::new(conn)))
    }
}

impl<S> CsvImporter for CsvImporterImpl<S>
where
    S: RecordStore,
{
    fn import(&self, archive_ids: &[i64]) -> ImportResult<Vec<ArchiveImportReport>> {
        info!(count = archive_ids.len(), "开始导入档案");
        let mut reports = Vec::with_capacity(archive_ids.len());
        for id in archive_ids {
            match self.archives.find_by_id(*id)? {
                Some(archive) => reports.push(self.import_archive(&archive)?),
                None => warn!(archive_id = id, "档案不存在，跳过"),
            }
        }
        Ok(reports)
    }

    #[instrument(skip(self, archive), fields(archive_id = archive.id, archive = %archive.archive_name))]
    fn import_archive(&self, archive: &CsvArchive) -> ImportResult<ArchiveImportReport> {
        let mut session = ImportSession::new(archive.id);

        // 1. 状态检查
        if archive.state != ArchiveState::Draft {
            warn!(state = %archive.state.as_str(), "档案非 DRAFT，跳过导入");
            session.push(
                LogKind::ArchiveState,
                None,
                None,
                &[("archive", &archive.archive_name), ("state", archive.state.as_str())],
            );
            return self.finish(archive, session, false, 0);
        }

        // 2. Profile
        let profile = match self.load_profile(archive) {
            Ok(profile) => profile,
            Err(e) => {
                error!(error = %e, "Profile 无效，档案保持 DRAFT");
                push_archive_error(&mut session, &e, archive);
                return self.finish(archive, session, false, 0);
            }
        };

        // 3. 档案保存点内导入
        self.store.savepoint(ARCHIVE_SAVEPOINT)?;
        match self.run_archive(archive, &profile, &mut session) {
            Ok(groups) => {
                self.store.release(ARCHIVE_SAVEPOINT)?;
                if !session.created().is_empty() {
                    self.hooks.post_import(&profile.model, session.created());
                }
                if !session.top_level().is_empty() {
                    self.notify(&profile, &mut session);
                }
                self.finish(archive, session, true, groups)
            }
            Err(e) => {
                error!(error = %e, "档案导入失败，整体回滚");
                self.store.rollback_to(ARCHIVE_SAVEPOINT)?;
                session.abort();
                push_archive_error(&mut session, &e, archive);
                self.finish(archive, session, false, 0)
            }
        }
    }

    fn read_dialect(&self, archive: &CsvArchive) -> Option<(Vec<SourceRow>, Option<Vec<String>>)> {
        let profile = match self.profiles.find_by_id(archive.profile_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(profile_id = archive.profile_id, "Profile 不存在");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "读取 Profile 失败");
                return None;
            }
        };

        let parsed = CsvDialect::from_profile(&profile).and_then(|dialect| {
            let payload = self
                .storage
                .read(archive)
                .map_err(|e| ImportError::FileReadError(e.to_string()))?;
            let (rows, headers) = file_parser::read_dialect(&payload, &dialect)?;
            let rows = rows.collect::<ImportResult<Vec<_>>>()?;
            Ok((rows, headers))
        });

        match parsed {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(archive_id = archive.id, error = %e, "档案解析失败");
                None
            }
        }
    }
}

impl<S> CsvImporterImpl<S>
where
    S: RecordStore,
{
    fn load_profile(&self, archive: &CsvArchive) -> ImportResult<CsvProfile> {
        let profile = self
            .profiles
            .find_by_id(archive.profile_id)?
            .ok_or_else(|| {
                ImportError::ProfileError(format!("Profile {} 不存在", archive.profile_id))
            })?;
        profile.validate().map_err(ImportError::ProfileError)?;
        Ok(profile)
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 行宽校验：每个非空行至少 required 列
fn check_widths(rows: &[SourceRow], required: usize) -> ImportResult<()> {
    match rows
        .iter()
        .find(|row| !row.is_blank() && row.cells.len() < required)
    {
        Some(row) => Err(ImportError::FormatError {
            line: row.line,
            expected: required,
            actual: row.cells.len(),
        }),
        None => Ok(()),
    }
}

/// 分组级错误 → 日志条目
fn push_group_error(session: &mut ImportSession, error: &ImportError, line: usize) {
    let line_text = line.to_string();
    match error {
        ImportError::RequiredMappingEmpty { mapping, line } => {
            let line_text = line.to_string();
            session.push(
                LogKind::RequiredEmpty,
                None,
                Some(*line),
                &[("mapping", mapping), ("line", &line_text)],
            );
        }
        _ => session.push(
            LogKind::ConversionError,
            None,
            Some(line),
            &[("line", &line_text), ("error", &error.to_string())],
        ),
    }
}

/// 档案级错误 → 日志条目
fn push_archive_error(session: &mut ImportSession, error: &ImportError, archive: &CsvArchive) {
    let text = error.to_string();
    let (kind, line) = match error {
        ImportError::FormatError { line, .. } => (LogKind::FormatError, Some(*line)),
        ImportError::DialectError(_) => (LogKind::FormatError, None),
        ImportError::MappingError { line, .. } => (LogKind::MappingError, Some(*line)),
        ImportError::ConfigError(_) | ImportError::ProfileError(_) => (LogKind::ConfigError, None),
        _ => (LogKind::ReadError, None),
    };
    session.push(
        kind,
        None,
        line,
        &[("error", &text), ("path", &archive.storage_name())],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(line: usize, cells: &[&str]) -> SourceRow {
        SourceRow::new(line, cells.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_check_widths_ignores_blank_rows() {
        let rows = vec![row(1, &["a", "b"]), row(2, &[""]), row(3, &["c", ""])];
        assert!(check_widths(&rows, 2).is_ok());
    }

    #[test]
    fn test_check_widths_reports_first_short_row() {
        let rows = vec![row(1, &["a", "b"]), row(2, &["c"]), row(3, &["d"])];
        match check_widths(&rows, 2) {
            Err(ImportError::FormatError {
                line,
                expected,
                actual,
            }) => {
                assert_eq!(line, 2);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_group_error_kinds() {
        let mut session = ImportSession::new(1);
        push_group_error(
            &mut session,
            &ImportError::RequiredMappingEmpty {
                mapping: "contacts".to_string(),
                line: 4,
            },
            3,
        );
        push_group_error(
            &mut session,
            &ImportError::TypeConversionError {
                row: 5,
                field: "age".to_string(),
                message: "x".to_string(),
            },
            5,
        );
        let kinds: Vec<_> = session.entries().iter().map(|e| (e.kind, e.line)).collect();
        assert_eq!(
            kinds,
            vec![
                (LogKind::RequiredEmpty, Some(4)),
                (LogKind::ConversionError, Some(5))
            ]
        );
    }
}
