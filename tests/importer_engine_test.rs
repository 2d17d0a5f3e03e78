// ==========================================
// CSV 导入引擎 - CsvImporter 集成测试
// ==========================================
// 覆盖: 分组/层级落库、更新幂等、仅新建、档案致命错误回滚、
//       模拟模式、分组级失败隔离、通知、集合关联、钩子
// ==========================================


use csv_import::domain::{
    ArchiveState, CsvProfile, FieldKind, FieldMapping, FieldValues, LogKind, MappingLine,
    ProfileMapping, RecordRef, RelationKind,
};
use csv_import::importer::{
    CsvImporter, FnMapper, ImportError, ImportHooks, MappingColumn, MappingRegistry, Notifier,
    OutboxNotifier,
};
use csv_import::repository::{RecordStore, RepositoryError, SearchDomain};
use serde_json::json;
use std::sync::{Arc, Mutex};
use test_helpers::*;

fn kinds(report: &csv_import::ArchiveImportReport) -> Vec<LogKind> {
    report.entries.iter().map(|e| e.kind).collect()
}

// ==========================================
// 基本场景
// ==========================================

#[test]
fn test_parties_with_contacts_are_created_per_group() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let reports = importer.import(&[archive.id]).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(report.groups, 2);
    assert_eq!(report.done_count(), 5);
    assert_eq!(report.error_count(), 0);
    assert_eq!(report.records.len(), 2);

    // 每条落库记录一条 done 日志，行号取自源行
    let lines: Vec<_> = report.entries.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![Some(2), Some(2), Some(3), Some(4), Some(4)]);

    let store = env.store();
    let parties = store.list(PARTY).unwrap();
    let names: Vec<_> = parties.iter().map(|(_, v)| v["name"].clone()).collect();
    assert_eq!(names, vec![json!("Acme"), json!("Beta")]);

    let acme = &parties[0].0;
    let beta = &parties[1].0;
    let contacts = store.list(CONTACT).unwrap();
    assert_eq!(contacts.len(), 3);

    let of = |party: &RecordRef| -> Vec<serde_json::Value> {
        contacts
            .iter()
            .filter(|(_, v)| v["party"] == json!(party.id))
            .map(|(_, v)| v["value"].clone())
            .collect()
    };
    assert_eq!(of(acme), vec![json!("info@acme.test"), json!("sales@acme.test")]);
    assert_eq!(of(beta), vec![json!("hello@beta.test")]);

    // 档案状态与日志已落库
    let archive = env.archive(archive.id);
    assert_eq!(archive.state, ArchiveState::Done);
    assert!(archive.log.contains(&report.import_id));
    assert_eq!(env.archives.find_log_entries(archive.id).unwrap().len(), 5);
}

#[test]
fn test_reimport_with_update_is_idempotent() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&updating_party_profile());
    let first = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let second = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let reports = importer.import(&[first.id, second.id]).unwrap();
    assert_eq!(reports.len(), 2);

    let store = env.store();
    assert_eq!(store.count(PARTY).unwrap(), 2);
    assert_eq!(store.count(CONTACT).unwrap(), 3);

    assert!(kinds(&reports[0]).iter().all(|k| *k == LogKind::RecordSaved));
    assert_eq!(kinds(&reports[1]), vec![LogKind::RecordUpdated; 5]);
    assert_eq!(reports[1].records, reports[0].records);
}

/// 更新键查询失败的记录存储
struct SearchFailingStore(csv_import::repository::SqliteRecordStore);

impl RecordStore for SearchFailingStore {
    fn search(
        &self,
        _model: &str,
        _domain: &SearchDomain<'_>,
    ) -> Result<Vec<RecordRef>, RepositoryError> {
        Err(RepositoryError::DatabaseQueryError("search unavailable".to_string()))
    }

    fn create(&self, model: &str, values: &FieldValues) -> Result<RecordRef, RepositoryError> {
        self.0.create(model, values)
    }

    fn write(&self, record: &RecordRef, values: &FieldValues) -> Result<(), RepositoryError> {
        self.0.write(record, values)
    }

    fn read(&self, record: &RecordRef) -> Result<FieldValues, RepositoryError> {
        self.0.read(record)
    }

    fn attach(&self, parent: &RecordRef, field: &str, child: &RecordRef) -> Result<(), RepositoryError> {
        self.0.attach(parent, field, child)
    }

    fn linked(&self, parent: &RecordRef, field: &str) -> Result<Vec<RecordRef>, RepositoryError> {
        self.0.linked(parent, field)
    }

    fn savepoint(&self, name: &str) -> Result<(), RepositoryError> {
        self.0.savepoint(name)
    }

    fn release(&self, name: &str) -> Result<(), RepositoryError> {
        self.0.release(name)
    }

    fn rollback_to(&self, name: &str) -> Result<(), RepositoryError> {
        self.0.rollback_to(name)
    }
}

#[test]
fn test_update_key_lookup_failure_is_updating_error() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&updating_party_profile());
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer_with_store(SearchFailingStore(env.store()), party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(kinds(&report), vec![LogKind::UpdatingError; 2]);
    let lines: Vec<_> = report.entries.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![Some(2), Some(4)]);
    assert_eq!(env.store().count(PARTY).unwrap(), 0);
}

#[test]
fn test_create_only_profile_doubles_records() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let first = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let second = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    importer.import(&[first.id, second.id]).unwrap();

    let store = env.store();
    assert_eq!(store.count(PARTY).unwrap(), 4);
    assert_eq!(store.count(CONTACT).unwrap(), 6);
}

#[test]
fn test_update_without_create_reports_unmatched_groups() {
    let env = TestEnv::new();
    let mut profile = updating_party_profile();
    profile.create_record = false;
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(kinds(&report), vec![LogKind::NotCreateUpdate; 2]);
    assert_eq!(env.store().count(PARTY).unwrap(), 0);
}

#[test]
fn test_done_archive_is_not_reimported() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    importer.import(&[archive.id]).unwrap();
    let reports = importer.import(&[archive.id]).unwrap();

    assert_eq!(reports[0].state, ArchiveState::Done);
    assert_eq!(kinds(&reports[0]), vec![LogKind::ArchiveState]);
    assert_eq!(env.store().count(PARTY).unwrap(), 2);
}

#[test]
fn test_unknown_archive_id_is_skipped() {
    let env = TestEnv::new();
    let importer = env.importer(party_registry());
    assert!(importer.import(&[404]).unwrap().is_empty());
}

// ==========================================
// 档案级致命错误
// ==========================================

#[test]
fn test_malformed_width_is_archive_fatal() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(
        profile_id,
        b"name,email\nAcme,info@acme.test\nBeta\nGamma,g@gamma.test\n",
    );
    let importer = env.importer(party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Draft);
    assert_eq!(kinds(&report), vec![LogKind::FormatError]);
    assert_eq!(report.entries[0].line, Some(3));
    assert_eq!(env.store().count(PARTY).unwrap(), 0);
    assert_eq!(env.archive(archive.id).state, ArchiveState::Draft);
}

#[test]
fn test_mapping_error_rolls_back_whole_archive() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());

    let mut registry = party_registry();
    registry.register(
        FnMapper::new("party", PARTY, |row, ctx| {
            let name = row.get("name").cloned().unwrap_or_default();
            if name == "Beta" {
                return Err(ImportError::MappingError {
                    mapping: "party".to_string(),
                    line: ctx.line,
                    message: "Beta 不允许导入".to_string(),
                });
            }
            let mut values = FieldValues::new();
            values.insert("name".to_string(), json!(name));
            Ok(values)
        })
        .with_columns(vec![MappingColumn::new("name", 0)]),
    );
    let importer = env.importer(registry);

    let report = importer.import_archive(&archive).unwrap();

    // Acme 分组已落库后被档案保存点整体回滚
    assert_eq!(report.state, ArchiveState::Draft);
    assert_eq!(kinds(&report), vec![LogKind::MappingError]);
    assert_eq!(report.entries[0].line, Some(4));
    assert!(report.records.is_empty());
    assert_eq!(env.store().count(PARTY).unwrap(), 0);
    assert_eq!(env.store().count(CONTACT).unwrap(), 0);
}

#[test]
fn test_unregistered_mapping_is_config_error() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.mappings.push(ProfileMapping::child("ghost", "party", "party"));
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Draft);
    assert_eq!(kinds(&report), vec![LogKind::ConfigError]);
}

#[test]
fn test_undecodable_payload_is_read_error() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(profile_id, &[b'n', b'a', 0xff, 0xfe, b'\n']);
    let importer = env.importer(party_registry());

    assert!(importer.read_dialect(&archive).is_none());

    let report = importer.import_archive(&archive).unwrap();
    assert_eq!(report.state, ArchiveState::Draft);
    assert_eq!(kinds(&report), vec![LogKind::ReadError]);
}

#[test]
fn test_fatal_archive_does_not_stop_following_archives() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let broken = env.add_archive(profile_id, b"name,email\nAcme\n");
    let good = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let reports = importer.import(&[broken.id, good.id]).unwrap();

    assert_eq!(reports[0].state, ArchiveState::Draft);
    assert_eq!(reports[1].state, ArchiveState::Done);
    assert_eq!(env.store().count(PARTY).unwrap(), 2);
}

// ==========================================
// 分组级错误
// ==========================================

#[test]
fn test_persistence_failure_only_skips_its_group() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.has_header = false;
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(
        profile_id,
        b"Acme,info@acme.test,A1\n,sales@acme.test,\nBeta,hello@beta.test,\n",
    );

    let registry = MappingRegistry::from_mappings(vec![
        FieldMapping::new(
            "party",
            PARTY,
            vec![MappingLine::new("name", 0, "name"), MappingLine::new("code", 2, "code")],
        ),
        FieldMapping::new("contact", CONTACT, vec![MappingLine::new("email", 1, "value")]),
    ]);
    let store = env.store().with_required(PARTY, &["code"]);
    let importer = env.importer_with_store(store, registry);

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(report.done_count(), 3);
    assert_eq!(
        report.entries.last().map(|e| (e.kind, e.line)),
        Some((LogKind::CreationError, Some(3)))
    );
    assert_eq!(env.store().count(PARTY).unwrap(), 1);
    assert_eq!(env.store().count(CONTACT).unwrap(), 2);
}

#[test]
fn test_required_child_without_value_skips_group() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.has_header = false;
    profile.mappings = vec![
        ProfileMapping::base("party"),
        ProfileMapping::child("contact", "party", "party").required(),
    ];
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, b"Acme,info@acme.test\nBeta,\n");
    let importer = env.importer(party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(
        kinds(&report),
        vec![LogKind::RecordSaved, LogKind::RecordSaved, LogKind::RequiredEmpty]
    );
    assert_eq!(env.store().count(PARTY).unwrap(), 1);
}

#[test]
fn test_date_conversion_error_skips_group() {
    let env = TestEnv::new();
    let mut profile = CsvProfile::new("Parties", PARTY);
    profile.mappings = vec![ProfileMapping::base("party")];
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, b"Acme,20240301\nBeta,03/01/2024\n");

    let registry = MappingRegistry::from_mappings(vec![FieldMapping::new(
        "party",
        PARTY,
        vec![
            MappingLine::new("name", 0, "name"),
            MappingLine::new("founded", 1, "founded").with_kind(FieldKind::Date),
        ],
    )]);
    let importer = env.importer(registry);

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(kinds(&report), vec![LogKind::RecordSaved, LogKind::ConversionError]);
    let parties = env.store().list(PARTY).unwrap();
    assert_eq!(parties.len(), 1);
    assert_eq!(parties[0].1["founded"], json!("2024-03-01"));
}

#[test]
fn test_child_without_relation_field_is_skipped() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.mappings = vec![
        ProfileMapping::base("party"),
        ProfileMapping {
            mapping: "contact".to_string(),
            parent: Some("party".to_string()),
            rel_field: None,
            link: RelationKind::ParentReference,
            required: false,
        },
    ];
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(report.entries_of(LogKind::RelationMissing).count(), 1);
    assert_eq!(env.store().count(PARTY).unwrap(), 2);
    assert_eq!(env.store().count(CONTACT).unwrap(), 0);
}

// ==========================================
// 模拟模式 / 更新剔除 / 集合关联
// ==========================================

#[test]
fn test_simulation_writes_nothing() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.testing = true;
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(kinds(&report), vec![LogKind::SuccessSimulation; 2]);
    assert!(report.records.is_empty());
    assert_eq!(env.store().count(PARTY).unwrap(), 0);
    assert_eq!(env.store().count(CONTACT).unwrap(), 0);
}

#[test]
fn test_create_only_fields_are_kept_on_update() {
    let env = TestEnv::new();
    let mut profile = CsvProfile::new("Parties", PARTY);
    profile.mappings = vec![ProfileMapping::base("party")];
    profile.update_record = true;
    profile.code_internal = Some("name".to_string());
    let profile_id = env.add_profile(&profile);
    let first = env.add_archive(profile_id, b"Acme,A1,EUR\n");
    let second = env.add_archive(profile_id, b"Acme,B2,USD\n");

    let registry = MappingRegistry::from_mappings(vec![FieldMapping::new(
        "party",
        PARTY,
        vec![
            MappingLine::new("name", 0, "name"),
            MappingLine::new("code", 1, "code").create_only(),
            MappingLine::new("currency", 2, "currency"),
        ],
    )]);
    let importer = env.importer(registry);
    importer.import(&[first.id, second.id]).unwrap();

    let parties = env.store().list(PARTY).unwrap();
    assert_eq!(parties.len(), 1);
    assert_eq!(parties[0].1["code"], json!("A1"));
    assert_eq!(parties[0].1["currency"], json!("USD"));
}

#[test]
fn test_collection_link_attaches_children() {
    let env = TestEnv::new();
    let mut profile = updating_party_profile();
    profile.mappings = vec![
        ProfileMapping::base("party"),
        ProfileMapping::child("contact", "party", "contact_mechanisms")
            .with_link(RelationKind::ParentCollection),
    ];
    let profile_id = env.add_profile(&profile);
    let first = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let second = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    importer.import(&[first.id]).unwrap();

    let store = env.store();
    let parties = store.list(PARTY).unwrap();
    let acme = &parties[0].0;
    assert_eq!(store.linked(acme, "contact_mechanisms").unwrap().len(), 2);
    let contacts = store.list(CONTACT).unwrap();
    assert!(contacts.iter().all(|(_, v)| v.get("contact_mechanisms").is_none()));

    // 再次导入按集合成员匹配已有子记录
    let report = importer.import_archive(&env.archive(second.id)).unwrap();
    assert_eq!(kinds(&report), vec![LogKind::RecordUpdated; 5]);
    assert_eq!(store.count(CONTACT).unwrap(), 3);
    assert_eq!(store.linked(acme, "contact_mechanisms").unwrap().len(), 2);
}

// ==========================================
// 钩子与通知
// ==========================================

#[derive(Default)]
struct RecordingHooks {
    imported: Arc<Mutex<Vec<(String, Vec<RecordRef>)>>>,
}

impl ImportHooks for RecordingHooks {
    fn apply_defaults(
        &self,
        model: &str,
        mut values: FieldValues,
        parent: Option<&FieldValues>,
    ) -> FieldValues {
        match (model, parent) {
            (PARTY, None) => {
                values.entry("active".to_string()).or_insert(json!(true));
            }
            (CONTACT, Some(parent)) => {
                if let Some(name) = parent.get("name") {
                    values.insert("owner".to_string(), name.clone());
                }
            }
            _ => {}
        }
        values
    }

    fn post_import(&self, model: &str, records: &[RecordRef]) {
        self.imported
            .lock()
            .unwrap()
            .push((model.to_string(), records.to_vec()));
    }
}

#[test]
fn test_hooks_fill_defaults_and_receive_imported_records() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());

    let hooks = RecordingHooks::default();
    let imported = hooks.imported.clone();
    let importer = env.importer(party_registry()).with_hooks(Box::new(hooks));

    let report = importer.import_archive(&archive).unwrap();

    let store = env.store();
    assert!(store.list(PARTY).unwrap().iter().all(|(_, v)| v["active"] == json!(true)));
    let owners: Vec<_> = store
        .list(CONTACT)
        .unwrap()
        .into_iter()
        .map(|(_, v)| v["owner"].clone())
        .collect();
    assert_eq!(owners, vec![json!("Acme"), json!("Acme"), json!("Beta")]);

    let imported = imported.lock().unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].0, PARTY);
    assert_eq!(imported[0].1, report.records);
    assert_eq!(report.created, report.records);
}

#[test]
fn test_post_import_receives_only_created_records() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&updating_party_profile());
    let first = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let again = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let extended = format!("{}Gamma,g@gamma.test\n", SCENARIO_CSV);
    let third = env.add_archive(profile_id, extended.as_bytes());

    let hooks = RecordingHooks::default();
    let imported = hooks.imported.clone();
    let importer = env.importer(party_registry()).with_hooks(Box::new(hooks));

    let reports = importer.import(&[first.id, again.id, third.id]).unwrap();
    assert!(reports.iter().all(|r| r.is_imported()));

    // 仅更新的档案不触发 post_import
    assert_eq!(reports[1].records.len(), 2);
    assert!(reports[1].created.is_empty());

    assert_eq!(reports[2].records.len(), 3);
    assert_eq!(reports[2].created.len(), 1);

    let imported = imported.lock().unwrap();
    assert_eq!(imported.len(), 2);
    assert_eq!(imported[0].1, reports[0].created);
    assert_eq!(imported[1].1, reports[2].created);
    let gamma = env.store().read(&imported[1].1[0]).unwrap();
    assert_eq!(gamma["name"], json!("Gamma"));
}

#[test]
fn test_notification_written_to_outbox() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.group = Some("sales".to_string());
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    importer.import_archive(&archive).unwrap();

    let outbox = OutboxNotifier::new(env.conn.clone());
    assert_eq!(outbox.pending_count().unwrap(), 1);
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _group: &str, _subject: &str, _body: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("SMTP 不可用"))
    }
}

#[test]
fn test_notification_failure_does_not_abort_import() {
    let env = TestEnv::new();
    let mut profile = party_profile();
    profile.group = Some("sales".to_string());
    let profile_id = env.add_profile(&profile);
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env
        .importer(party_registry())
        .with_notifier(Box::new(FailingNotifier));

    let report = importer.import_archive(&archive).unwrap();

    assert_eq!(report.state, ArchiveState::Done);
    assert_eq!(report.done_count(), 5);
    assert_eq!(kinds(&report).last(), Some(&LogKind::NotificationError));
    assert_eq!(env.store().count(PARTY).unwrap(), 2);
}

#[test]
fn test_read_dialect_returns_rows_and_headers() {
    let env = TestEnv::new();
    let profile_id = env.add_profile(&party_profile());
    let archive = env.add_archive(profile_id, SCENARIO_CSV.as_bytes());
    let importer = env.importer(party_registry());

    let (rows, headers) = importer.read_dialect(&archive).unwrap();
    assert_eq!(headers, Some(vec!["name".to_string(), "email".to_string()]));
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].cells, vec!["".to_string(), "sales@acme.test".to_string()]);
}
