// ==========================================
// CSV 导入引擎 - 命令行入口
// ==========================================
// 用法: csv-import [--db <path>] [archive_id ...]
// - --db 缺省时取 CSV_IMPORT_DB_PATH 或数据目录下的 csv_import.db
// - 未给出档案 id 时导入所有 DRAFT 档案
// ==========================================

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use csv_import::config::{default_db_path, ConfigManager, ImportConfigReader};
use csv_import::importer::{CsvImporter, CsvImporterImpl, MappingRegistry};
use csv_import::repository::{ArchiveStorage, MappingRepository};
use csv_import::{db, i18n, logging};

#[derive(Parser, Debug)]
#[command(name = "csv-import", version, about = "导入 DRAFT 状态的 CSV 档案")]
struct Cli {
    /// SQLite 数据库路径
    #[arg(long = "db", short = 'd', value_name = "PATH")]
    db_path: Option<String>,

    /// 待导入的档案 id（缺省导入全部 DRAFT 档案）
    #[arg(value_name = "ARCHIVE_ID")]
    archive_ids: Vec<i64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    logging::init();

    let db_path = cli.db_path.unwrap_or_else(default_db_path);
    let archive_ids = cli.archive_ids;

    tracing::info!("==================================================");
    tracing::info!("CSV 导入引擎 v{}", csv_import::VERSION);
    tracing::info!("使用数据库: {}", db_path);
    tracing::info!("==================================================");

    // 数据库
    let conn = db::open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    db::init_schema(&conn).context("初始化数据库结构失败")?;
    let conn = Arc::new(Mutex::new(conn));

    // 配置
    let config = ConfigManager::from_connection(conn.clone()).map_err(|e| anyhow!("{}", e))?;
    let locale = config.get_locale().map_err(|e| anyhow!("{}", e))?;
    i18n::set_locale(&locale);
    let storage = ArchiveStorage::from_config(&config)?;
    tracing::info!(locale = %locale, archive_dir = %storage.root().display(), "配置加载完成");

    // 映射注册表
    let mappings = MappingRepository::new(conn.clone()).list_all()?;
    tracing::info!(mappings = mappings.len(), "映射已加载");
    let registry = MappingRegistry::from_mappings(mappings);

    // 导入
    let importer = CsvImporterImpl::with_sqlite(conn, storage, registry);
    let reports = if archive_ids.is_empty() {
        importer.import_drafts()?
    } else {
        importer.import(&archive_ids)?
    };

    if reports.is_empty() {
        println!("没有待导入的档案");
    }
    for report in &reports {
        println!(
            "archive={} state={} groups={} done={} errors={} import_id={}",
            report.archive_id,
            report.state.as_str(),
            report.groups,
            report.done_count(),
            report.error_count(),
            report.import_id
        );
    }

    Ok(())
}
