// ==========================================
// CSV 导入引擎 - 配置层
// ==========================================
// 职责: 系统配置管理（数据目录、消息语言）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, default_data_path, default_db_path, ConfigManager};
pub use import_config_trait::ImportConfigReader;
