// ==========================================
// CSV 导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use std::error::Error;
use std::path::PathBuf;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait ImportConfigReader: Send + Sync {
    // ===== 存储配置 =====

    /// 获取数据根目录
    ///
    /// # 优先级
    /// 1. 环境变量 CSV_IMPORT_DATA_PATH
    /// 2. config_kv: csv_import/data_path
    /// 3. dirs::data_dir()/csv-import
    fn get_data_path(&self) -> Result<PathBuf, Box<dyn Error>>;

    /// 获取档案载荷目录（<data_path>/csv_import）
    fn get_archive_dir(&self) -> Result<PathBuf, Box<dyn Error>> {
        Ok(self.get_data_path()?.join("csv_import"))
    }

    // ===== 消息配置 =====

    /// 获取日志消息语言
    ///
    /// # 默认值
    /// - "en"
    fn get_locale(&self) -> Result<String, Box<dyn Error>>;
}
