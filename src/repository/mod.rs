// ==========================================
// CSV 导入引擎 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 红线: Repository 不含导入业务逻辑
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod archive_repo;
pub mod archive_storage;
pub mod error;
pub mod mapping_repo;
pub mod profile_repo;
pub mod record_store;
pub mod record_store_impl;

// 重导出核心仓储
pub use archive_repo::ArchiveRepository;
pub use archive_storage::ArchiveStorage;
pub use error::{RepositoryError, RepositoryResult};
pub use mapping_repo::MappingRepository;
pub use profile_repo::ProfileRepository;
pub use record_store::{RecordStore, SearchDomain};
pub use record_store_impl::SqliteRecordStore;
