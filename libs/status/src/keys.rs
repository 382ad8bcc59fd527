//! Status report keys understood by the parser.

pub const RDB_BGSAVE_IN_PROGRESS: &str = "rdb_bgsave_in_progress";
pub const RDB_CURRENT_BGSAVE_TIME_SEC: &str = "rdb_current_bgsave_time_sec";
pub const AOF_ENABLED: &str = "aof_enabled";
pub const AOF_REWRITE_IN_PROGRESS: &str = "aof_rewrite_in_progress";
pub const AOF_REWRITE_SCHEDULED: &str = "aof_rewrite_scheduled";
pub const AOF_CURRENT_REWRITE_TIME_SEC: &str = "aof_current_rewrite_time_sec";
pub const AOF_CURRENT_SIZE: &str = "aof_current_size";
pub const AOF_BASE_SIZE: &str = "aof_base_size";
