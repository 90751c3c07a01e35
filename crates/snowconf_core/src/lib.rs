//! Core of the SnowConf configuration store.
//!
//! Holds the Snowflake-style id generator that mints primary keys, and the
//! SQLite-backed config repository and service built on top of it.

pub mod db;
pub mod id;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use id::{
    generate_id, global_generator, init_global_generator, parse_id, Clock, IdError, IdGenerator,
    IdInfo, IdResult, IdSource, SystemClock,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::config_item::{ConfigId, ConfigItem, ConfigValidationError, DataType};
pub use repo::config_repo::{
    ConfigListQuery, ConfigRepository, RepoError, RepoResult, SqliteConfigRepository,
};
pub use service::config_service::{
    ConfigPage, ConfigService, ServiceError, ServiceResult, SetConfigRequest,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
