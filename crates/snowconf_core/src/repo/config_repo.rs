//! Config repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and scoped queries over `config_items`.
//! - Translate unique-key violations into `RepoError::Duplicate`.
//!
//! # Invariants
//! - Write paths call `ConfigItem::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Ids are stored as non-negative SQLite integers.

use crate::db::DbError;
use crate::model::config_item::{ConfigId, ConfigItem, ConfigValidationError, DataType};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONFIG_SELECT_SQL: &str = "SELECT
    id,
    app_name,
    environment,
    config_key,
    config_value,
    description,
    data_type,
    is_active,
    created_by,
    updated_by,
    created_at,
    updated_at,
    version
FROM config_items";

const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for config persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ConfigValidationError),
    Db(DbError),
    NotFound(ConfigId),
    /// Another row already owns this `(app_name, environment, config_key)`.
    Duplicate {
        app_name: String,
        environment: String,
        config_key: String,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "config item not found: {id}"),
            Self::Duplicate {
                app_name,
                environment,
                config_key,
            } => write!(
                f,
                "config key already exists: {app_name}/{environment}/{config_key}"
            ),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted config data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::NotFound(_) | Self::Duplicate { .. } | Self::InvalidData(_) => None,
        }
    }
}

impl From<ConfigValidationError> for RepoError {
    fn from(value: ConfigValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Filter and pagination options for listing config items.
#[derive(Debug, Clone, Default)]
pub struct ConfigListQuery {
    pub app_name: Option<String>,
    pub environment: Option<String>,
    /// Skip items with `is_active = false`.
    pub active_only: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for config item storage.
pub trait ConfigRepository {
    fn insert(&self, item: &ConfigItem) -> RepoResult<ConfigId>;
    fn update(&self, item: &ConfigItem) -> RepoResult<()>;
    fn get_by_id(&self, id: ConfigId) -> RepoResult<Option<ConfigItem>>;
    fn find_by_key(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> RepoResult<Option<ConfigItem>>;
    fn list(&self, query: &ConfigListQuery) -> RepoResult<Vec<ConfigItem>>;
    fn count(&self, app_name: &str, environment: &str) -> RepoResult<u64>;
    fn delete_by_id(&self, id: ConfigId) -> RepoResult<()>;
    /// Returns whether a row was deleted.
    fn delete_by_key(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> RepoResult<bool>;
}

/// SQLite-backed config repository.
pub struct SqliteConfigRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteConfigRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ConfigRepository for SqliteConfigRepository<'_> {
    fn insert(&self, item: &ConfigItem) -> RepoResult<ConfigId> {
        item.validate()?;

        self.conn
            .execute(
                "INSERT INTO config_items (
                    id,
                    app_name,
                    environment,
                    config_key,
                    config_value,
                    description,
                    data_type,
                    is_active,
                    created_by,
                    updated_by,
                    version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    id_to_db(item.id)?,
                    item.app_name.as_str(),
                    item.environment.as_str(),
                    item.config_key.as_str(),
                    item.config_value.as_str(),
                    item.description.as_deref(),
                    item.data_type.as_str(),
                    bool_to_int(item.is_active),
                    item.created_by.as_deref(),
                    item.updated_by.as_deref(),
                    item.version,
                ],
            )
            .map_err(|err| map_unique_violation(err, item))?;

        Ok(item.id)
    }

    fn update(&self, item: &ConfigItem) -> RepoResult<()> {
        item.validate()?;

        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE config_items
                     SET
                        app_name = ?1,
                        environment = ?2,
                        config_key = ?3,
                        config_value = ?4,
                        description = ?5,
                        data_type = ?6,
                        is_active = ?7,
                        updated_by = ?8,
                        version = ?9,
                        updated_at = {NOW_MS_SQL}
                     WHERE id = ?10;"
                ),
                params![
                    item.app_name.as_str(),
                    item.environment.as_str(),
                    item.config_key.as_str(),
                    item.config_value.as_str(),
                    item.description.as_deref(),
                    item.data_type.as_str(),
                    bool_to_int(item.is_active),
                    item.updated_by.as_deref(),
                    item.version,
                    id_to_db(item.id)?,
                ],
            )
            .map_err(|err| map_unique_violation(err, item))?;

        if changed == 0 {
            return Err(RepoError::NotFound(item.id));
        }

        Ok(())
    }

    fn get_by_id(&self, id: ConfigId) -> RepoResult<Option<ConfigItem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONFIG_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id_to_db(id)?])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_config_row(row)?));
        }
        Ok(None)
    }

    fn find_by_key(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> RepoResult<Option<ConfigItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CONFIG_SELECT_SQL}
             WHERE app_name = ?1
               AND environment = ?2
               AND config_key = ?3;"
        ))?;
        let mut rows = stmt.query(params![app_name, environment, config_key])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_config_row(row)?));
        }
        Ok(None)
    }

    fn list(&self, query: &ConfigListQuery) -> RepoResult<Vec<ConfigItem>> {
        let mut sql = format!("{CONFIG_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(app_name) = &query.app_name {
            sql.push_str(" AND app_name = ?");
            bind_values.push(Value::Text(app_name.clone()));
        }
        if let Some(environment) = &query.environment {
            sql.push_str(" AND environment = ?");
            bind_values.push(Value::Text(environment.clone()));
        }
        if query.active_only {
            sql.push_str(" AND is_active = 1");
        }

        sql.push_str(" ORDER BY config_key ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_config_row(row)?);
        }
        Ok(items)
    }

    fn count(&self, app_name: &str, environment: &str) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM config_items WHERE app_name = ?1 AND environment = ?2;",
            params![app_name, environment],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count `{count}`")))
    }

    fn delete_by_id(&self, id: ConfigId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM config_items WHERE id = ?1;", [id_to_db(id)?])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn delete_by_key(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM config_items
             WHERE app_name = ?1
               AND environment = ?2
               AND config_key = ?3;",
            params![app_name, environment, config_key],
        )?;
        Ok(changed > 0)
    }
}

fn map_unique_violation(err: rusqlite::Error, item: &ConfigItem) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation
            && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return RepoError::Duplicate {
                app_name: item.app_name.clone(),
                environment: item.environment.clone(),
                config_key: item.config_key.clone(),
            };
        }
    }
    err.into()
}

fn parse_config_row(row: &Row<'_>) -> RepoResult<ConfigItem> {
    let raw_id: i64 = row.get("id")?;
    let id = ConfigId::try_from(raw_id).map_err(|_| {
        RepoError::InvalidData(format!("invalid id value `{raw_id}` in config_items.id"))
    })?;

    let type_text: String = row.get("data_type")?;
    let data_type = type_text.parse::<DataType>().map_err(|_| {
        RepoError::InvalidData(format!("invalid data type `{type_text}` in config_items.data_type"))
    })?;

    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in config_items.is_active"
            )));
        }
    };

    let raw_version: i64 = row.get("version")?;
    let version = u32::try_from(raw_version)
        .ok()
        .filter(|version| *version >= 1)
        .ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid version `{raw_version}` in config_items.version"
            ))
        })?;

    let item = ConfigItem {
        id,
        app_name: row.get("app_name")?,
        environment: row.get("environment")?,
        config_key: row.get("config_key")?,
        config_value: row.get("config_value")?,
        description: row.get("description")?,
        data_type,
        is_active,
        created_by: row.get("created_by")?,
        updated_by: row.get("updated_by")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        version,
    };
    item.validate()?;
    Ok(item)
}

fn id_to_db(id: ConfigId) -> RepoResult<i64> {
    i64::try_from(id)
        .map_err(|_| RepoError::InvalidData(format!("config id {id} exceeds storage range")))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
