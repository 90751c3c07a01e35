//! Config store use-case service.
//!
//! # Responsibility
//! - Provide create/update/upsert/lookup/delete entry points for callers.
//! - Mint primary keys for new items through an injected `IdSource`.
//! - Project active items into typed value maps.
//!
//! # Invariants
//! - A failed id mint fails the write; nothing is stored.
//! - Ids are only minted after request validation passes.
//! - Every successful update bumps `version` by exactly one.
//! - Logs carry scope metadata only, never config values.

use crate::id::{global_generator, IdError, IdGenerator, IdSource};
use crate::model::config_item::{
    validate_config_key, validate_scope_name, ConfigId, ConfigItem, ConfigValidationError, DataType,
};
use crate::repo::config_repo::{ConfigListQuery, ConfigRepository, RepoError};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Largest page size accepted by `configs_page`.
pub const MAX_PAGE_SIZE: u32 = 100;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for config use-cases.
#[derive(Debug)]
pub enum ServiceError {
    Validation(ConfigValidationError),
    NotFound(String),
    AlreadyExists(String),
    /// Id generator refused to mint (clock rollback).
    IdGeneration(IdError),
    Repo(RepoError),
    /// Write succeeded but the row could not be read back.
    InconsistentState(&'static str),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(what) => write!(f, "config not found: {what}"),
            Self::AlreadyExists(what) => write!(f, "config already exists: {what}"),
            Self::IdGeneration(err) => write!(f, "id generation failed: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent config state: {details}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::IdGeneration(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigValidationError> for ServiceError {
    fn from(value: ConfigValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<IdError> for ServiceError {
    fn from(value: IdError) -> Self {
        Self::IdGeneration(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(id) => Self::NotFound(format!("id {id}")),
            RepoError::Duplicate {
                app_name,
                environment,
                config_key,
            } => Self::AlreadyExists(format!("{app_name}/{environment}/{config_key}")),
            other => Self::Repo(other),
        }
    }
}

/// Write request for one config item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetConfigRequest {
    pub app_name: String,
    pub environment: String,
    pub config_key: String,
    pub config_value: String,
    pub description: Option<String>,
    pub data_type: DataType,
    pub is_active: bool,
    /// Recorded as `created_by`/`updated_by`.
    pub operator: Option<String>,
}

impl SetConfigRequest {
    /// Builds an active `string` request without description or operator.
    pub fn new(
        app_name: impl Into<String>,
        environment: impl Into<String>,
        config_key: impl Into<String>,
        config_value: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            environment: environment.into(),
            config_key: config_key.into(),
            config_value: config_value.into(),
            description: None,
            data_type: DataType::String,
            is_active: true,
            operator: None,
        }
    }

    fn validate(&self) -> Result<(), ConfigValidationError> {
        validate_scope_name("app_name", &self.app_name)?;
        validate_scope_name("environment", &self.environment)?;
        validate_config_key(&self.config_key)
    }

    fn scope(&self) -> String {
        format!("{}/{}/{}", self.app_name, self.environment, self.config_key)
    }
}

/// One page of config items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigPage {
    pub items: Vec<ConfigItem>,
    pub total: u64,
    /// 1-based page number actually served.
    pub page: u32,
    /// Page size actually applied.
    pub size: u32,
    pub total_pages: u64,
}

/// Use-case service over a config repository.
pub struct ConfigService<R: ConfigRepository, I: IdSource = &'static IdGenerator> {
    repo: R,
    ids: I,
}

impl<R: ConfigRepository> ConfigService<R> {
    /// Creates a service minting ids from the process-wide generator.
    pub fn with_global_ids(repo: R) -> Self {
        Self::new(repo, global_generator())
    }
}

impl<R: ConfigRepository, I: IdSource> ConfigService<R, I> {
    pub fn new(repo: R, ids: I) -> Self {
        Self { repo, ids }
    }

    /// Inserts a new item; fails with `AlreadyExists` when the key is taken.
    pub fn create_config(&self, request: &SetConfigRequest) -> ServiceResult<ConfigItem> {
        request.validate()?;
        if self
            .repo
            .find_by_key(&request.app_name, &request.environment, &request.config_key)?
            .is_some()
        {
            return Err(ServiceError::AlreadyExists(request.scope()));
        }
        self.insert_new(request)
    }

    /// Replaces all fields of item `id` with `request`.
    ///
    /// # Errors
    /// - `NotFound` when `id` does not exist.
    /// - `AlreadyExists` when the requested key belongs to another item.
    pub fn update_config(
        &self,
        id: ConfigId,
        request: &SetConfigRequest,
    ) -> ServiceResult<ConfigItem> {
        request.validate()?;
        let existing = self
            .repo
            .get_by_id(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("id {id}")))?;

        if let Some(other) = self
            .repo
            .find_by_key(&request.app_name, &request.environment, &request.config_key)?
        {
            if other.id != id {
                return Err(ServiceError::AlreadyExists(request.scope()));
            }
        }

        let mut item = existing;
        item.app_name = request.app_name.clone();
        item.environment = request.environment.clone();
        item.config_key = request.config_key.clone();
        self.apply_update(item, request)
    }

    /// Inserts the item when its key is new, otherwise updates it in place.
    pub fn set_config(&self, request: &SetConfigRequest) -> ServiceResult<ConfigItem> {
        request.validate()?;
        match self
            .repo
            .find_by_key(&request.app_name, &request.environment, &request.config_key)?
        {
            Some(existing) => self.apply_update(existing, request),
            None => self.insert_new(request),
        }
    }

    pub fn get_config(&self, id: ConfigId) -> ServiceResult<ConfigItem> {
        debug!("event=config_get module=service id={id}");
        self.repo
            .get_by_id(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("id {id}")))
    }

    /// Returns the active item for a key, or `None`.
    pub fn get_config_by_key(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> ServiceResult<Option<ConfigItem>> {
        let item = self.repo.find_by_key(app_name, environment, config_key)?;
        Ok(item.filter(|item| item.is_active))
    }

    /// Returns the raw value of an active item.
    ///
    /// Missing and inactive items both report `NotFound`.
    pub fn get_config_value(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> ServiceResult<String> {
        let scope = format!("{app_name}/{environment}/{config_key}");
        self.get_config_by_key(app_name, environment, config_key)?
            .map(|item| item.config_value)
            .ok_or(ServiceError::NotFound(scope))
    }

    /// Physically deletes the item with this key.
    pub fn delete_config(
        &self,
        app_name: &str,
        environment: &str,
        config_key: &str,
    ) -> ServiceResult<()> {
        if !self.repo.delete_by_key(app_name, environment, config_key)? {
            return Err(ServiceError::NotFound(format!("{app_name}/{environment}/{config_key}")));
        }
        info!(
            "event=config_delete module=service status=ok app={} env={} key={}",
            app_name, environment, config_key
        );
        Ok(())
    }

    pub fn delete_config_by_id(&self, id: ConfigId) -> ServiceResult<()> {
        self.repo.delete_by_id(id)?;
        info!("event=config_delete module=service status=ok id={id}");
        Ok(())
    }

    /// Active items of one application environment, ordered by key.
    pub fn app_configs(&self, app_name: &str, environment: &str) -> ServiceResult<Vec<ConfigItem>> {
        Ok(self.repo.list(&ConfigListQuery {
            app_name: Some(app_name.to_string()),
            environment: Some(environment.to_string()),
            active_only: true,
            ..ConfigListQuery::default()
        })?)
    }

    /// Active items as `key -> typed value`.
    ///
    /// Values that do not parse as their declared type are returned as
    /// strings.
    pub fn app_configs_as_map(
        &self,
        app_name: &str,
        environment: &str,
    ) -> ServiceResult<BTreeMap<String, Value>> {
        let mut map = BTreeMap::new();
        for item in self.app_configs(app_name, environment)? {
            let value = match item.typed_value() {
                Some(value) => value,
                None => {
                    warn!(
                        "event=config_convert module=service status=fallback app={} env={} key={} data_type={}",
                        item.app_name, item.environment, item.config_key, item.data_type
                    );
                    Value::String(item.config_value)
                }
            };
            map.insert(item.config_key, value);
        }
        Ok(map)
    }

    /// Upserts many values of one application environment.
    ///
    /// Existing items keep their data type; new items are `string`.
    pub fn batch_set<K, V>(
        &self,
        app_name: &str,
        environment: &str,
        entries: impl IntoIterator<Item = (K, V)>,
        operator: Option<&str>,
    ) -> ServiceResult<Vec<ConfigItem>>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut results = Vec::new();
        for (key, value) in entries {
            let mut request = SetConfigRequest::new(app_name, environment, key, value);
            request.operator = operator.map(str::to_string);
            request.validate()?;

            let item = match self
                .repo
                .find_by_key(app_name, environment, &request.config_key)?
            {
                Some(existing) => {
                    request.data_type = existing.data_type;
                    request.description = existing.description.clone();
                    request.is_active = existing.is_active;
                    self.apply_update(existing, &request)?
                }
                None => self.insert_new(&request)?,
            };
            results.push(item);
        }

        info!(
            "event=config_batch_set module=service status=ok app={} env={} count={}",
            app_name,
            environment,
            results.len()
        );
        Ok(results)
    }

    /// Copies items of `source_env` that are missing in `target_env`.
    ///
    /// Copies get fresh ids and start at version 1. Returns the created
    /// items only.
    ///
    /// # Errors
    /// - `NotFound` when `source_env` has no items.
    pub fn copy_environment(
        &self,
        app_name: &str,
        source_env: &str,
        target_env: &str,
        operator: Option<&str>,
    ) -> ServiceResult<Vec<ConfigItem>> {
        validate_scope_name("environment", target_env)?;
        let sources = self.repo.list(&ConfigListQuery {
            app_name: Some(app_name.to_string()),
            environment: Some(source_env.to_string()),
            ..ConfigListQuery::default()
        })?;
        if sources.is_empty() {
            return Err(ServiceError::NotFound(format!("{app_name}/{source_env}")));
        }

        let mut created = Vec::new();
        for source in sources {
            if self
                .repo
                .find_by_key(app_name, target_env, &source.config_key)?
                .is_some()
            {
                continue;
            }
            let request = SetConfigRequest {
                app_name: source.app_name,
                environment: target_env.to_string(),
                config_key: source.config_key,
                config_value: source.config_value,
                description: source.description,
                data_type: source.data_type,
                is_active: source.is_active,
                operator: operator.map(str::to_string),
            };
            created.push(self.insert_new(&request)?);
        }

        info!(
            "event=config_copy_env module=service status=ok app={} source_env={} target_env={} created={}",
            app_name,
            source_env,
            target_env,
            created.len()
        );
        Ok(created)
    }

    /// Pages through all items (active or not) of one application environment.
    ///
    /// `page` is 1-based; `0` is served as page 1. `size` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn configs_page(
        &self,
        app_name: &str,
        environment: &str,
        page: u32,
        size: u32,
    ) -> ServiceResult<ConfigPage> {
        let page = page.max(1);
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let total = self.repo.count(app_name, environment)?;
        let items = self.repo.list(&ConfigListQuery {
            app_name: Some(app_name.to_string()),
            environment: Some(environment.to_string()),
            active_only: false,
            limit: Some(size),
            offset: (page - 1).saturating_mul(size),
        })?;

        Ok(ConfigPage {
            items,
            total,
            page,
            size,
            total_pages: total.div_ceil(u64::from(size)),
        })
    }

    fn insert_new(&self, request: &SetConfigRequest) -> ServiceResult<ConfigItem> {
        let id = self.ids.next_id().map_err(|err| {
            error!(
                "event=config_insert module=service status=error error_code=id_generation_failed app={} env={} key={} error={}",
                request.app_name, request.environment, request.config_key, err
            );
            ServiceError::IdGeneration(err)
        })?;

        let mut item = ConfigItem::new(
            id,
            request.app_name.as_str(),
            request.environment.as_str(),
            request.config_key.as_str(),
            request.config_value.as_str(),
        );
        item.description = request.description.clone();
        item.data_type = request.data_type;
        item.is_active = request.is_active;
        item.created_by = request.operator.clone();
        item.updated_by = request.operator.clone();

        self.repo.insert(&item)?;
        info!(
            "event=config_insert module=service status=ok id={} app={} env={} key={}",
            id, item.app_name, item.environment, item.config_key
        );

        self.repo
            .get_by_id(id)?
            .ok_or(ServiceError::InconsistentState("inserted item is missing"))
    }

    fn apply_update(
        &self,
        mut item: ConfigItem,
        request: &SetConfigRequest,
    ) -> ServiceResult<ConfigItem> {
        item.config_value = request.config_value.clone();
        item.description = request.description.clone();
        item.data_type = request.data_type;
        item.is_active = request.is_active;
        item.updated_by = request.operator.clone();
        item.version = item.version.saturating_add(1);

        self.repo.update(&item)?;
        info!(
            "event=config_update module=service status=ok id={} app={} env={} key={} version={}",
            item.id, item.app_name, item.environment, item.config_key, item.version
        );

        self.repo
            .get_by_id(item.id)?
            .ok_or(ServiceError::InconsistentState("updated item is missing"))
    }
}
