//! Config item domain model.
//!
//! # Responsibility
//! - Define the canonical configuration record and its value types.
//! - Validate naming rules before anything reaches storage.
//!
//! # Invariants
//! - `id` is minted once by the id generator and never reused.
//! - `(app_name, environment, config_key)` identifies at most one item.
//! - `version` starts at 1 and only grows.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Primary key of a config item, minted by `IdGenerator`.
pub type ConfigId = u64;

static SCOPE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,128}$").expect("valid scope name regex"));
static CONFIG_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:/-]{1,256}$").expect("valid config key regex"));

/// Declared type of a config value, used when projecting typed maps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    String,
    Int,
    Long,
    Double,
    Float,
    Boolean,
    Json,
}

impl DataType {
    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }

    /// Converts a raw stored value into a JSON value of this type.
    ///
    /// Blank input is returned as a string for every type. Returns `None`
    /// when the text does not parse as this type.
    pub fn convert(self, raw: &str) -> Option<Value> {
        if raw.trim().is_empty() {
            return Some(Value::String(raw.to_string()));
        }
        let text = raw.trim();
        match self {
            Self::String => Some(Value::String(raw.to_string())),
            Self::Int => text.parse::<i32>().ok().map(Value::from),
            Self::Long => text.parse::<i64>().ok().map(Value::from),
            Self::Double => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            Self::Float => float_number(text).map(Value::Number),
            Self::Boolean => Some(Value::Bool(text.eq_ignore_ascii_case("true"))),
            Self::Json => serde_json::from_str(text).ok(),
        }
    }
}

/// Range-checks `text` as `f32`, keeping the shortest decimal form.
fn float_number(text: &str) -> Option<Number> {
    let value = text.parse::<f32>().ok()?;
    let widened = value.to_string().parse::<f64>().ok()?;
    Number::from_f64(widened)
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ConfigValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "string" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Int),
            "long" => Ok(Self::Long),
            "double" => Ok(Self::Double),
            "float" => Ok(Self::Float),
            "boolean" | "bool" => Ok(Self::Boolean),
            "json" => Ok(Self::Json),
            _ => Err(ConfigValidationError::UnknownDataType(value.to_string())),
        }
    }
}

/// Naming and value rule violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A required field is empty or whitespace.
    Blank(&'static str),
    /// A name contains characters outside the allowed set or is too long.
    InvalidName {
        field: &'static str,
        value: String,
    },
    UnknownDataType(String),
}

impl Display for ConfigValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank(field) => write!(f, "{field} must not be blank"),
            Self::InvalidName { field, value } => {
                write!(f, "invalid {field} `{value}`")
            }
            Self::UnknownDataType(value) => write!(
                f,
                "unsupported data type `{value}`; expected string|int|long|double|float|boolean|json"
            ),
        }
    }
}

impl Error for ConfigValidationError {}

/// Checks an application or environment name.
pub fn validate_scope_name(field: &'static str, value: &str) -> Result<(), ConfigValidationError> {
    if value.trim().is_empty() {
        return Err(ConfigValidationError::Blank(field));
    }
    if !SCOPE_NAME_RE.is_match(value) {
        return Err(ConfigValidationError::InvalidName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Checks a config key.
pub fn validate_config_key(value: &str) -> Result<(), ConfigValidationError> {
    if value.trim().is_empty() {
        return Err(ConfigValidationError::Blank("config_key"));
    }
    if !CONFIG_KEY_RE.is_match(value) {
        return Err(ConfigValidationError::InvalidName {
            field: "config_key",
            value: value.to_string(),
        });
    }
    Ok(())
}

/// One stored configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub id: ConfigId,
    pub app_name: String,
    /// Deployment stage such as `dev`, `test` or `prod`.
    pub environment: String,
    pub config_key: String,
    pub config_value: String,
    pub description: Option<String>,
    pub data_type: DataType,
    /// Inactive items are kept but hidden from value lookups.
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    /// Unix epoch milliseconds, filled by storage.
    pub created_at: i64,
    /// Unix epoch milliseconds, refreshed by storage on every update.
    pub updated_at: i64,
    pub version: u32,
}

impl ConfigItem {
    /// Creates an active `string` item at version 1.
    ///
    /// Timestamps stay `0` until the item is persisted and read back.
    pub fn new(
        id: ConfigId,
        app_name: impl Into<String>,
        environment: impl Into<String>,
        config_key: impl Into<String>,
        config_value: impl Into<String>,
    ) -> Self {
        Self {
            id,
            app_name: app_name.into(),
            environment: environment.into(),
            config_key: config_key.into(),
            config_value: config_value.into(),
            description: None,
            data_type: DataType::String,
            is_active: true,
            created_by: None,
            updated_by: None,
            created_at: 0,
            updated_at: 0,
            version: 1,
        }
    }

    /// Validates naming rules for all scope fields.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        validate_scope_name("app_name", &self.app_name)?;
        validate_scope_name("environment", &self.environment)?;
        validate_config_key(&self.config_key)
    }

    /// Value converted by `data_type`, or `None` when it does not parse.
    pub fn typed_value(&self) -> Option<Value> {
        self.data_type.convert(&self.config_value)
    }
}
