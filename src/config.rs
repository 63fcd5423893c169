use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column headers expected in the uploaded spreadsheets
///
/// This is the single place where spreadsheet header strings live. Every other
/// module reads fields through these named roles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColumnMapping {
    /// Unique employee identifier
    pub id: String,
    /// Identifier of the employee's manager (blank for the root)
    pub parent: String,
    /// Name shown on the chart node
    pub display_name: String,
    /// Job title shown under the name
    pub title: String,
    /// Grade code, joins employees with the grade sheet
    pub grade: String,
    pub salary: String,
    pub salary_floor: String,
    pub salary_ceiling: String,
    /// Field written by the merge stage with the band percentage
    pub calculated: String,
    /// Directorate / department used by the filter sidebar
    pub directorate: String,
    /// Fields listed on the employee detail card, in display order
    pub card_fields: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "Id Contratado".to_string(),
            parent: "ID Gestor".to_string(),
            display_name: "Nome Completo".to_string(),
            title: "Cargo".to_string(),
            grade: "Grade".to_string(),
            salary: "Valor do Salário".to_string(),
            salary_floor: "Inicial".to_string(),
            salary_ceiling: "Valor Máximo".to_string(),
            calculated: "Percentual na Faixa".to_string(),
            directorate: "Diretoria".to_string(),
            card_fields: vec![
                "Nome Completo".to_string(),
                "Cargo".to_string(),
                "Grade".to_string(),
                "Valor do Salário".to_string(),
                "Percentual na Faixa".to_string(),
            ],
        }
    }
}

impl ColumnMapping {
    /// Load a mapping from a JSON file; unspecified roles keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::MappingRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::MappingParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Columns the organogram sheet must have
    pub fn required_org_columns(&self) -> [&str; 3] {
        [self.id.as_str(), self.parent.as_str(), self.display_name.as_str()]
    }

    /// Columns the grade sheet must have
    pub fn required_grade_columns(&self) -> [&str; 3] {
        [
            self.grade.as_str(),
            self.salary_floor.as_str(),
            self.salary_ceiling.as_str(),
        ]
    }

    /// Whether a field holds a monetary amount
    pub fn is_currency_field(&self, field: &str) -> bool {
        field == self.salary || field == self.salary_floor || field == self.salary_ceiling
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("neither ADMIN_PASSWORD nor ADMIN_PASSWORD_HASH is set")]
    MissingAdminSecret,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("failed to read column mapping {path}: {source}")]
    MappingRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse column mapping {path}: {source}")]
    MappingParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How the administrator password is configured
#[derive(Clone, Debug)]
pub enum AdminSecret {
    /// Plain password, hashed at startup
    Password(String),
    /// Pre-computed argon2 PHC string
    Hash(String),
}

/// Server settings read from the environment
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub admin_secret: AdminSecret,
    pub session_ttl_hours: u64,
    /// Directory holding uploaded datasets and the pointer registry
    pub data_dir: PathBuf,
    /// Directory holding the default spreadsheets used before any upload
    pub bundled_data_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Per-file upload limit in bytes
    pub max_upload_bytes: usize,
    pub mapping: ColumnMapping,
}

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 8;
/// Longest accepted session lifetime (one year)
pub const MAX_SESSION_TTL_HOURS: u64 = 365 * 24;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 4_500_000;

impl AppConfig {
    /// Read the configuration from the process environment
    ///
    /// # Errors
    /// * `ConfigError::MissingAdminSecret` if no admin password is configured
    /// * `ConfigError::InvalidValue` if a numeric or address variable does not parse
    /// * Mapping errors if `ORGCHART_MAPPING` points to an unreadable file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let admin_secret = match (lookup("ADMIN_PASSWORD_HASH"), lookup("ADMIN_PASSWORD")) {
            (Some(hash), _) if !hash.trim().is_empty() => AdminSecret::Hash(hash.trim().to_string()),
            (_, Some(password)) if !password.is_empty() => AdminSecret::Password(password),
            _ => return Err(ConfigError::MissingAdminSecret),
        };

        let addr_raw = lookup("ORGCHART_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "ORGCHART_ADDR",
                value: addr_raw.clone(),
            })?;

        let session_ttl_hours: u64 =
            parse_or("SESSION_TTL_HOURS", lookup("SESSION_TTL_HOURS"), DEFAULT_SESSION_TTL_HOURS)?;
        if session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_TTL_HOURS",
                value: session_ttl_hours.to_string(),
            });
        }
        let max_upload_bytes =
            parse_or("MAX_UPLOAD_BYTES", lookup("MAX_UPLOAD_BYTES"), DEFAULT_MAX_UPLOAD_BYTES)?;

        let mapping = match lookup("ORGCHART_MAPPING") {
            Some(path) if !path.trim().is_empty() => ColumnMapping::from_file(path.trim())?,
            _ => ColumnMapping::default(),
        };

        Ok(Self {
            addr,
            admin_secret,
            session_ttl_hours,
            data_dir: lookup("DATA_DIR").unwrap_or_else(|| "database".into()).into(),
            bundled_data_dir: lookup("BUNDLED_DATA_DIR").unwrap_or_else(|| "data".into()).into(),
            static_dir: lookup("STATIC_DIR").unwrap_or_else(|| "static".into()).into(),
            max_upload_bytes,
            mapping,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
