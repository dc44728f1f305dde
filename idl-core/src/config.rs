#![forbid(unsafe_code)]

//! Architecture configuration as seen by the symbol table.
//!
//! Loading and merging architecture YAML happens elsewhere; by the time a
//! configuration reaches this crate it is a flat list of parameters with JSON
//! schemas and, for pinned parameters, JSON values.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::error::IdlError;
use crate::pool::PoolOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKind {
    #[serde(rename = "unconfigured")]
    Unconfigured,
    #[serde(rename = "partially configured")]
    PartiallyConfigured,
    #[serde(rename = "fully configured")]
    FullyConfigured,
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigKind::Unconfigured => "unconfigured",
            ConfigKind::PartiallyConfigured => "partially configured",
            ConfigKind::FullyConfigured => "fully configured",
        })
    }
}

/// Whether an extension is known to be present in a configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtensionState {
    Implemented,
    NotImplemented,
    Unknown,
}

impl ExtensionState {
    pub fn known(self) -> Option<bool> {
        match self {
            ExtensionState::Implemented => Some(true),
            ExtensionState::NotImplemented => Some(false),
            ExtensionState::Unknown => None,
        }
    }
}

/// A parameter pinned to a single value.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamWithValue {
    pub name: String,
    pub schema: JsonValue,
    pub value: JsonValue,
    pub defined_by: Vec<String>,
}

/// A parameter whose value is still free.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamWithoutValue {
    pub name: String,
    pub schema: JsonValue,
    /// Number of extensions declaring the parameter.
    pub extension_count: usize,
}

/// The configuration interface the symbol table is built from.
pub trait ArchConfig: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ConfigKind;

    fn unconfigured(&self) -> bool {
        self.kind() == ConfigKind::Unconfigured
    }

    fn partially_configured(&self) -> bool {
        self.kind() == ConfigKind::PartiallyConfigured
    }

    fn fully_configured(&self) -> bool {
        self.kind() == ConfigKind::FullyConfigured
    }

    /// Machine register width, when the configuration pins it.
    fn mxlen(&self) -> Option<u32>;

    fn params_with_value(&self) -> Vec<ParamWithValue>;

    fn params_without_value(&self) -> Vec<ParamWithoutValue>;

    fn extension_state(&self, extension: &str) -> ExtensionState;

    /// Every extension name the configuration mentions, in a stable order.
    fn known_extensions(&self) -> Vec<String>;

    /// Identity used to tell configurations apart without comparing them.
    fn content_hash(&self) -> String;

    fn pool_options(&self) -> PoolOptions {
        PoolOptions::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub schema: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub defined_by: Vec<String>,
}

/// A configuration read from JSON.
///
/// ```json
/// {
///   "name": "rv32",
///   "type": "fully configured",
///   "mxlen": 32,
///   "implemented_extensions": ["I", "Zicsr"],
///   "params": [
///     { "name": "XLEN", "schema": { "type": "integer", "enum": [32, 64] },
///       "value": 32, "defined_by": ["I"] }
///   ]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConfigKind,
    #[serde(default)]
    pub mxlen: Option<u32>,
    #[serde(default)]
    pub implemented_extensions: Vec<String>,
    #[serde(default)]
    pub prohibited_extensions: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    #[serde(default)]
    pub pool: PoolOptions,
}

impl Config {
    pub fn from_json_str(text: &str) -> Result<Self, IdlError> {
        let config: Config = serde_json::from_str(text).map_err(|e| IdlError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn unconfigured(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ConfigKind::Unconfigured,
            mxlen: None,
            implemented_extensions: Vec::new(),
            prohibited_extensions: Vec::new(),
            params: Vec::new(),
            pool: PoolOptions::default(),
        }
    }

    fn validate(&self) -> Result<(), IdlError> {
        match self.mxlen {
            None | Some(32) | Some(64) => {}
            Some(other) => {
                return Err(IdlError::InvalidConfig {
                    message: format!("mxlen must be 32 or 64, got {other}"),
                });
            }
        }
        if self.kind == ConfigKind::Unconfigured && self.params.iter().any(|p| p.value.is_some()) {
            return Err(IdlError::InvalidConfig {
                message: format!("unconfigured config `{}` pins parameter values", self.name),
            });
        }
        if let Some(ext) = self
            .implemented_extensions
            .iter()
            .find(|e| self.prohibited_extensions.contains(e))
        {
            return Err(IdlError::InvalidConfig {
                message: format!("extension `{ext}` is both implemented and prohibited"),
            });
        }
        if self.pool.initial == 0 || self.pool.growth == 0 {
            return Err(IdlError::InvalidConfig {
                message: "pool sizes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl ArchConfig for Config {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConfigKind {
        self.kind
    }

    fn mxlen(&self) -> Option<u32> {
        match self.kind {
            ConfigKind::Unconfigured => None,
            _ => self.mxlen,
        }
    }

    fn params_with_value(&self) -> Vec<ParamWithValue> {
        self.params
            .iter()
            .filter_map(|p| {
                p.value.as_ref().map(|value| ParamWithValue {
                    name: p.name.clone(),
                    schema: p.schema.clone(),
                    value: value.clone(),
                    defined_by: p.defined_by.clone(),
                })
            })
            .collect()
    }

    fn params_without_value(&self) -> Vec<ParamWithoutValue> {
        self.params
            .iter()
            .filter(|p| p.value.is_none())
            .map(|p| ParamWithoutValue {
                name: p.name.clone(),
                schema: p.schema.clone(),
                extension_count: p.defined_by.len(),
            })
            .collect()
    }

    fn extension_state(&self, extension: &str) -> ExtensionState {
        let listed = |list: &[String]| list.iter().any(|e| e == extension);
        match self.kind {
            ConfigKind::Unconfigured => ExtensionState::Unknown,
            _ if listed(&self.implemented_extensions) => ExtensionState::Implemented,
            _ if listed(&self.prohibited_extensions) => ExtensionState::NotImplemented,
            ConfigKind::FullyConfigured => ExtensionState::NotImplemented,
            ConfigKind::PartiallyConfigured => ExtensionState::Unknown,
        }
    }

    fn known_extensions(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .implemented_extensions
            .iter()
            .chain(&self.prohibited_extensions)
            .cloned()
            .collect();
        for param in &self.params {
            names.extend(param.defined_by.iter().cloned());
        }
        names.into_iter().collect()
    }

    fn content_hash(&self) -> String {
        // serde_json keeps struct field order, so the encoding is stable.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    fn pool_options(&self) -> PoolOptions {
        self.pool
    }
}
