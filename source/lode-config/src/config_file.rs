//! Logical models for `lode.yaml` and `lode.work.yaml`.
//!
//! Parsing is two-pass: the version header is decoded first, then the rest
//! of the document is decoded strictly against that version's shape.

use std::collections::BTreeMap;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::error::ParseError;
use crate::name::FullName;
use crate::reference::Reference;

pub const CONFIG_FILE_NAME: &str = "lode.yaml";
pub const WORK_FILE_NAME: &str = "lode.work.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFileVersion {
    V1Beta1,
    V1,
    V2,
}

impl ConfigFileVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1Beta1 => "v1beta1",
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum ConfigFileError {
    #[error("unknown configuration file version {version:?}")]
    UnknownVersion { version: String },

    #[error("malformed configuration file: {message}")]
    Malformed { message: String },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Lint or breaking-change rule selection for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckConfig {
    #[serde(rename = "use", default)]
    pub use_ids: Vec<String>,
    #[serde(default)]
    pub except: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// One module named by a `lode.yaml`, rooted at `path` relative to the
/// file's directory (`.` for a v1 file, which describes a single module).
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub path: String,
    pub name: Option<FullName>,
    pub lint: CheckConfig,
    pub breaking: CheckConfig,
}

/// The logical content of a `lode.yaml`, any version.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    version: ConfigFileVersion,
    modules: Vec<ModuleEntry>,
    deps: Vec<Reference>,
    plugins: Vec<Reference>,
    policies: Vec<Reference>,
    policy_plugins: BTreeMap<String, Vec<Reference>>,
}

impl ConfigFile {
    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigFileError> {
        let header: VersionHeader = serde_yaml::from_slice(data).map_err(malformed)?;
        match header.version.as_str() {
            "v1beta1" => Self::from_v1(data, ConfigFileVersion::V1Beta1),
            "v1" => Self::from_v1(data, ConfigFileVersion::V1),
            "v2" => Self::from_v2(data),
            other => Err(ConfigFileError::UnknownVersion {
                version: other.to_owned(),
            }),
        }
    }

    fn from_v1(data: &[u8], version: ConfigFileVersion) -> Result<Self, ConfigFileError> {
        let external: ExternalConfigV1 = serde_yaml::from_slice(data).map_err(malformed)?;
        let name = external
            .name
            .map(|n| FullName::parse(&n))
            .transpose()?;
        let deps = parse_refs(external.deps)?;
        Ok(Self {
            version,
            modules: vec![ModuleEntry {
                path: ".".to_owned(),
                name,
                lint: external.lint,
                breaking: external.breaking,
            }],
            deps,
            plugins: Vec::new(),
            policies: Vec::new(),
            policy_plugins: BTreeMap::new(),
        })
    }

    fn from_v2(data: &[u8]) -> Result<Self, ConfigFileError> {
        let external: ExternalConfigV2 = serde_yaml::from_slice(data).map_err(malformed)?;
        let mut modules = Vec::with_capacity(external.modules.len());
        for module in external.modules {
            modules.push(ModuleEntry {
                path: module.path,
                name: module.name.map(|n| FullName::parse(&n)).transpose()?,
                lint: module.lint.unwrap_or_else(|| external.lint.clone()),
                breaking: module.breaking.unwrap_or_else(|| external.breaking.clone()),
            });
        }
        let mut policy_plugins = BTreeMap::new();
        for (policy, refs) in external.policy_plugins {
            FullName::parse(&policy)?;
            policy_plugins.insert(policy, parse_refs(refs)?);
        }
        Ok(Self {
            version: ConfigFileVersion::V2,
            modules,
            deps: parse_refs(external.deps)?,
            plugins: parse_refs(external.plugins)?,
            policies: parse_refs(external.policies)?,
            policy_plugins,
        })
    }

    pub fn version(&self) -> ConfigFileVersion {
        self.version
    }

    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    /// Configured remote module dependencies, deduplicated by full name.
    pub fn deps(&self) -> &[Reference] {
        &self.deps
    }

    pub fn plugins(&self) -> &[Reference] {
        &self.plugins
    }

    pub fn policies(&self) -> &[Reference] {
        &self.policies
    }

    /// Locally configured policy full name to plugin refs.
    pub fn policy_plugins(&self) -> &BTreeMap<String, Vec<Reference>> {
        &self.policy_plugins
    }
}

/// The logical content of a `lode.work.yaml`: the module directories making
/// up a v1 multi-module workspace.
#[derive(Debug, Clone)]
pub struct WorkFile {
    directories: Vec<String>,
}

impl WorkFile {
    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigFileError> {
        let header: VersionHeader = serde_yaml::from_slice(data).map_err(malformed)?;
        if header.version != "v1" {
            return Err(ConfigFileError::UnknownVersion {
                version: header.version,
            });
        }
        let external: ExternalWorkFile = serde_yaml::from_slice(data).map_err(malformed)?;
        Ok(Self {
            directories: external.directories,
        })
    }

    pub fn directories(&self) -> &[String] {
        &self.directories
    }
}

fn malformed(e: serde_yaml::Error) -> ConfigFileError {
    ConfigFileError::Malformed {
        message: e.to_string(),
    }
}

/// Parses and dedups by full name, first occurrence winning.
fn parse_refs(raw: Vec<String>) -> Result<Vec<Reference>, ConfigFileError> {
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::with_capacity(raw.len());
    for s in raw {
        let reference = Reference::parse(&s)?;
        if seen.insert(reference.full_name().clone()) {
            refs.push(reference);
        }
    }
    Ok(refs)
}

#[derive(Deserialize)]
struct VersionHeader {
    version: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalConfigV1 {
    #[allow(unused)]
    version: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    lint: CheckConfig,
    #[serde(default)]
    breaking: CheckConfig,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalConfigV2 {
    #[allow(unused)]
    version: String,
    #[serde(default)]
    modules: Vec<ExternalModuleV2>,
    #[serde(default)]
    deps: Vec<String>,
    #[serde(default)]
    plugins: Vec<String>,
    #[serde(default)]
    policies: Vec<String>,
    #[serde(rename = "policy-plugins", default)]
    policy_plugins: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    lint: CheckConfig,
    #[serde(default)]
    breaking: CheckConfig,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalModuleV2 {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    lint: Option<CheckConfig>,
    #[serde(default)]
    breaking: Option<CheckConfig>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalWorkFile {
    #[allow(unused)]
    version: String,
    directories: Vec<String>,
}
