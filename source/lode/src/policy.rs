//! Policies: a YAML document bundling check plugins with lint/breaking
//! settings.

use std::sync::OnceLock;

use bytes::Bytes;
use lode_config::config_file::CheckConfig;
use lode_config::{CommitId, Digest, DigestType, FullName, Reference};
use serde::Deserialize;

use crate::cas::digest_for_bytes;
use crate::entity::{Entity, EntitySet};
use crate::error::{Error, Result};

/// The parsed logical content of a policy document.
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub lint: CheckConfig,
    pub breaking: CheckConfig,
    pub plugins: Vec<Reference>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalPolicyDoc {
    #[allow(unused)]
    version: String,
    #[serde(default)]
    lint: CheckConfig,
    #[serde(default)]
    breaking: CheckConfig,
    #[serde(default)]
    plugins: Vec<ExternalPolicyPlugin>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExternalPolicyPlugin {
    plugin: String,
}

pub fn parse_policy_config(doc: &[u8]) -> Result<PolicyConfig> {
    let external: ExternalPolicyDoc = serde_yaml::from_slice(doc).map_err(|e| {
        Error::Config(lode_config::config_file::ConfigFileError::Malformed {
            message: format!("policy document: {e}"),
        })
    })?;
    let mut plugins = Vec::with_capacity(external.plugins.len());
    for entry in external.plugins {
        plugins.push(Reference::parse(&entry.plugin)?);
    }
    Ok(PolicyConfig {
        lint: external.lint,
        breaking: external.breaking,
        plugins,
    })
}

/// The plugin refs a policy document names.
pub fn parse_plugin_refs(doc: &[u8]) -> Result<Vec<Reference>> {
    Ok(parse_policy_config(doc)?.plugins)
}

#[derive(Debug)]
pub struct Policy {
    opaque_id: String,
    bucket_id: Option<String>,
    full_name: Option<FullName>,
    commit_id: Option<CommitId>,
    is_target: bool,
    doc: Bytes,
    config: PolicyConfig,
    digest: OnceLock<Digest>,
}

impl Policy {
    pub fn new(
        bucket_id: Option<String>,
        full_name: Option<FullName>,
        commit_id: Option<CommitId>,
        is_target: bool,
        doc: Bytes,
    ) -> Result<Self> {
        let opaque_id = match (&full_name, &bucket_id) {
            (Some(full_name), _) => full_name.to_string(),
            (None, Some(bucket_id)) => bucket_id.clone(),
            (None, None) => {
                return Err(Error::system(
                    "policy construction requires a full name or a bucket id",
                ))
            }
        };
        let config = parse_policy_config(&doc)?;
        Ok(Self {
            opaque_id,
            bucket_id,
            full_name,
            commit_id,
            is_target,
            doc,
            config,
            digest: OnceLock::new(),
        })
    }

    pub fn commit_id(&self) -> Option<CommitId> {
        self.commit_id
    }

    pub fn bucket_id(&self) -> Option<&str> {
        self.bucket_id.as_deref()
    }

    pub fn is_target(&self) -> bool {
        self.is_target
    }

    /// The raw YAML document as stored.
    pub fn doc(&self) -> &Bytes {
        &self.doc
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn plugin_refs(&self) -> &[Reference] {
        &self.config.plugins
    }

    /// The `o1` digest of the raw document bytes.
    pub fn digest(&self) -> &Digest {
        self.digest
            .get_or_init(|| digest_for_bytes(DigestType::O1, &self.doc))
    }
}

impl Entity for Policy {
    fn opaque_id(&self) -> &str {
        &self.opaque_id
    }

    fn full_name(&self) -> Option<&FullName> {
        self.full_name.as_ref()
    }
}

pub type PolicySet = EntitySet<Policy>;
