//! Wasm plugins: identity plus a single binary payload.

use std::sync::OnceLock;

use bytes::Bytes;
use lode_config::{CommitId, Digest, DigestType, FullName};

use crate::cas::digest_for_bytes;
use crate::entity::{Entity, EntitySet};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Check,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Check => "check",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "check" => Ok(Self::Check),
            other => Err(Error::UnknownVersion {
                version: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginVisibility {
    Public,
    Private,
}

impl PluginVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(Error::UnknownVersion {
                version: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug)]
pub struct Plugin {
    opaque_id: String,
    bucket_id: Option<String>,
    full_name: Option<FullName>,
    commit_id: Option<CommitId>,
    is_target: bool,
    plugin_type: PluginType,
    visibility: PluginVisibility,
    wasm: Bytes,
    digest: OnceLock<Digest>,
}

impl Plugin {
    pub fn new(
        bucket_id: Option<String>,
        full_name: Option<FullName>,
        commit_id: Option<CommitId>,
        is_target: bool,
        plugin_type: PluginType,
        visibility: PluginVisibility,
        wasm: Bytes,
    ) -> Result<Self> {
        let opaque_id = match (&full_name, &bucket_id) {
            (Some(full_name), _) => full_name.to_string(),
            (None, Some(bucket_id)) => bucket_id.clone(),
            (None, None) => {
                return Err(Error::system(
                    "plugin construction requires a full name or a bucket id",
                ))
            }
        };
        Ok(Self {
            opaque_id,
            bucket_id,
            full_name,
            commit_id,
            is_target,
            plugin_type,
            visibility,
            wasm,
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

    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    pub fn visibility(&self) -> PluginVisibility {
        self.visibility
    }

    /// The uncompressed Wasm binary.
    pub fn wasm(&self) -> &Bytes {
        &self.wasm
    }

    /// The `p1` digest of the uncompressed Wasm bytes.
    pub fn digest(&self) -> &Digest {
        self.digest
            .get_or_init(|| digest_for_bytes(DigestType::P1, &self.wasm))
    }
}

impl Entity for Plugin {
    fn opaque_id(&self) -> &str {
        &self.opaque_id
    }

    fn full_name(&self) -> Option<&FullName> {
        self.full_name.as_ref()
    }
}

pub type PluginSet = EntitySet<Plugin>;
