//! Providers turn references into keys and keys into materialized data,
//! batching per registry host and verifying content digests against the
//! keys that requested them.

pub mod data;
pub mod key;

use async_trait::async_trait;
use lode_config::{DigestType, Key, Reference};

use crate::error::Result;
use data::{ModuleData, PluginData, PolicyData};

#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Resolves refs to keys carrying the requested digest type.
    ///
    /// Input refs must be unique by string; the output preserves input
    /// order and has the same length.
    async fn keys_for_refs(&self, refs: &[Reference], digest_type: DigestType)
        -> Result<Vec<Key>>;
}

#[async_trait]
pub trait ModuleDataProvider: Send + Sync {
    /// Materializes module content for keys. All keys must share one
    /// digest type. Output order matches input order.
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<ModuleData>>;
}

#[async_trait]
pub trait PolicyDataProvider: Send + Sync {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<PolicyData>>;
}

#[async_trait]
pub trait PluginDataProvider: Send + Sync {
    async fn datas_for_keys(&self, keys: &[Key]) -> Result<Vec<PluginData>>;
}

pub use data::{
    RegistryModuleDataProvider, RegistryPluginDataProvider, RegistryPolicyDataProvider,
};
pub use key::RegistryKeyProvider;
