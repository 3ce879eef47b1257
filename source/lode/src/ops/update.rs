//! `update`: resolve every configured remote ref to a pinned key and
//! rewrite the lock file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use lode_config::lock_file::LockFile;
use lode_config::{DigestType, Key, Reference};

use crate::error::{Error, Result};
use crate::ops::lock_write::replace_lock_file;
use crate::provider::{KeyProvider, PolicyDataProvider};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Not implemented; rejected until its semantics are settled.
    pub only: Vec<String>,
}

pub async fn update(
    root_dir: &Path,
    workspace: &Workspace,
    key_provider: &dyn KeyProvider,
    policy_data_provider: &dyn PolicyDataProvider,
    options: UpdateOptions,
) -> Result<()> {
    if !options.only.is_empty() {
        return Err(Error::Unimplemented { flag: "--only" });
    }

    let module_refs = workspace.configured_dep_module_refs();
    let plugin_refs = workspace.configured_remote_plugin_refs();
    let policy_refs = workspace.configured_remote_policy_refs();

    if module_refs.is_empty()
        && plugin_refs.is_empty()
        && policy_refs.is_empty()
        && !workspace.lock_file_existed()
    {
        tracing::info!("no dependencies configured and no lock file present; nothing to update");
        return Ok(());
    }

    let dep_keys = key_provider
        .keys_for_refs(module_refs, DigestType::B5)
        .await?;
    let plugin_keys = key_provider
        .keys_for_refs(plugin_refs, DigestType::P1)
        .await?;
    let policy_keys = key_provider
        .keys_for_refs(policy_refs, DigestType::O1)
        .await?;

    let policy_plugin_keys =
        resolve_policy_plugins(workspace, key_provider, policy_data_provider, &policy_keys).await?;

    let file = LockFile::new(
        workspace.lock_file_version(),
        dep_keys,
        plugin_keys,
        policy_keys,
        policy_plugin_keys,
    )?;
    tracing::info!(
        "writing {} lock file with {} module deps",
        file.version().as_str(),
        file.deps().len()
    );
    replace_lock_file(root_dir, &file).await
}

/// Each resolved policy contributes the plugin refs its document declares,
/// unioned with the workspace's locally configured policy-to-plugins map;
/// the union resolves to plugin keys in one batched call.
async fn resolve_policy_plugins(
    workspace: &Workspace,
    key_provider: &dyn KeyProvider,
    policy_data_provider: &dyn PolicyDataProvider,
    policy_keys: &[Key],
) -> Result<BTreeMap<String, Vec<Key>>> {
    if policy_keys.is_empty() {
        return Ok(BTreeMap::new());
    }

    let datas = policy_data_provider.datas_for_keys(policy_keys).await?;

    let mut refs_per_policy: BTreeMap<String, Vec<Reference>> = BTreeMap::new();
    for data in &datas {
        let policy_name = data.key().full_name().to_string();
        let mut refs = data.plugin_refs()?;
        if let Some(configured) = workspace
            .configured_policy_plugin_refs()
            .get(&policy_name)
        {
            for reference in configured {
                if !refs
                    .iter()
                    .any(|existing| existing.full_name() == reference.full_name())
                {
                    refs.push(reference.clone());
                }
            }
        }
        refs_per_policy.insert(policy_name, refs);
    }

    // resolve the union once, then hand keys back out per policy
    let mut unique: Vec<Reference> = Vec::new();
    for reference in refs_per_policy.values().flatten() {
        if !unique.iter().any(|u| u.to_string() == reference.to_string()) {
            unique.push(reference.clone());
        }
    }
    let keys = key_provider.keys_for_refs(&unique, DigestType::P1).await?;
    let key_by_ref: HashMap<String, Key> = unique
        .iter()
        .map(|r| r.to_string())
        .zip(keys)
        .collect();

    let mut out = BTreeMap::new();
    for (policy_name, refs) in refs_per_policy {
        let mut plugin_keys = Vec::with_capacity(refs.len());
        let mut seen = std::collections::HashSet::new();
        for reference in refs {
            let key = key_by_ref
                .get(&reference.to_string())
                .ok_or_else(|| Error::system("policy plugin ref resolved to no key"))?;
            if seen.insert(key.full_name().clone()) {
                plugin_keys.push(key.clone());
            }
        }
        out.insert(policy_name, plugin_keys);
    }
    Ok(out)
}
