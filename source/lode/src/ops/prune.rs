//! `prune`: drop lock entries no longer reachable from the configured
//! refs. Running it twice is the same as running it once.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use lode_config::lock_file::LockFile;
use lode_config::Reference;

use crate::error::Result;
use crate::ops::lock_write::persist_lock_file;
use crate::workspace::Workspace;

pub async fn prune(root_dir: &Path, workspace: &Workspace) -> Result<()> {
    if !workspace.lock_file_existed() {
        tracing::info!("no lock file present; nothing to prune");
        return Ok(());
    }

    let configured_modules = name_set(workspace.configured_dep_module_refs());
    let configured_plugins = name_set(workspace.configured_remote_plugin_refs());
    let configured_policies = name_set(workspace.configured_remote_policy_refs());

    let deps: Vec<_> = workspace
        .locked_dep_module_keys()
        .iter()
        .filter(|key| configured_modules.contains(&key.full_name().to_string()))
        .cloned()
        .collect();
    let plugins: Vec<_> = workspace
        .existing_lock_file_plugin_keys()
        .iter()
        .filter(|key| configured_plugins.contains(&key.full_name().to_string()))
        .cloned()
        .collect();
    let policies: Vec<_> = workspace
        .existing_lock_file_policy_keys()
        .iter()
        .filter(|key| configured_policies.contains(&key.full_name().to_string()))
        .cloned()
        .collect();
    let retained_policies: HashSet<String> = policies
        .iter()
        .map(|key| key.full_name().to_string())
        .collect();
    let policy_plugins: BTreeMap<_, _> = workspace
        .existing_lock_file_policy_plugin_keys()
        .iter()
        .filter(|(policy, _)| retained_policies.contains(*policy))
        .map(|(policy, keys)| (policy.clone(), keys.clone()))
        .collect();

    let dropped = workspace.locked_dep_module_keys().len() - deps.len();
    if dropped > 0 {
        tracing::info!("pruning {dropped} unconfigured module deps from the lock file");
    }

    let file = LockFile::new(
        workspace.lock_file_version(),
        deps,
        plugins,
        policies,
        policy_plugins,
    )?;
    persist_lock_file(root_dir, &file).await
}

fn name_set(refs: &[Reference]) -> HashSet<String> {
    refs.iter()
        .map(|reference| reference.full_name().to_string())
        .collect()
}
