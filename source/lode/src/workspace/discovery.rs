//! Workspace discovery: walk a directory tree for configuration markers,
//! decide the workspace shape, and assemble the module set.
//!
//! Walking up from the requested sub-dir `S` toward the bucket root:
//!
//!   * a v2 `lode.yaml` at or above `S` wins outright and names its
//!     modules inline;
//!   * otherwise a `lode.work.yaml` at the nearest ancestor makes a
//!     multi-module v1 workspace out of its listed directories;
//!   * otherwise `S` itself is a single v1 module, synthesizing a default
//!     configuration when it has no `lode.yaml` at all.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use lode_config::config_file::{ConfigFile, ConfigFileVersion, WorkFile, CONFIG_FILE_NAME, WORK_FILE_NAME};
use lode_config::lock_file::{LockFile, LockFileVersion, LOCK_FILE_NAME};
use lode_config::{DigestType, FullName, Key, Reference};

use super::{ModuleConfig, Workspace, WorkspaceOptions};
use crate::bucket::{Bucket, PrefixBucket};
use crate::error::{Error, Result};
use crate::module::builder::{AddBucketOptions, ModuleSetBuilder};
use crate::module::TargetPaths;
use crate::provider::ModuleDataProvider;

struct ModuleDirSpec {
    dir: String,
    name: Option<FullName>,
    config: ModuleConfig,
}

pub async fn load_workspace(
    bucket: Arc<dyn Bucket>,
    sub_dir_path: &str,
    options: WorkspaceOptions,
    data_provider: Arc<dyn ModuleDataProvider>,
    digest_type: DigestType,
) -> Result<Workspace> {
    let sub_dir = normalize_dir(sub_dir_path);

    // Walk S upwards looking for markers.
    let mut v2_config: Option<(String, ConfigFile)> = None;
    let mut work_file: Option<(String, WorkFile)> = None;
    let mut config_at_sub: Option<ConfigFile> = None;
    for dir in ancestors(&sub_dir) {
        if let Some(config) = read_config_file(&bucket, &dir).await? {
            if config.version() == ConfigFileVersion::V2 {
                v2_config = Some((dir, config));
                break;
            }
            if dir == sub_dir {
                config_at_sub = Some(config);
            }
        }
        if work_file.is_none() {
            if let Some(work) = read_work_file(&bucket, &dir).await? {
                work_file = Some((dir.clone(), work));
            }
        }
    }

    let mut configured_dep_refs: Vec<Reference> = Vec::new();
    let mut configured_plugin_refs: Vec<Reference> = Vec::new();
    let mut configured_policy_refs: Vec<Reference> = Vec::new();
    let mut configured_policy_plugin_refs: BTreeMap<String, Vec<Reference>> = BTreeMap::new();

    let (root, specs, lock_file_version) = if let Some((root, config)) = v2_config {
        tracing::debug!("v2 workspace rooted at {root:?}");
        let mut specs = Vec::with_capacity(config.modules().len());
        for entry in config.modules() {
            specs.push(ModuleDirSpec {
                dir: join_dir(&root, &entry.path),
                name: entry.name.clone(),
                config: ModuleConfig {
                    lint: entry.lint.clone(),
                    breaking: entry.breaking.clone(),
                },
            });
        }
        extend_refs(&mut configured_dep_refs, config.deps());
        extend_refs(&mut configured_plugin_refs, config.plugins());
        extend_refs(&mut configured_policy_refs, config.policies());
        configured_policy_plugin_refs = config.policy_plugins().clone();
        (root, specs, LockFileVersion::V2)
    } else if let Some((root, work)) = work_file {
        tracing::debug!("v1 multi-module workspace rooted at {root:?}");
        let mut specs = Vec::with_capacity(work.directories().len());
        for entry in work.directories() {
            let dir = join_dir(&root, entry);
            let (name, config, deps) = module_dir_config(&bucket, &dir).await?;
            extend_refs(&mut configured_dep_refs, &deps);
            specs.push(ModuleDirSpec { dir, name, config });
        }
        if sub_dir != root && !specs.iter().any(|spec| spec.dir == sub_dir) {
            return Err(Error::NotFound {
                kind: "directory",
                input: sub_dir.clone(),
            });
        }
        (root, specs, LockFileVersion::V1)
    } else {
        tracing::debug!("single module workspace rooted at {sub_dir:?}");
        let (name, config, deps) = match config_at_sub {
            Some(config) => config_file_module(&config)?,
            None => (None, ModuleConfig::default(), Vec::new()),
        };
        extend_refs(&mut configured_dep_refs, &deps);
        let specs = vec![ModuleDirSpec {
            dir: sub_dir.clone(),
            name,
            config,
        }];
        (sub_dir.clone(), specs, LockFileVersion::V1)
    };

    // Locked dependencies: one lock at the root for v2, per-module (plus
    // the root, where update writes merged locks) for v1.
    let mut lock_file_existed = false;
    let mut locked_dep_keys: Vec<Key> = Vec::new();
    let mut locked_plugin_keys: Vec<Key> = Vec::new();
    let mut locked_policy_keys: Vec<Key> = Vec::new();
    let mut locked_policy_plugin_keys: BTreeMap<String, Vec<Key>> = BTreeMap::new();
    let mut seen_lock_dirs = HashSet::new();
    let mut lock_dirs = Vec::new();
    if lock_file_version == LockFileVersion::V2 {
        lock_dirs.push(root.clone());
    } else {
        for spec in &specs {
            if seen_lock_dirs.insert(spec.dir.clone()) {
                lock_dirs.push(spec.dir.clone());
            }
        }
        if seen_lock_dirs.insert(root.clone()) {
            lock_dirs.push(root.clone());
        }
    }
    let mut seen_locked_names = HashSet::new();
    for dir in lock_dirs {
        let Some(lock) = read_lock_file(&bucket, &dir).await? else {
            continue;
        };
        lock_file_existed = true;
        for key in lock.deps() {
            if seen_locked_names.insert(key.full_name().clone()) {
                locked_dep_keys.push(key.clone());
            }
        }
        for key in lock.plugins() {
            locked_plugin_keys.push(key.clone());
        }
        for key in lock.policies() {
            locked_policy_keys.push(key.clone());
        }
        for (policy, keys) in lock.policy_plugins() {
            locked_policy_plugin_keys
                .entry(policy.clone())
                .or_default()
                .extend(keys.iter().cloned());
        }
    }

    // Target selection.
    let target_sub_dir = options
        .target_sub_dir_path
        .map(|p| normalize_dir(&p))
        .unwrap_or_else(|| sub_dir.clone());
    let split_targets = match &options.target_paths {
        Some(paths) => Some(split_target_paths(paths, &target_sub_dir, &specs)?),
        None => None,
    };

    let mut builder = ModuleSetBuilder::new(data_provider, digest_type);
    if options.skip_import_validation {
        builder.skip_target_validation();
    }
    let mut configs = HashMap::with_capacity(specs.len());
    for (index, spec) in specs.iter().enumerate() {
        let bucket_id = if spec.dir.is_empty() {
            ".".to_owned()
        } else {
            spec.dir.clone()
        };
        let in_target_dir = dir_is_within(&spec.dir, &target_sub_dir);
        let (is_target, target_paths) = match (&options.target_paths, &split_targets) {
            (Some(paths), Some(split)) => {
                let module_paths = split.get(&index).cloned().unwrap_or_default();
                // an include list that reaches no path in this module
                // demotes the module
                let is_target = in_target_dir
                    && (paths.include.is_empty() || !module_paths.include.is_empty());
                (is_target, Some(module_paths))
            }
            _ => (in_target_dir, None),
        };

        let opaque_id = spec
            .name
            .as_ref()
            .map(|name| name.to_string())
            .unwrap_or_else(|| bucket_id.clone());
        configs.insert(opaque_id, spec.config.clone());

        builder.add_module_for_bucket(
            Arc::new(PrefixBucket::new(Arc::clone(&bucket), spec.dir.clone())),
            bucket_id,
            is_target,
            AddBucketOptions {
                full_name: spec.name.clone(),
                commit_id: None,
                target_paths,
            },
        )?;
    }
    for key in &locked_dep_keys {
        builder.add_module_for_key(key.clone(), false);
    }
    let module_set = builder.build().await?;

    Ok(Workspace {
        module_set,
        configs,
        lock_file_version,
        lock_file_existed,
        root_sub_dir: root,
        configured_dep_refs,
        configured_plugin_refs,
        configured_policy_refs,
        configured_policy_plugin_refs,
        locked_dep_keys,
        locked_plugin_keys,
        locked_policy_keys,
        locked_policy_plugin_keys,
    })
}

/// Splits include/exclude paths (relative to the targeted sub-dir) by
/// owning module directory and rebases them to each module's root.
fn split_target_paths(
    paths: &TargetPaths,
    target_sub_dir: &str,
    specs: &[ModuleDirSpec],
) -> Result<HashMap<usize, TargetPaths>> {
    let mut split: HashMap<usize, TargetPaths> = HashMap::new();
    for (raw, is_include) in paths
        .include
        .iter()
        .map(|p| (p, true))
        .chain(paths.exclude.iter().map(|p| (p, false)))
    {
        let full = join_dir(target_sub_dir, raw);
        let owner = specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| dir_is_within(&full, &spec.dir))
            .max_by_key(|(_, spec)| spec.dir.len());
        let Some((index, spec)) = owner else {
            return Err(Error::NotFound {
                kind: "target path",
                input: raw.clone(),
            });
        };
        let rebased = strip_dir(&full, &spec.dir);
        let entry = split.entry(index).or_default();
        if is_include {
            entry.include.push(rebased);
        } else {
            entry.exclude.push(rebased);
        }
    }
    Ok(split)
}

async fn read_config_file(bucket: &Arc<dyn Bucket>, dir: &str) -> Result<Option<ConfigFile>> {
    match bucket.read(&join_dir(dir, CONFIG_FILE_NAME)).await {
        Ok(data) => Ok(Some(ConfigFile::from_slice(&data)?)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_work_file(bucket: &Arc<dyn Bucket>, dir: &str) -> Result<Option<WorkFile>> {
    match bucket.read(&join_dir(dir, WORK_FILE_NAME)).await {
        Ok(data) => Ok(Some(WorkFile::from_slice(&data)?)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_lock_file(bucket: &Arc<dyn Bucket>, dir: &str) -> Result<Option<LockFile>> {
    match bucket.read(&join_dir(dir, LOCK_FILE_NAME)).await {
        Ok(data) => Ok(Some(LockFile::read(data.as_ref())?)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// The name, config, and configured deps of one v1 module directory.
async fn module_dir_config(
    bucket: &Arc<dyn Bucket>,
    dir: &str,
) -> Result<(Option<FullName>, ModuleConfig, Vec<Reference>)> {
    match read_config_file(bucket, dir).await? {
        Some(config) if config.version() == ConfigFileVersion::V2 => {
            Err(Error::Config(lode_config::config_file::ConfigFileError::Malformed {
                message: format!("module directory {dir:?} has a v2 lode.yaml inside a v1 workspace"),
            }))
        }
        Some(config) => config_file_module(&config),
        None => Ok((None, ModuleConfig::default(), Vec::new())),
    }
}

fn config_file_module(
    config: &ConfigFile,
) -> Result<(Option<FullName>, ModuleConfig, Vec<Reference>)> {
    let entry = config
        .modules()
        .first()
        .ok_or_else(|| Error::system("v1 configuration without a module entry"))?;
    Ok((
        entry.name.clone(),
        ModuleConfig {
            lint: entry.lint.clone(),
            breaking: entry.breaking.clone(),
        },
        config.deps().to_vec(),
    ))
}

fn extend_refs(refs: &mut Vec<Reference>, new: &[Reference]) {
    for reference in new {
        if !refs
            .iter()
            .any(|existing| existing.full_name() == reference.full_name())
        {
            refs.push(reference.clone());
        }
    }
}

fn normalize_dir(dir: &str) -> String {
    let trimmed = dir.trim_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_owned()
    }
}

fn join_dir(dir: &str, path: &str) -> String {
    let path = normalize_dir(path);
    if dir.is_empty() {
        path
    } else if path.is_empty() {
        dir.to_owned()
    } else {
        format!("{dir}/{path}")
    }
}

fn strip_dir(path: &str, dir: &str) -> String {
    if dir.is_empty() {
        path.to_owned()
    } else {
        path.strip_prefix(dir)
            .map(|rest| rest.trim_start_matches('/').to_owned())
            .unwrap_or_else(|| path.to_owned())
    }
}

fn dir_is_within(child: &str, parent: &str) -> bool {
    parent.is_empty()
        || child == parent
        || (child.len() > parent.len()
            && child.starts_with(parent)
            && child.as_bytes()[parent.len()] == b'/')
}

/// `S` and every prefix of it up to the bucket root.
fn ancestors(sub_dir: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = sub_dir.to_owned();
    loop {
        out.push(current.clone());
        if current.is_empty() {
            return out;
        }
        current = match current.rfind('/') {
            Some(index) => current[..index].to_owned(),
            None => String::new(),
        };
    }
}
