//! A workspace: a [`ModuleSet`] assembled from a directory tree, plus
//! per-module configuration and the workspace-level configured and locked
//! dependencies.

pub mod discovery;

use std::collections::{BTreeMap, HashMap};

use lode_config::config_file::CheckConfig;
use lode_config::lock_file::LockFileVersion;
use lode_config::{Key, Reference};

use crate::module::set::ModuleSet;

/// Lint and breaking-change configuration for one module.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub lint: CheckConfig,
    pub breaking: CheckConfig,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            lint: CheckConfig {
                use_ids: vec!["STANDARD".to_owned()],
                except: Vec::new(),
                ignore: Vec::new(),
            },
            breaking: CheckConfig {
                use_ids: vec!["FILE".to_owned()],
                except: Vec::new(),
                ignore: Vec::new(),
            },
        }
    }
}

/// Target selection for workspace loading.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceOptions {
    /// Only modules under this directory (relative to the bucket root) are
    /// targets. Defaults to the sub-dir the workspace was loaded from.
    pub target_sub_dir_path: Option<String>,
    /// Include/exclude paths, relative to the targeted sub-dir. They are
    /// split by owning module and rebased to each module's root; a target
    /// module that no include path reaches is demoted to a non-target.
    pub target_paths: Option<crate::module::TargetPaths>,
    /// Skip the target-import validation. Used by operations that read
    /// configuration without needing a resolvable graph.
    pub skip_import_validation: bool,
}

pub struct Workspace {
    pub(crate) module_set: ModuleSet,
    pub(crate) configs: HashMap<String, ModuleConfig>,
    pub(crate) lock_file_version: LockFileVersion,
    pub(crate) lock_file_existed: bool,
    pub(crate) root_sub_dir: String,
    pub(crate) configured_dep_refs: Vec<Reference>,
    pub(crate) configured_plugin_refs: Vec<Reference>,
    pub(crate) configured_policy_refs: Vec<Reference>,
    pub(crate) configured_policy_plugin_refs: BTreeMap<String, Vec<Reference>>,
    pub(crate) locked_dep_keys: Vec<Key>,
    pub(crate) locked_plugin_keys: Vec<Key>,
    pub(crate) locked_policy_keys: Vec<Key>,
    pub(crate) locked_policy_plugin_keys: BTreeMap<String, Vec<Key>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root_sub_dir", &self.root_sub_dir)
            .field("lock_file_version", &self.lock_file_version)
            .field("lock_file_existed", &self.lock_file_existed)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    pub fn module_set(&self) -> &ModuleSet {
        &self.module_set
    }

    /// Remote module refs from configuration, deduplicated by full name.
    pub fn configured_dep_module_refs(&self) -> &[Reference] {
        &self.configured_dep_refs
    }

    /// Module keys pinned by the existing lock file.
    pub fn locked_dep_module_keys(&self) -> &[Key] {
        &self.locked_dep_keys
    }

    pub fn module_config_for_opaque_id(&self, opaque_id: &str) -> Option<&ModuleConfig> {
        self.configs.get(opaque_id)
    }

    pub fn configured_remote_plugin_refs(&self) -> &[Reference] {
        &self.configured_plugin_refs
    }

    pub fn existing_lock_file_plugin_keys(&self) -> &[Key] {
        &self.locked_plugin_keys
    }

    pub fn configured_remote_policy_refs(&self) -> &[Reference] {
        &self.configured_policy_refs
    }

    pub fn existing_lock_file_policy_keys(&self) -> &[Key] {
        &self.locked_policy_keys
    }

    /// Locally configured policy full name to plugin refs.
    pub fn configured_policy_plugin_refs(&self) -> &BTreeMap<String, Vec<Reference>> {
        &self.configured_policy_plugin_refs
    }

    pub fn existing_lock_file_policy_plugin_keys(&self) -> &BTreeMap<String, Vec<Key>> {
        &self.locked_policy_plugin_keys
    }

    pub fn lock_file_existed(&self) -> bool {
        self.lock_file_existed
    }

    /// The version `update` and `prune` write.
    pub fn lock_file_version(&self) -> LockFileVersion {
        self.lock_file_version
    }

    /// The workspace root, relative to the bucket the workspace was loaded
    /// from. The lock file lives here.
    pub fn root_sub_dir(&self) -> &str {
        &self.root_sub_dir
    }
}
